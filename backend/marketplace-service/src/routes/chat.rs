use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::UserId;
use crate::services::chat_service::{ChatService, RMT_WARNING};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub listing_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<i64>,
    pub cursor: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<crate::models::DecryptedMessage>,
    pub next_cursor: Option<Uuid>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/chat")
            .route("/rooms", web::post().to(create_room))
            .route("/rooms", web::get().to(list_my_rooms))
            .route("/rooms/{id}", web::get().to(get_room))
            .route("/rooms/{id}/close", web::post().to(close_room))
            .route("/rooms/{id}/messages", web::post().to(send_message))
            .route("/rooms/{id}/messages", web::get().to(get_messages))
            .route("/rmt-warning", web::get().to(rmt_warning)),
    );
}

async fn create_room(
    state: web::Data<AppState>,
    user: UserId,
    body: web::Json<CreateRoomRequest>,
) -> Result<HttpResponse, AppError> {
    let room = ChatService::create_room(&state.db, body.listing_id, user.0).await?;
    Ok(HttpResponse::Created().json(room))
}

async fn list_my_rooms(
    state: web::Data<AppState>,
    user: UserId,
) -> Result<HttpResponse, AppError> {
    let rooms = ChatService::list_my_rooms(&state.db, user.0).await?;
    Ok(HttpResponse::Ok().json(rooms))
}

async fn get_room(
    state: web::Data<AppState>,
    user: UserId,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let room = ChatService::get_room(&state.db, path.into_inner(), user.0).await?;
    Ok(HttpResponse::Ok().json(room))
}

async fn close_room(
    state: web::Data<AppState>,
    user: UserId,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let room = ChatService::close_room(&state.db, path.into_inner(), user.0).await?;
    Ok(HttpResponse::Ok().json(room))
}

async fn send_message(
    state: web::Data<AppState>,
    user: UserId,
    path: web::Path<Uuid>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let message = ChatService::send_message(
        &state.db,
        &state.cipher,
        path.into_inner(),
        user.0,
        &body.content,
    )
    .await?;
    Ok(HttpResponse::Created().json(message))
}

async fn get_messages(
    state: web::Data<AppState>,
    user: UserId,
    path: web::Path<Uuid>,
    query: web::Query<MessagesQuery>,
) -> Result<HttpResponse, AppError> {
    let page = ChatService::get_messages(
        &state.db,
        &state.cipher,
        path.into_inner(),
        user.0,
        query.limit,
        query.cursor,
    )
    .await?;
    Ok(HttpResponse::Ok().json(MessagesResponse {
        messages: page.messages,
        next_cursor: page.next_cursor,
    }))
}

async fn rmt_warning() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "warning": RMT_WARNING }))
}
