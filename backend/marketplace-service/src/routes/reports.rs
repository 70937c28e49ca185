use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::UserId;
use crate::models::{ReportAction, ReportReason, ReportTargetType};
use crate::services::report_service::ReportService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub target_type: ReportTargetType,
    pub target_id: Uuid,
    pub reason: ReportReason,
    pub chat_room_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveReportRequest {
    pub action: ReportAction,
    pub resolution: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/reports")
            .route("", web::post().to(create_report))
            .route("/mine", web::get().to(list_my_reports))
            .route("/queue", web::get().to(get_queue))
            .route("/{id}", web::get().to(get_report))
            .route("/{id}/resolve", web::post().to(resolve_report)),
    );
}

async fn create_report(
    state: web::Data<AppState>,
    user: UserId,
    body: web::Json<CreateReportRequest>,
) -> Result<HttpResponse, AppError> {
    let report = ReportService::create(
        &state.db,
        &state.cipher,
        user.0,
        body.target_type,
        body.target_id,
        body.reason.as_str(),
        body.chat_room_id,
    )
    .await?;
    Ok(HttpResponse::Created().json(report))
}

async fn list_my_reports(
    state: web::Data<AppState>,
    user: UserId,
) -> Result<HttpResponse, AppError> {
    let reports = ReportService::list_my_reports(&state.db, user.0).await?;
    Ok(HttpResponse::Ok().json(reports))
}

async fn get_queue(state: web::Data<AppState>, user: UserId) -> Result<HttpResponse, AppError> {
    let reports = ReportService::get_queue(&state.db, user.0).await?;
    Ok(HttpResponse::Ok().json(reports))
}

async fn get_report(
    state: web::Data<AppState>,
    user: UserId,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let detail =
        ReportService::get_by_id(&state.db, &state.cipher, user.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

async fn resolve_report(
    state: web::Data<AppState>,
    user: UserId,
    path: web::Path<Uuid>,
    body: web::Json<ResolveReportRequest>,
) -> Result<HttpResponse, AppError> {
    let report = ReportService::resolve(
        &state.db,
        user.0,
        path.into_inner(),
        body.action,
        body.resolution.as_deref(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(report))
}
