//! Route configuration. Each domain wires its own routes; main.rs mounts
//! everything under /api/v1 behind the identity middleware.

use actix_web::{web, HttpResponse};

pub mod chat;
pub mod reports;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .service(
            web::scope("/api/v1")
                .configure(chat::configure)
                .configure(reports::configure),
        );
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "marketplace-service"
    }))
}
