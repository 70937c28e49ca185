use std::io;
use std::sync::Arc;

use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use cipher_core::CipherService;
use marketplace_service::{
    config::Config, db, logging, middleware::IdentityMiddleware, migrations,
    routes::configure_routes, state::AppState,
};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    tracing::info!("Starting marketplace service");

    let config = Config::from_env().map_err(|e| {
        tracing::error!("Configuration error: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let pool = db::init_pool(&config.database_url).await.map_err(|e| {
        tracing::error!("Failed to connect to database: {}", e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?;
    tracing::info!("Connected to database");

    migrations::run_all(&pool).await.map_err(|e| {
        tracing::error!("Migration failed: {}", e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?;

    // A bad key configuration must stop the service before it serves traffic
    let cipher = CipherService::new(&config.encryption_secret, &config.encryption_salt)
        .map_err(|e| {
            tracing::error!("Cipher initialization failed: {}", e);
            io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
        })?;

    let state = AppState {
        db: pool,
        cipher: Arc::new(cipher),
        config: Arc::new(config.clone()),
    };

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Listening on {}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(actix_middleware::Logger::default())
            .wrap(IdentityMiddleware)
            .configure(configure_routes)
    })
    .bind(&addr)?
    .run()
    .await
}
