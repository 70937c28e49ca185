use dotenvy::dotenv;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Primary secret for the chat cipher key derivation. Mandatory.
    pub encryption_secret: String,
    /// Key-derivation salt. Mandatory, at least 8 bytes.
    pub encryption_salt: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        // Both secrets are required; running without them would silently
        // disable chat confidentiality, so absence is fatal at startup.
        let encryption_secret = env::var("CHAT_ENCRYPTION_SECRET")
            .map_err(|_| AppError::Config("CHAT_ENCRYPTION_SECRET missing".into()))?;
        let encryption_salt = env::var("CHAT_ENCRYPTION_SALT")
            .map_err(|_| AppError::Config("CHAT_ENCRYPTION_SALT missing".into()))?;
        if encryption_secret.trim().is_empty() {
            return Err(AppError::Config("CHAT_ENCRYPTION_SECRET is empty".into()));
        }
        if encryption_salt.len() < 8 {
            return Err(AppError::Config(
                "CHAT_ENCRYPTION_SALT must be at least 8 bytes".into(),
            ));
        }

        Ok(Self {
            database_url,
            port,
            encryption_secret,
            encryption_salt,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            port: 8080,
            encryption_secret: "test-secret".into(),
            encryption_salt: "test-salt-unique".into(),
        }
    }
}
