use crate::config::Config;
use cipher_core::CipherService;
use sqlx::{Pool, Postgres};
use std::sync::Arc;

/// Shared per-process state, constructed once at startup and handed to every
/// handler. The pool is the only mutable shared resource; the cipher key is
/// derived once and immutable thereafter.
#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub cipher: Arc<CipherService>,
    pub config: Arc<Config>,
}
