//! Role-based authorization predicates shared by chat and reports.
//!
//! Invoked explicitly as the first statement of each guarded operation
//! rather than hidden in a middleware chain, so the checks stay visible at
//! the call site and testable with an injected pool.

use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{UserProfile, UserRole};

async fn load_profile(db: &Pool<Postgres>, user_id: Uuid) -> Result<Option<UserProfile>> {
    let profile = sqlx::query_as::<_, UserProfile>(
        "SELECT user_id, role, is_banned, created_at, updated_at
         FROM user_profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(profile)
}

/// Allows the operation to proceed only for moderators.
pub async fn require_moderator(db: &Pool<Postgres>, user_id: Uuid) -> Result<()> {
    match load_profile(db, user_id).await? {
        Some(profile) if profile.role == UserRole::Moderator.as_str() => Ok(()),
        _ => Err(AppError::Authorization("Moderator access required".into())),
    }
}

/// Rejects banned accounts. A missing profile row counts as not banned; the
/// auth collaborator may not have provisioned one yet.
pub async fn ensure_not_banned(db: &Pool<Postgres>, user_id: Uuid) -> Result<()> {
    if let Some(profile) = load_profile(db, user_id).await? {
        if profile.is_banned {
            return Err(AppError::Authorization("Account suspended".into()));
        }
    }
    Ok(())
}
