use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Marketplace profile for an externally-managed user. Core reads role and
/// ban flag only; everything else belongs to the auth collaborator.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub role: String,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Player,
    Moderator,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Player => "player",
            UserRole::Moderator => "moderator",
        }
    }
}
