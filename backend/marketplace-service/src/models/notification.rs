use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Queued notification row. Delivery is owned by the external notification
/// collaborator; this service only inserts pending rows.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
    pub delivered_via: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewMessage,
    ListingSold,
    ListingExpiring,
    ReportAction,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewMessage => "new_message",
            NotificationType::ListingSold => "listing_sold",
            NotificationType::ListingExpiring => "listing_expiring",
            NotificationType::ReportAction => "report_action",
        }
    }
}
