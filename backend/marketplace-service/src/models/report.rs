use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User-filed report against a listing or user, optionally carrying an
/// encrypted chat-log snapshot captured at filing time. Resolved exactly
/// once, never deleted.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub target_type: String,
    pub target_id: Uuid,
    pub reason: String,
    #[serde(skip_serializing)]
    pub encrypted_chat_log: Option<String>,
    pub status: String,
    pub moderator_id: Option<Uuid>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTargetType {
    Listing,
    User,
}

impl ReportTargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportTargetType::Listing => "listing",
            ReportTargetType::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Scam,
    UnrealisticPrice,
    Offense,
}

impl ReportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::Spam => "spam",
            ReportReason::Scam => "scam",
            ReportReason::UnrealisticPrice => "unrealistic_price",
            ReportReason::Offense => "offense",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }
}

/// Moderator resolution action. `dismiss` terminates the report without side
/// effects; the other two apply their side effect before the status flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    Dismiss,
    RemoveListing,
    BanUser,
}

impl ReportAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportAction::Dismiss => "dismiss",
            ReportAction::RemoveListing => "remove_listing",
            ReportAction::BanUser => "ban_user",
        }
    }

    /// Status the report lands in after this action.
    pub fn final_status(&self) -> ReportStatus {
        match self {
            ReportAction::Dismiss => ReportStatus::Dismissed,
            ReportAction::RemoveListing | ReportAction::BanUser => ReportStatus::Resolved,
        }
    }
}

/// One decrypted message inside a snapshot blob. The serialized list is
/// chronological and immutable once captured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotEntry {
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
