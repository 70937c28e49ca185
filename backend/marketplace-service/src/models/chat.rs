use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Two-party negotiation thread scoped to one listing. Participants are
/// immutable after creation; only the status and updated_at change.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChatRoom {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// The other side of the negotiation, for notification fanout.
    pub fn counterparty(&self, user_id: Uuid) -> Uuid {
        if self.buyer_id == user_id {
            self.seller_id
        } else {
            self.buyer_id
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Active,
    Closed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "active",
            RoomStatus::Closed => "closed",
        }
    }
}

/// Message row as stored: content is the cipher wire format, never plaintext.
#[derive(Debug, Clone, FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub encrypted_content: String,
    pub created_at: DateTime<Utc>,
}

/// Message as returned to an authorized participant, decrypted at the
/// boundary.
#[derive(Debug, Clone, Serialize)]
pub struct DecryptedMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
