//! Chat room lifecycle and the encrypted message store.
//!
//! Rooms are two-party threads pinned to a listing. Messages are encrypted
//! before they hit the database and decrypted per row on the way out for
//! authorized participants only. Clients poll for new messages; the server
//! keeps no subscription state.

use cipher_core::CipherService;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    ChatMessage, ChatRoom, DecryptedMessage, Listing, ListingStatus, NotificationType, RoomStatus,
};
use crate::services::moderation::ensure_not_banned;
use crate::services::notification_service::NotificationService;

pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Warning pinned to every chat UI: trades settle in in-game currency only.
pub const RMT_WARNING: &str = "⚠️ ATENÇÃO: É proibido negociar itens por dinheiro real (RMT). \
Todas as transações devem ser feitas utilizando apenas moedas do jogo (Gold Coins ou Rubin Coins). \
Violações resultarão em banimento permanente.";

/// One page of decrypted messages, oldest first, plus the cursor for the
/// next older page when one exists.
#[derive(Debug)]
pub struct MessagePage {
    pub messages: Vec<DecryptedMessage>,
    pub next_cursor: Option<Uuid>,
}

pub struct ChatService;

impl ChatService {
    /// Opens (or returns) the negotiation room for (listing, buyer).
    ///
    /// Idempotent: a second call with the same pair returns the existing row
    /// unchanged. Self-negotiation and banned buyers are rejected, and the
    /// listing must still be active.
    pub async fn create_room(
        db: &Pool<Postgres>,
        listing_id: Uuid,
        buyer_id: Uuid,
    ) -> Result<ChatRoom> {
        ensure_not_banned(db, buyer_id).await?;

        let listing = sqlx::query_as::<_, Listing>(
            "SELECT id, seller_id, status, last_interaction_at, created_at, updated_at
             FROM listings WHERE id = $1",
        )
        .bind(listing_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Listing not found".into()))?;

        if listing.status != ListingStatus::Active.as_str() {
            return Err(AppError::BadRequest("Listing is not active".into()));
        }
        if listing.seller_id == buyer_id {
            return Err(AppError::Authorization(
                "Cannot negotiate on your own listing".into(),
            ));
        }

        if let Some(existing) = Self::find_room(db, listing_id, buyer_id).await? {
            return Ok(existing);
        }

        // ON CONFLICT keeps concurrent first-contact requests idempotent: the
        // loser of the race re-reads the winner's row.
        let inserted = sqlx::query_as::<_, ChatRoom>(
            r#"
            INSERT INTO chat_rooms (id, listing_id, buyer_id, seller_id, status)
            VALUES ($1, $2, $3, $4, 'active')
            ON CONFLICT (listing_id, buyer_id) DO NOTHING
            RETURNING id, listing_id, buyer_id, seller_id, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(listing_id)
        .bind(buyer_id)
        .bind(listing.seller_id)
        .fetch_optional(db)
        .await?;

        let room = match inserted {
            Some(room) => {
                sqlx::query("UPDATE listings SET last_interaction_at = NOW() WHERE id = $1")
                    .bind(listing_id)
                    .execute(db)
                    .await?;
                tracing::info!(room_id = %room.id, listing_id = %listing_id, buyer_id = %buyer_id, "chat room created");
                room
            }
            None => Self::find_room(db, listing_id, buyer_id)
                .await?
                .ok_or_else(|| AppError::Internal("room vanished after conflict".into()))?,
        };

        Ok(room)
    }

    /// Loads a room for one of its participants.
    pub async fn get_room(
        db: &Pool<Postgres>,
        room_id: Uuid,
        requester_id: Uuid,
    ) -> Result<ChatRoom> {
        let room = Self::fetch_room(db, room_id).await?;
        if !room.is_participant(requester_id) {
            return Err(AppError::Authorization(
                "Not a participant of this chat".into(),
            ));
        }
        Ok(room)
    }

    /// All rooms where the user is buyer or seller, most recently active first.
    pub async fn list_my_rooms(db: &Pool<Postgres>, user_id: Uuid) -> Result<Vec<ChatRoom>> {
        let rooms = sqlx::query_as::<_, ChatRoom>(
            r#"
            SELECT id, listing_id, buyer_id, seller_id, status, created_at, updated_at
            FROM chat_rooms
            WHERE buyer_id = $1 OR seller_id = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rooms)
    }

    /// Seller-only transition active -> closed. Closed is terminal: history
    /// stays readable, new sends are rejected.
    pub async fn close_room(
        db: &Pool<Postgres>,
        room_id: Uuid,
        requester_id: Uuid,
    ) -> Result<ChatRoom> {
        let room = Self::fetch_room(db, room_id).await?;
        if room.seller_id != requester_id {
            return Err(AppError::Authorization(
                "Only the seller can close the chat".into(),
            ));
        }

        // Precondition re-checked at the point of mutation: a concurrent
        // close loses the race instead of double-applying.
        let closed = sqlx::query_as::<_, ChatRoom>(
            r#"
            UPDATE chat_rooms
            SET status = 'closed', updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            RETURNING id, listing_id, buyer_id, seller_id, status, created_at, updated_at
            "#,
        )
        .bind(room_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Chat room is already closed".into()))?;

        tracing::info!(room_id = %room_id, seller_id = %requester_id, "chat room closed");
        Ok(closed)
    }

    /// Encrypts and appends a message, bumps the room's activity timestamp,
    /// and queues a `new_message` notification for the counterparty.
    ///
    /// The submitted plaintext is echoed back to the sender instead of
    /// round-tripping through decrypt; encrypt/decrypt being exact inverses
    /// is covered by the cipher property tests.
    pub async fn send_message(
        db: &Pool<Postgres>,
        cipher: &CipherService,
        room_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<DecryptedMessage> {
        let char_count = content.chars().count();
        if char_count == 0 || char_count > MAX_MESSAGE_CHARS {
            return Err(AppError::Validation(format!(
                "Message must be between 1 and {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let room = Self::fetch_room(db, room_id).await?;
        if !room.is_participant(sender_id) {
            return Err(AppError::Authorization(
                "Not a participant of this chat".into(),
            ));
        }
        if room.status != RoomStatus::Active.as_str() {
            return Err(AppError::BadRequest("Chat room is closed".into()));
        }

        let encrypted_content = cipher.encrypt(content)?;

        let stored = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (id, room_id, sender_id, encrypted_content)
            VALUES ($1, $2, $3, $4)
            RETURNING id, room_id, sender_id, encrypted_content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(room_id)
        .bind(sender_id)
        .bind(&encrypted_content)
        .fetch_one(db)
        .await?;

        sqlx::query("UPDATE chat_rooms SET updated_at = NOW() WHERE id = $1")
            .bind(room_id)
            .execute(db)
            .await?;

        NotificationService::queue_best_effort(
            db,
            room.counterparty(sender_id),
            NotificationType::NewMessage,
            serde_json::json!({ "room_id": room_id, "message_id": stored.id }),
        )
        .await;

        Ok(DecryptedMessage {
            id: stored.id,
            room_id: stored.room_id,
            sender_id: stored.sender_id,
            content: content.to_string(),
            created_at: stored.created_at,
        })
    }

    /// Pages through a room's history for one of its participants.
    ///
    /// Rows are read newest-first by (created_at, id) keyset, then reordered
    /// chronologically for display. Each row is decrypted at this boundary;
    /// a single undecryptable message aborts the whole call rather than
    /// returning partial history.
    pub async fn get_messages(
        db: &Pool<Postgres>,
        cipher: &CipherService,
        room_id: Uuid,
        requester_id: Uuid,
        limit: Option<i64>,
        cursor: Option<Uuid>,
    ) -> Result<MessagePage> {
        let room = Self::fetch_room(db, room_id).await?;
        if !room.is_participant(requester_id) {
            return Err(AppError::Authorization(
                "Not a participant of this chat".into(),
            ));
        }

        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        // Fetch one extra row to learn whether an older page exists
        let mut rows = match cursor {
            Some(cursor_id) => {
                sqlx::query_as::<_, ChatMessage>(
                    r#"
                    SELECT m.id, m.room_id, m.sender_id, m.encrypted_content, m.created_at
                    FROM chat_messages m
                    WHERE m.room_id = $1
                      AND (m.created_at, m.id) <
                          (SELECT c.created_at, c.id FROM chat_messages c
                           WHERE c.id = $2 AND c.room_id = $1)
                    ORDER BY m.created_at DESC, m.id DESC
                    LIMIT $3
                    "#,
                )
                .bind(room_id)
                .bind(cursor_id)
                .bind(limit + 1)
                .fetch_all(db)
                .await?
            }
            None => {
                sqlx::query_as::<_, ChatMessage>(
                    r#"
                    SELECT id, room_id, sender_id, encrypted_content, created_at
                    FROM chat_messages
                    WHERE room_id = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2
                    "#,
                )
                .bind(room_id)
                .bind(limit + 1)
                .fetch_all(db)
                .await?
            }
        };

        let has_more = rows.len() as i64 > limit;
        if has_more {
            rows.truncate(limit as usize);
        }
        let next_cursor = if has_more {
            rows.last().map(|m| m.id)
        } else {
            None
        };

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(DecryptedMessage {
                id: row.id,
                room_id: row.room_id,
                sender_id: row.sender_id,
                content: cipher.decrypt(&row.encrypted_content)?,
                created_at: row.created_at,
            });
        }
        // Chronological order for display
        messages.reverse();

        Ok(MessagePage {
            messages,
            next_cursor,
        })
    }

    /// The `limit` most recent messages of a room, decrypted, in
    /// chronological order. Used by the report snapshot pipeline.
    pub async fn recent_messages_decrypted(
        db: &Pool<Postgres>,
        cipher: &CipherService,
        room_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DecryptedMessage>> {
        let rows = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT id, room_id, sender_id, encrypted_content, created_at
            FROM chat_messages
            WHERE room_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(db)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(DecryptedMessage {
                id: row.id,
                room_id: row.room_id,
                sender_id: row.sender_id,
                content: cipher.decrypt(&row.encrypted_content)?,
                created_at: row.created_at,
            });
        }
        messages.reverse();
        Ok(messages)
    }

    pub async fn fetch_room(db: &Pool<Postgres>, room_id: Uuid) -> Result<ChatRoom> {
        sqlx::query_as::<_, ChatRoom>(
            "SELECT id, listing_id, buyer_id, seller_id, status, created_at, updated_at
             FROM chat_rooms WHERE id = $1",
        )
        .bind(room_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Chat room not found".into()))
    }

    async fn find_room(
        db: &Pool<Postgres>,
        listing_id: Uuid,
        buyer_id: Uuid,
    ) -> Result<Option<ChatRoom>> {
        let room = sqlx::query_as::<_, ChatRoom>(
            "SELECT id, listing_id, buyer_id, seller_id, status, created_at, updated_at
             FROM chat_rooms WHERE listing_id = $1 AND buyer_id = $2",
        )
        .bind(listing_id)
        .bind(buyer_id)
        .fetch_optional(db)
        .await?;
        Ok(room)
    }
}
