use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Notification, NotificationType};

pub struct NotificationService;

impl NotificationService {
    /// Queues a pending notification for the external delivery collaborator.
    pub async fn queue(
        db: &Pool<Postgres>,
        user_id: Uuid,
        kind: NotificationType,
        payload: serde_json::Value,
    ) -> Result<Notification> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, user_id, type, payload, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING id, user_id, type, payload, delivered_via, status, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(kind.as_str())
        .bind(&payload)
        .fetch_one(db)
        .await?;

        tracing::debug!(
            notification_id = %notification.id,
            user_id = %user_id,
            kind = %kind.as_str(),
            "notification queued"
        );

        Ok(notification)
    }

    /// Best-effort variant: a failed queue insert must never fail the chat or
    /// report operation that triggered it.
    pub async fn queue_best_effort(
        db: &Pool<Postgres>,
        user_id: Uuid,
        kind: NotificationType,
        payload: serde_json::Value,
    ) {
        if let Err(e) = Self::queue(db, user_id, kind, payload).await {
            tracing::warn!(user_id = %user_id, error = %e, "failed to queue notification");
        }
    }
}
