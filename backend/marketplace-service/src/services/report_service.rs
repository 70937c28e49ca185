//! Report intake, the moderation queue, and one-shot resolution.
//!
//! The chat-log snapshot is captured at filing time so later edits or
//! deletions cannot rewrite the evidence. It is re-encrypted as a single
//! blob and only decrypted for moderators viewing a still-pending report.

use cipher_core::CipherService;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    NotificationType, Report, ReportAction, ReportStatus, ReportTargetType, SnapshotEntry,
};
use crate::services::chat_service::ChatService;
use crate::services::moderation::{ensure_not_banned, require_moderator};
use crate::services::notification_service::NotificationService;

/// How many of a room's newest messages a snapshot preserves.
pub const SNAPSHOT_MESSAGE_LIMIT: i64 = 50;

const REPORT_COLUMNS: &str = "id, reporter_id, target_type, target_id, reason, \
encrypted_chat_log, status, moderator_id, resolution, created_at, resolved_at";

/// Report plus its decrypted snapshot, for the moderator detail view.
#[derive(Debug, serde::Serialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: Report,
    pub chat_snapshot: Option<Vec<SnapshotEntry>>,
}

pub struct ReportService;

impl ReportService {
    /// Files a report against a listing or user.
    ///
    /// When the reporter passes a chat room they participate in, the room's
    /// newest messages are decrypted, serialized chronologically and sealed
    /// into the report as evidence. One pending report per
    /// (reporter, target) pair; a duplicate maps to a conflict whether it is
    /// caught by the pre-check or by the partial unique index under a race.
    pub async fn create(
        db: &Pool<Postgres>,
        cipher: &CipherService,
        reporter_id: Uuid,
        target_type: ReportTargetType,
        target_id: Uuid,
        reason: &str,
        chat_room_id: Option<Uuid>,
    ) -> Result<Report> {
        ensure_not_banned(db, reporter_id).await?;
        Self::ensure_target_exists(db, target_type, target_id).await?;

        let duplicate = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM reports
             WHERE reporter_id = $1 AND target_type = $2 AND target_id = $3
               AND status = 'pending'",
        )
        .bind(reporter_id)
        .bind(target_type.as_str())
        .bind(target_id)
        .fetch_one(db)
        .await?;
        if duplicate > 0 {
            return Err(AppError::Conflict("Report already submitted".into()));
        }

        let encrypted_chat_log = match chat_room_id {
            Some(room_id) => {
                Self::capture_snapshot(db, cipher, room_id, reporter_id).await?
            }
            None => None,
        };

        let report = sqlx::query_as::<_, Report>(&format!(
            r#"
            INSERT INTO reports (id, reporter_id, target_type, target_id, reason, encrypted_chat_log, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(reporter_id)
        .bind(target_type.as_str())
        .bind(target_id)
        .bind(reason)
        .bind(&encrypted_chat_log)
        .fetch_one(db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Report already submitted".into())
            }
            other => AppError::from(other),
        })?;

        tracing::info!(
            report_id = %report.id,
            target_type = %report.target_type,
            target_id = %target_id,
            has_snapshot = encrypted_chat_log.is_some(),
            "report filed"
        );
        Ok(report)
    }

    /// Pending reports for the moderation queue, newest first.
    pub async fn get_queue(db: &Pool<Postgres>, moderator_id: Uuid) -> Result<Vec<Report>> {
        require_moderator(db, moderator_id).await?;

        let reports = sqlx::query_as::<_, Report>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports
             WHERE status = 'pending' ORDER BY created_at DESC"
        ))
        .fetch_all(db)
        .await?;
        Ok(reports)
    }

    /// Reports the user has filed, newest first. Snapshots stay sealed.
    pub async fn list_my_reports(db: &Pool<Postgres>, reporter_id: Uuid) -> Result<Vec<Report>> {
        let reports = sqlx::query_as::<_, Report>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports
             WHERE reporter_id = $1 ORDER BY created_at DESC"
        ))
        .bind(reporter_id)
        .fetch_all(db)
        .await?;
        Ok(reports)
    }

    /// Moderator detail view. The snapshot is opened only while the report is
    /// still pending; once resolved or dismissed the evidence stays sealed.
    /// An undecryptable or unparsable snapshot degrades to None rather than
    /// failing the view.
    pub async fn get_by_id(
        db: &Pool<Postgres>,
        cipher: &CipherService,
        moderator_id: Uuid,
        report_id: Uuid,
    ) -> Result<ReportDetail> {
        require_moderator(db, moderator_id).await?;
        let report = Self::fetch_report(db, report_id).await?;

        let chat_snapshot = if report.status == ReportStatus::Pending.as_str() {
            report
                .encrypted_chat_log
                .as_deref()
                .and_then(|blob| match Self::open_snapshot(cipher, blob) {
                    Ok(entries) => Some(entries),
                    Err(e) => {
                        tracing::warn!(report_id = %report_id, error = %e, "snapshot unreadable");
                        None
                    }
                })
        } else {
            None
        };

        Ok(ReportDetail {
            report,
            chat_snapshot,
        })
    }

    /// Resolves a pending report exactly once.
    ///
    /// The action's side effect runs before the status flip and both are
    /// idempotent, so a retry after a crash between the two converges instead
    /// of corrupting state. The flip itself re-checks `status = 'pending'`
    /// so concurrent moderators cannot double-resolve.
    pub async fn resolve(
        db: &Pool<Postgres>,
        moderator_id: Uuid,
        report_id: Uuid,
        action: ReportAction,
        resolution_note: Option<&str>,
    ) -> Result<Report> {
        require_moderator(db, moderator_id).await?;
        let report = Self::fetch_report(db, report_id).await?;
        if report.status != ReportStatus::Pending.as_str() {
            return Err(AppError::BadRequest("Report already resolved".into()));
        }

        Self::apply_action(db, &report, action).await?;

        let resolved = sqlx::query_as::<_, Report>(&format!(
            r#"
            UPDATE reports
            SET status = $2, moderator_id = $3, resolution = $4, resolved_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(report_id)
        .bind(action.final_status().as_str())
        .bind(moderator_id)
        .bind(resolution_note.unwrap_or(action.as_str()))
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Report already resolved".into()))?;

        NotificationService::queue_best_effort(
            db,
            resolved.reporter_id,
            NotificationType::ReportAction,
            serde_json::json!({ "report_id": report_id, "action": action.as_str() }),
        )
        .await;

        tracing::info!(
            report_id = %report_id,
            moderator_id = %moderator_id,
            action = action.as_str(),
            "report resolved"
        );
        Ok(resolved)
    }

    async fn apply_action(
        db: &Pool<Postgres>,
        report: &Report,
        action: ReportAction,
    ) -> Result<()> {
        match action {
            ReportAction::Dismiss => Ok(()),
            ReportAction::RemoveListing => {
                if report.target_type != ReportTargetType::Listing.as_str() {
                    return Err(AppError::BadRequest(
                        "remove_listing requires a listing target".into(),
                    ));
                }
                sqlx::query("UPDATE listings SET status = 'deleted', updated_at = NOW() WHERE id = $1")
                    .bind(report.target_id)
                    .execute(db)
                    .await?;
                Ok(())
            }
            ReportAction::BanUser => {
                let subject = if report.target_type == ReportTargetType::User.as_str() {
                    report.target_id
                } else {
                    sqlx::query_scalar::<_, Uuid>("SELECT seller_id FROM listings WHERE id = $1")
                        .bind(report.target_id)
                        .fetch_optional(db)
                        .await?
                        .ok_or_else(|| AppError::NotFound("Target not found".into()))?
                };
                sqlx::query(
                    r#"
                    INSERT INTO user_profiles (user_id, role, is_banned)
                    VALUES ($1, 'player', TRUE)
                    ON CONFLICT (user_id) DO UPDATE SET is_banned = TRUE, updated_at = NOW()
                    "#,
                )
                .bind(subject)
                .execute(db)
                .await?;
                Ok(())
            }
        }
    }

    /// A missing room or a reporter outside it yields no snapshot rather than
    /// an error; the report itself still goes through.
    async fn capture_snapshot(
        db: &Pool<Postgres>,
        cipher: &CipherService,
        room_id: Uuid,
        reporter_id: Uuid,
    ) -> Result<Option<String>> {
        let room = match ChatService::fetch_room(db, room_id).await {
            Ok(room) => room,
            Err(AppError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if !room.is_participant(reporter_id) {
            return Ok(None);
        }

        let messages =
            ChatService::recent_messages_decrypted(db, cipher, room_id, SNAPSHOT_MESSAGE_LIMIT)
                .await?;
        if messages.is_empty() {
            return Ok(None);
        }

        let entries: Vec<SnapshotEntry> = messages
            .into_iter()
            .map(|m| SnapshotEntry {
                sender_id: m.sender_id,
                content: m.content,
                created_at: m.created_at,
            })
            .collect();

        let json = serde_json::to_string(&entries)
            .map_err(|e| AppError::Internal(format!("snapshot serialization failed: {e}")))?;
        Ok(Some(cipher.encrypt(&json)?))
    }

    fn open_snapshot(cipher: &CipherService, blob: &str) -> Result<Vec<SnapshotEntry>> {
        let json = cipher.decrypt(blob)?;
        serde_json::from_str(&json)
            .map_err(|e| AppError::Internal(format!("snapshot parse failed: {e}")))
    }

    async fn fetch_report(db: &Pool<Postgres>, report_id: Uuid) -> Result<Report> {
        sqlx::query_as::<_, Report>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"
        ))
        .bind(report_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found".into()))
    }

    async fn ensure_target_exists(
        db: &Pool<Postgres>,
        target_type: ReportTargetType,
        target_id: Uuid,
    ) -> Result<()> {
        let exists = match target_type {
            ReportTargetType::Listing => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM listings WHERE id = $1")
                    .bind(target_id)
                    .fetch_one(db)
                    .await?
            }
            ReportTargetType::User => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM user_profiles WHERE user_id = $1",
                )
                .bind(target_id)
                .fetch_one(db)
                .await?
            }
        };
        if exists == 0 {
            return Err(AppError::NotFound("Target not found".into()));
        }
        Ok(())
    }
}
