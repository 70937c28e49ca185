//! Integration test suite for the chat and report flows.
//!
//! These tests need a live Postgres pointed at by DATABASE_URL; migrations
//! run automatically. Each test provisions its own users and listings so
//! suites can run against a shared database.
//!
//! Test categories:
//! 1. Room lifecycle - creation, idempotency, self-negotiation, closing
//! 2. Messaging - encryption at rest, authorization, pagination, validation
//! 3. Reports - intake, duplicates, snapshot capture, moderator queue
//! 4. Resolution - side effects, idempotency, snapshot sealing

use cipher_core::CipherService;
use marketplace_service::error::AppError;
use marketplace_service::migrations;
use marketplace_service::models::{ReportAction, ReportTargetType, SnapshotEntry};
use marketplace_service::services::chat_service::ChatService;
use marketplace_service::services::report_service::ReportService;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

async fn bootstrap_pool() -> Pool<Postgres> {
    let db_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL env var required for these tests");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await
        .expect("failed to connect to DATABASE_URL");
    migrations::run_all(&pool).await.expect("migrations failed");
    pool
}

fn test_cipher() -> CipherService {
    CipherService::new("integration-test-secret", "integration-salt")
        .expect("cipher construction failed")
}

async fn seed_profile(pool: &Pool<Postgres>, role: &str) -> Uuid {
    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO user_profiles (user_id, role, is_banned) VALUES ($1, $2, FALSE)")
        .bind(user_id)
        .bind(role)
        .execute(pool)
        .await
        .expect("seed profile");
    user_id
}

async fn seed_listing(pool: &Pool<Postgres>, seller_id: Uuid, status: &str) -> Uuid {
    let listing_id = Uuid::new_v4();
    sqlx::query("INSERT INTO listings (id, seller_id, status) VALUES ($1, $2, $3)")
        .bind(listing_id)
        .bind(seller_id)
        .bind(status)
        .execute(pool)
        .await
        .expect("seed listing");
    listing_id
}

// ============================================================================
// 1. Room lifecycle
// ============================================================================

#[tokio::test]
#[serial]
#[ignore] // Run with: cargo test --test chat_report_flow_test -- --ignored
async fn create_room_is_idempotent_per_listing_and_buyer() {
    let pool = bootstrap_pool().await;
    let seller = seed_profile(&pool, "player").await;
    let buyer = seed_profile(&pool, "player").await;
    let listing = seed_listing(&pool, seller, "active").await;

    let first = ChatService::create_room(&pool, listing, buyer)
        .await
        .expect("first create");
    let second = ChatService::create_room(&pool, listing, buyer)
        .await
        .expect("second create");

    assert_eq!(first.id, second.id, "same pair must reuse the room");
    assert_eq!(first.seller_id, seller);
    assert_eq!(first.status, "active");
}

#[tokio::test]
#[serial]
#[ignore]
async fn create_room_rejects_self_negotiation_and_inactive_listing() {
    let pool = bootstrap_pool().await;
    let seller = seed_profile(&pool, "player").await;
    let buyer = seed_profile(&pool, "player").await;

    let listing = seed_listing(&pool, seller, "active").await;
    let err = ChatService::create_room(&pool, listing, seller)
        .await
        .expect_err("seller buying own listing");
    assert!(matches!(err, AppError::Authorization(_)));

    let sold = seed_listing(&pool, seller, "sold").await;
    let err = ChatService::create_room(&pool, sold, buyer)
        .await
        .expect_err("inactive listing");
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = ChatService::create_room(&pool, Uuid::new_v4(), buyer)
        .await
        .expect_err("unknown listing");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[serial]
#[ignore]
async fn only_seller_closes_and_close_is_terminal() {
    let pool = bootstrap_pool().await;
    let cipher = test_cipher();
    let seller = seed_profile(&pool, "player").await;
    let buyer = seed_profile(&pool, "player").await;
    let listing = seed_listing(&pool, seller, "active").await;
    let room = ChatService::create_room(&pool, listing, buyer)
        .await
        .expect("create room");

    let err = ChatService::close_room(&pool, room.id, buyer)
        .await
        .expect_err("buyer cannot close");
    assert!(matches!(err, AppError::Authorization(_)));

    let closed = ChatService::close_room(&pool, room.id, seller)
        .await
        .expect("seller closes");
    assert_eq!(closed.status, "closed");

    let err = ChatService::close_room(&pool, room.id, seller)
        .await
        .expect_err("second close");
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = ChatService::send_message(&pool, &cipher, room.id, buyer, "oi")
        .await
        .expect_err("send into closed room");
    assert!(matches!(err, AppError::BadRequest(_)));

    // History stays readable after closing
    let page = ChatService::get_messages(&pool, &cipher, room.id, buyer, None, None)
        .await
        .expect("history after close");
    assert!(page.messages.is_empty());
}

// ============================================================================
// 2. Messaging
// ============================================================================

#[tokio::test]
#[serial]
#[ignore]
async fn messages_are_encrypted_at_rest_and_only_readable_by_participants() {
    let pool = bootstrap_pool().await;
    let cipher = test_cipher();
    let seller = seed_profile(&pool, "player").await;
    let buyer = seed_profile(&pool, "player").await;
    let outsider = seed_profile(&pool, "player").await;
    let listing = seed_listing(&pool, seller, "active").await;
    let room = ChatService::create_room(&pool, listing, buyer)
        .await
        .expect("create room");

    let sent = ChatService::send_message(&pool, &cipher, room.id, buyer, "quanto custa?")
        .await
        .expect("send");
    assert_eq!(sent.content, "quanto custa?", "sender gets plaintext echo");

    // The stored row must never contain the plaintext
    let row = sqlx::query("SELECT encrypted_content FROM chat_messages WHERE id = $1")
        .bind(sent.id)
        .fetch_one(&pool)
        .await
        .expect("stored row");
    let stored: String = row.get("encrypted_content");
    assert!(!stored.contains("quanto custa?"));
    assert!(cipher_core::is_valid_ciphertext(&stored));

    let page = ChatService::get_messages(&pool, &cipher, room.id, seller, None, None)
        .await
        .expect("seller reads");
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].content, "quanto custa?");

    let err = ChatService::get_messages(&pool, &cipher, room.id, outsider, None, None)
        .await
        .expect_err("outsider blocked");
    assert!(matches!(err, AppError::Authorization(_)));

    let err = ChatService::send_message(&pool, &cipher, room.id, outsider, "oi")
        .await
        .expect_err("outsider cannot send");
    assert!(matches!(err, AppError::Authorization(_)));
}

#[tokio::test]
#[serial]
#[ignore]
async fn message_length_limits_are_enforced_in_characters() {
    let pool = bootstrap_pool().await;
    let cipher = test_cipher();
    let seller = seed_profile(&pool, "player").await;
    let buyer = seed_profile(&pool, "player").await;
    let listing = seed_listing(&pool, seller, "active").await;
    let room = ChatService::create_room(&pool, listing, buyer)
        .await
        .expect("create room");

    let err = ChatService::send_message(&pool, &cipher, room.id, buyer, "")
        .await
        .expect_err("empty message");
    assert!(matches!(err, AppError::Validation(_)));

    // 2000 multibyte characters are fine even though the byte count is larger
    let exactly_limit = "ç".repeat(2000);
    ChatService::send_message(&pool, &cipher, room.id, buyer, &exactly_limit)
        .await
        .expect("2000 chars accepted");

    let over_limit = "a".repeat(2001);
    let err = ChatService::send_message(&pool, &cipher, room.id, buyer, &over_limit)
        .await
        .expect_err("2001 chars rejected");
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
#[serial]
#[ignore]
async fn pagination_walks_history_chronologically_without_gaps() {
    let pool = bootstrap_pool().await;
    let cipher = test_cipher();
    let seller = seed_profile(&pool, "player").await;
    let buyer = seed_profile(&pool, "player").await;
    let listing = seed_listing(&pool, seller, "active").await;
    let room = ChatService::create_room(&pool, listing, buyer)
        .await
        .expect("create room");

    for i in 0..7 {
        ChatService::send_message(&pool, &cipher, room.id, buyer, &format!("msg-{i}"))
            .await
            .expect("send");
    }

    // First page: the 3 newest messages, in chronological order
    let page1 = ChatService::get_messages(&pool, &cipher, room.id, seller, Some(3), None)
        .await
        .expect("page 1");
    assert_eq!(
        page1.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        vec!["msg-4", "msg-5", "msg-6"]
    );
    let cursor = page1.next_cursor.expect("older page exists");

    let page2 = ChatService::get_messages(&pool, &cipher, room.id, seller, Some(3), Some(cursor))
        .await
        .expect("page 2");
    assert_eq!(
        page2.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        vec!["msg-1", "msg-2", "msg-3"]
    );
    let cursor = page2.next_cursor.expect("one more page");

    let page3 = ChatService::get_messages(&pool, &cipher, room.id, seller, Some(3), Some(cursor))
        .await
        .expect("page 3");
    assert_eq!(page3.messages.len(), 1);
    assert_eq!(page3.messages[0].content, "msg-0");
    assert!(page3.next_cursor.is_none());
}

#[tokio::test]
#[serial]
#[ignore]
async fn banned_user_cannot_open_rooms_or_file_reports() {
    let pool = bootstrap_pool().await;
    let cipher = test_cipher();
    let seller = seed_profile(&pool, "player").await;
    let banned = seed_profile(&pool, "player").await;
    sqlx::query("UPDATE user_profiles SET is_banned = TRUE WHERE user_id = $1")
        .bind(banned)
        .execute(&pool)
        .await
        .expect("ban");
    let listing = seed_listing(&pool, seller, "active").await;

    let err = ChatService::create_room(&pool, listing, banned)
        .await
        .expect_err("banned buyer");
    assert!(matches!(err, AppError::Authorization(_)));

    let err = ReportService::create(
        &pool,
        &cipher,
        banned,
        ReportTargetType::Listing,
        listing,
        "scam",
        None,
    )
    .await
    .expect_err("banned reporter");
    assert!(matches!(err, AppError::Authorization(_)));
}

// ============================================================================
// 3. Reports
// ============================================================================

#[tokio::test]
#[serial]
#[ignore]
async fn duplicate_pending_report_conflicts_until_resolved() {
    let pool = bootstrap_pool().await;
    let cipher = test_cipher();
    let seller = seed_profile(&pool, "player").await;
    let reporter = seed_profile(&pool, "player").await;
    let moderator = seed_profile(&pool, "moderator").await;
    let listing = seed_listing(&pool, seller, "active").await;

    let report = ReportService::create(
        &pool,
        &cipher,
        reporter,
        ReportTargetType::Listing,
        listing,
        "spam",
        None,
    )
    .await
    .expect("first report");

    let err = ReportService::create(
        &pool,
        &cipher,
        reporter,
        ReportTargetType::Listing,
        listing,
        "spam",
        None,
    )
    .await
    .expect_err("duplicate pending");
    assert!(matches!(err, AppError::Conflict(_)));

    ReportService::resolve(&pool, moderator, report.id, ReportAction::Dismiss, None)
        .await
        .expect("dismiss");

    // A new report on the same target is allowed once the first is terminal
    ReportService::create(
        &pool,
        &cipher,
        reporter,
        ReportTargetType::Listing,
        listing,
        "spam",
        None,
    )
    .await
    .expect("re-report after dismissal");
}

#[tokio::test]
#[serial]
#[ignore]
async fn snapshot_captures_chat_chronologically_and_survives_later_messages() {
    let pool = bootstrap_pool().await;
    let cipher = test_cipher();
    let seller = seed_profile(&pool, "player").await;
    let buyer = seed_profile(&pool, "player").await;
    let moderator = seed_profile(&pool, "moderator").await;
    let listing = seed_listing(&pool, seller, "active").await;
    let room = ChatService::create_room(&pool, listing, buyer)
        .await
        .expect("create room");

    ChatService::send_message(&pool, &cipher, room.id, buyer, "oi")
        .await
        .expect("send 1");
    ChatService::send_message(&pool, &cipher, room.id, buyer, "quanto custa?")
        .await
        .expect("send 2");

    let report = ReportService::create(
        &pool,
        &cipher,
        buyer,
        ReportTargetType::Listing,
        listing,
        "unrealistic_price",
        Some(room.id),
    )
    .await
    .expect("report with snapshot");

    // Messages sent after filing must not leak into the evidence
    ChatService::send_message(&pool, &cipher, room.id, seller, "depois do report")
        .await
        .expect("send 3");

    let detail = ReportService::get_by_id(&pool, &cipher, moderator, report.id)
        .await
        .expect("moderator view");
    let snapshot: Vec<SnapshotEntry> = detail.chat_snapshot.expect("snapshot present");
    assert_eq!(
        snapshot.iter().map(|e| e.content.as_str()).collect::<Vec<_>>(),
        vec!["oi", "quanto custa?"]
    );
    assert_eq!(snapshot[0].sender_id, buyer);

    // Raw column holds one sealed blob, not plaintext
    let row = sqlx::query("SELECT encrypted_chat_log FROM reports WHERE id = $1")
        .bind(report.id)
        .fetch_one(&pool)
        .await
        .expect("raw report row");
    let blob: Option<String> = row.get("encrypted_chat_log");
    let blob = blob.expect("snapshot stored");
    assert!(cipher_core::is_valid_ciphertext(&blob));
    assert!(!blob.contains("quanto custa?"));
}

#[tokio::test]
#[serial]
#[ignore]
async fn snapshot_skipped_for_non_participants_and_queue_requires_moderator() {
    let pool = bootstrap_pool().await;
    let cipher = test_cipher();
    let seller = seed_profile(&pool, "player").await;
    let buyer = seed_profile(&pool, "player").await;
    let outsider = seed_profile(&pool, "player").await;
    let listing = seed_listing(&pool, seller, "active").await;
    let room = ChatService::create_room(&pool, listing, buyer)
        .await
        .expect("create room");
    ChatService::send_message(&pool, &cipher, room.id, buyer, "oi")
        .await
        .expect("send");

    // A reporter outside the room still files the report, just without evidence
    let report = ReportService::create(
        &pool,
        &cipher,
        outsider,
        ReportTargetType::Listing,
        listing,
        "scam",
        Some(room.id),
    )
    .await
    .expect("outsider report goes through");
    let row = sqlx::query("SELECT encrypted_chat_log FROM reports WHERE id = $1")
        .bind(report.id)
        .fetch_one(&pool)
        .await
        .expect("report row");
    let blob: Option<String> = row.get("encrypted_chat_log");
    assert!(blob.is_none(), "no snapshot for a non-participant");

    let err = ReportService::get_queue(&pool, outsider)
        .await
        .expect_err("player reading queue");
    assert!(matches!(err, AppError::Authorization(_)));

    let err = ReportService::get_by_id(&pool, &cipher, outsider, Uuid::new_v4())
        .await
        .expect_err("player reading detail");
    assert!(matches!(err, AppError::Authorization(_)));
}

// ============================================================================
// 4. Resolution
// ============================================================================

#[tokio::test]
#[serial]
#[ignore]
async fn resolve_applies_side_effect_exactly_once() {
    let pool = bootstrap_pool().await;
    let cipher = test_cipher();
    let seller = seed_profile(&pool, "player").await;
    let reporter = seed_profile(&pool, "player").await;
    let moderator = seed_profile(&pool, "moderator").await;
    let listing = seed_listing(&pool, seller, "active").await;

    let report = ReportService::create(
        &pool,
        &cipher,
        reporter,
        ReportTargetType::Listing,
        listing,
        "scam",
        None,
    )
    .await
    .expect("report");

    let resolved = ReportService::resolve(
        &pool,
        moderator,
        report.id,
        ReportAction::RemoveListing,
        Some("confirmed scam"),
    )
    .await
    .expect("resolve");
    assert_eq!(resolved.status, "resolved");
    assert_eq!(resolved.moderator_id, Some(moderator));
    assert_eq!(resolved.resolution.as_deref(), Some("confirmed scam"));
    assert!(resolved.resolved_at.is_some());

    let status: String = sqlx::query("SELECT status FROM listings WHERE id = $1")
        .bind(listing)
        .fetch_one(&pool)
        .await
        .expect("listing row")
        .get("status");
    assert_eq!(status, "deleted");

    let err = ReportService::resolve(&pool, moderator, report.id, ReportAction::Dismiss, None)
        .await
        .expect_err("second resolve");
    assert!(matches!(err, AppError::BadRequest(_)));

    // The reporter is told about the outcome
    let notified: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM notifications WHERE user_id = $1 AND type = 'report_action'",
    )
    .bind(reporter)
    .fetch_one(&pool)
    .await
    .expect("notification count")
    .get("n");
    assert!(notified >= 1);
}

#[tokio::test]
#[serial]
#[ignore]
async fn ban_via_listing_report_bans_the_seller() {
    let pool = bootstrap_pool().await;
    let cipher = test_cipher();
    let seller = seed_profile(&pool, "player").await;
    let reporter = seed_profile(&pool, "player").await;
    let moderator = seed_profile(&pool, "moderator").await;
    let listing = seed_listing(&pool, seller, "active").await;

    let report = ReportService::create(
        &pool,
        &cipher,
        reporter,
        ReportTargetType::Listing,
        listing,
        "scam",
        None,
    )
    .await
    .expect("report");

    ReportService::resolve(&pool, moderator, report.id, ReportAction::BanUser, None)
        .await
        .expect("ban via listing");

    let banned: bool = sqlx::query("SELECT is_banned FROM user_profiles WHERE user_id = $1")
        .bind(seller)
        .fetch_one(&pool)
        .await
        .expect("profile row")
        .get("is_banned");
    assert!(banned, "seller behind the listing must be banned");

    let another = seed_listing(&pool, seller, "active").await;
    let err = ChatService::create_room(&pool, another, seller)
        .await
        .expect_err("banned seller as buyer");
    assert!(matches!(err, AppError::Authorization(_)));
}

#[tokio::test]
#[serial]
#[ignore]
async fn snapshot_is_sealed_after_resolution() {
    let pool = bootstrap_pool().await;
    let cipher = test_cipher();
    let seller = seed_profile(&pool, "player").await;
    let buyer = seed_profile(&pool, "player").await;
    let moderator = seed_profile(&pool, "moderator").await;
    let listing = seed_listing(&pool, seller, "active").await;
    let room = ChatService::create_room(&pool, listing, buyer)
        .await
        .expect("create room");
    ChatService::send_message(&pool, &cipher, room.id, buyer, "oi")
        .await
        .expect("send");

    let report = ReportService::create(
        &pool,
        &cipher,
        buyer,
        ReportTargetType::Listing,
        listing,
        "spam",
        Some(room.id),
    )
    .await
    .expect("report with snapshot");

    let pending = ReportService::get_by_id(&pool, &cipher, moderator, report.id)
        .await
        .expect("pending view");
    assert!(pending.chat_snapshot.is_some());

    ReportService::resolve(&pool, moderator, report.id, ReportAction::Dismiss, None)
        .await
        .expect("dismiss");

    let dismissed = ReportService::get_by_id(&pool, &cipher, moderator, report.id)
        .await
        .expect("dismissed view");
    assert!(
        dismissed.chat_snapshot.is_none(),
        "snapshot must stay sealed once the report leaves the queue"
    );
    assert_eq!(dismissed.report.status, "dismissed");
}
