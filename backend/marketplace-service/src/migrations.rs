use sqlx::{Pool, Postgres};

// Embed SQL migrations at compile time for deterministic startup
const MIG_0001: &str = include_str!("../migrations/0001_create_user_profiles.sql");
const MIG_0002: &str = include_str!("../migrations/0002_create_listings.sql");
const MIG_0003: &str = include_str!("../migrations/0003_create_chat_rooms.sql");
const MIG_0004: &str = include_str!("../migrations/0004_create_chat_messages.sql");
const MIG_0005: &str = include_str!("../migrations/0005_create_reports.sql");
const MIG_0006: &str = include_str!("../migrations/0006_create_notifications.sql");

/// Applies all migrations in order. Every statement is IF NOT EXISTS, so the
/// run is idempotent across restarts.
pub async fn run_all(db: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    let migrations = [MIG_0001, MIG_0002, MIG_0003, MIG_0004, MIG_0005, MIG_0006];
    for (i, sql) in migrations.into_iter().enumerate() {
        let label = i + 1;
        sqlx::raw_sql(sql).execute(db).await?;
        tracing::info!(migration = %label, "migration applied");
    }
    Ok(())
}
