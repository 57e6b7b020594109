use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tether::db::{make_memory_pool, run_migrations};
use uuid::Uuid;

pub async fn setup_db() -> SqlitePool {
    let pool = make_memory_pool()
        .await
        .expect("failed to open in-memory sqlite");

    run_migrations(&pool).await.expect("migrations failed");

    pool
}

/// Insert a finished one-time reminder with explicit timestamps.
#[allow(dead_code)]
pub async fn insert_finished(
    pool: &SqlitePool,
    status: &str,
    finished_at: DateTime<Utc>,
) -> Uuid {
    let id = Uuid::new_v4();
    let ms = finished_at.timestamp_millis();
    let (completed_at, cancelled_at) = match status {
        "completed" => (Some(ms), None),
        "cancelled" => (None, Some(ms)),
        other => panic!("not a finished status: {other}"),
    };

    sqlx::query(
        r#"
        INSERT INTO reminders (
            id, message, trigger_at, cron_expression, channel, status,
            created_at, completed_at, cancelled_at
        )
        VALUES (?1, 'old reminder', ?2, NULL, 'notification', ?3, ?2, ?4, ?5)
        "#,
    )
    .bind(id.to_string())
    .bind(ms)
    .bind(status)
    .bind(completed_at)
    .bind(cancelled_at)
    .execute(pool)
    .await
    .expect("failed to insert reminder");

    id
}
