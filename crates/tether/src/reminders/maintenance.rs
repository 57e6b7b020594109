use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct MaintenanceRepo {
    pool: SqlitePool,
}

impl MaintenanceRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete completed and cancelled reminders that finished before `cutoff`.
    /// Pending reminders (including every recurring one) are never touched.
    /// Returns number deleted.
    pub async fn purge_finished_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let cutoff_ms = cutoff.timestamp_millis();

        let deleted = sqlx::query(
            r#"
            DELETE FROM reminders
            WHERE (status = 'completed' AND completed_at < ?1)
               OR (status = 'cancelled' AND cancelled_at < ?1)
            "#,
        )
        .bind(cutoff_ms)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }

    /// Reclaim free pages after large purges.
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}

/// Convenience: compute cutoff like "now - N days"
pub fn cutoff_days(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}
