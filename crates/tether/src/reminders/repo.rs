use crate::reminders::model::{
    NewReminder, Reminder, ReminderKind, ReminderRow, ReminderStatus, StatusCounts,
};
use crate::schedule::is_valid_cron;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

const COLUMNS: &str = r#"
    id, message, trigger_at, cron_expression, channel, status,
    created_at, completed_at, cancelled_at
"#;

/// Persistence for reminders. Every call is a single auto-committed
/// statement, so each mutation is durable once it returns.
#[derive(Clone)]
pub struct ReminderRepo {
    pool: SqlitePool,
}

impl ReminderRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ----------------------------
    // Create
    // ----------------------------

    pub async fn create(&self, reminder: NewReminder) -> anyhow::Result<Uuid> {
        let (trigger_at, cron_expression) = match &reminder.kind {
            ReminderKind::Once { at } => (Some(at.timestamp_millis()), None),
            ReminderKind::Recurring { cron } => {
                if !is_valid_cron(cron) {
                    anyhow::bail!("invalid cron expression: {cron:?}");
                }
                (None, Some(cron.as_str()))
            }
        };

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO reminders (id, message, trigger_at, cron_expression, channel, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(id.to_string())
        .bind(&reminder.message)
        .bind(trigger_at)
        .bind(cron_expression)
        .bind(&reminder.channel)
        .bind(ReminderStatus::Pending.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn create_once(
        &self,
        message: &str,
        at: DateTime<Utc>,
        channel: &str,
    ) -> anyhow::Result<Uuid> {
        self.create(NewReminder {
            message: message.to_string(),
            kind: ReminderKind::Once { at },
            channel: channel.to_string(),
        })
        .await
    }

    pub async fn create_recurring(
        &self,
        message: &str,
        cron: &str,
        channel: &str,
    ) -> anyhow::Result<Uuid> {
        self.create(NewReminder {
            message: message.to_string(),
            kind: ReminderKind::Recurring {
                cron: cron.to_string(),
            },
            channel: channel.to_string(),
        })
        .await
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<Reminder>> {
        let row = sqlx::query_as::<_, ReminderRow>(&format!(
            "SELECT {COLUMNS} FROM reminders WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Reminder::try_from).transpose()
    }

    /// Pending one-time reminders whose trigger time is at or before `now`,
    /// earliest first.
    pub async fn due(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Reminder>> {
        let rows = sqlx::query_as::<_, ReminderRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM reminders
            WHERE status = 'pending'
              AND trigger_at IS NOT NULL
              AND trigger_at <= ?1
            ORDER BY trigger_at ASC, created_at ASC
            "#
        ))
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        into_reminders(rows)
    }

    pub async fn pending(&self) -> anyhow::Result<Vec<Reminder>> {
        let rows = sqlx::query_as::<_, ReminderRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM reminders
            WHERE status = 'pending'
            ORDER BY created_at ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        into_reminders(rows)
    }

    /// Pending reminders driven by a cron expression.
    pub async fn recurring(&self) -> anyhow::Result<Vec<Reminder>> {
        let rows = sqlx::query_as::<_, ReminderRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM reminders
            WHERE status = 'pending'
              AND cron_expression IS NOT NULL
            ORDER BY created_at ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        into_reminders(rows)
    }

    /// Newest first. `limit` is clamped to [1, 500].
    pub async fn list(
        &self,
        status: Option<ReminderStatus>,
        limit: i64,
    ) -> anyhow::Result<Vec<Reminder>> {
        let limit = limit.clamp(1, 500);

        let rows = match status {
            Some(st) => {
                sqlx::query_as::<_, ReminderRow>(&format!(
                    r#"
                    SELECT {COLUMNS}
                    FROM reminders
                    WHERE status = ?1
                    ORDER BY created_at DESC
                    LIMIT ?2
                    "#
                ))
                .bind(st.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ReminderRow>(&format!(
                    r#"
                    SELECT {COLUMNS}
                    FROM reminders
                    ORDER BY created_at DESC
                    LIMIT ?1
                    "#
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        into_reminders(rows)
    }

    pub async fn count_by_status(&self) -> anyhow::Result<StatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM reminders
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            match status.parse::<ReminderStatus>()? {
                ReminderStatus::Pending => counts.pending = n,
                ReminderStatus::Completed => counts.completed = n,
                ReminderStatus::Cancelled => counts.cancelled = n,
            }
        }
        Ok(counts)
    }

    // ----------------------------
    // Transitions (pending only)
    // ----------------------------

    /// Returns false when no pending reminder with this id exists.
    pub async fn mark_completed(&self, id: Uuid) -> anyhow::Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE reminders
            SET status = 'completed',
                completed_at = ?2
            WHERE id = ?1
              AND status = 'pending'
            "#,
        )
        .bind(id.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    /// Returns false when no pending reminder with this id exists.
    pub async fn mark_cancelled(&self, id: Uuid) -> anyhow::Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE reminders
            SET status = 'cancelled',
                cancelled_at = ?2
            WHERE id = ?1
              AND status = 'pending'
            "#,
        )
        .bind(id.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }
}

fn into_reminders(rows: Vec<ReminderRow>) -> anyhow::Result<Vec<Reminder>> {
    rows.into_iter().map(Reminder::try_from).collect()
}
