use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Completed => "completed",
            ReminderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ReminderStatus::Pending),
            "completed" => Ok(ReminderStatus::Completed),
            "cancelled" | "canceled" => Ok(ReminderStatus::Cancelled),
            _ => Err(anyhow::anyhow!("invalid reminder status: {s}")),
        }
    }
}

/// When a reminder fires. A reminder has exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReminderKind {
    Once { at: DateTime<Utc> },
    Recurring { cron: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub message: String,
    pub kind: ReminderKind,
    pub channel: String,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Reminder {
    pub fn trigger_at(&self) -> Option<DateTime<Utc>> {
        match &self.kind {
            ReminderKind::Once { at } => Some(*at),
            ReminderKind::Recurring { .. } => None,
        }
    }

    pub fn cron_expression(&self) -> Option<&str> {
        match &self.kind {
            ReminderKind::Once { .. } => None,
            ReminderKind::Recurring { cron } => Some(cron),
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self.kind, ReminderKind::Recurring { .. })
    }
}

#[derive(Debug, Clone)]
pub struct NewReminder {
    pub message: String,
    pub kind: ReminderKind,
    pub channel: String,
}

/// Row shape of the `reminders` table. Timestamps are unix milliseconds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReminderRow {
    pub id: String,
    pub message: String,
    pub trigger_at: Option<i64>,
    pub cron_expression: Option<String>,
    pub channel: String,
    pub status: String,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub cancelled_at: Option<i64>,
}

pub(crate) fn from_millis(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {ms}"))
}

impl TryFrom<ReminderRow> for Reminder {
    type Error = anyhow::Error;

    fn try_from(row: ReminderRow) -> anyhow::Result<Self> {
        let kind = match (row.trigger_at, row.cron_expression) {
            (Some(ms), None) => ReminderKind::Once { at: from_millis(ms)? },
            (None, Some(cron)) => ReminderKind::Recurring { cron },
            _ => anyhow::bail!(
                "reminder {} must have exactly one of trigger_at / cron_expression",
                row.id
            ),
        };

        Ok(Reminder {
            id: row.id.parse()?,
            message: row.message,
            kind,
            channel: row.channel,
            status: row.status.parse()?,
            created_at: from_millis(row.created_at)?,
            completed_at: row.completed_at.map(from_millis).transpose()?,
            cancelled_at: row.cancelled_at.map(from_millis).transpose()?,
        })
    }
}

/// Reminder counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub completed: i64,
    pub cancelled: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.completed + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(trigger_at: Option<i64>, cron: Option<&str>) -> ReminderRow {
        ReminderRow {
            id: Uuid::new_v4().to_string(),
            message: "stretch".into(),
            trigger_at,
            cron_expression: cron.map(String::from),
            channel: "notification".into(),
            status: "pending".into(),
            created_at: 1_760_000_000_000,
            completed_at: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ReminderStatus::Pending,
            ReminderStatus::Completed,
            ReminderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ReminderStatus>().unwrap(), status);
        }
        assert_eq!(
            "Canceled".parse::<ReminderStatus>().unwrap(),
            ReminderStatus::Cancelled
        );
        assert!("done".parse::<ReminderStatus>().is_err());
    }

    #[test]
    fn row_maps_to_exactly_one_kind() {
        let once = Reminder::try_from(row(Some(1_760_000_060_000), None)).unwrap();
        assert_eq!(once.trigger_at().unwrap().timestamp_millis(), 1_760_000_060_000);
        assert_eq!(once.cron_expression(), None);

        let recurring = Reminder::try_from(row(None, Some("0 9 * * 1-5"))).unwrap();
        assert_eq!(recurring.cron_expression(), Some("0 9 * * 1-5"));
        assert!(recurring.is_recurring());

        assert!(Reminder::try_from(row(None, None)).is_err());
        assert!(Reminder::try_from(row(Some(1), Some("* * * * *"))).is_err());
    }
}
