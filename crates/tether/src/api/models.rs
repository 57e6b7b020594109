// crates/tether/src/api/models.rs
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reminders::{Reminder, ReminderKind, ReminderStatus};
use crate::schedule::next_cron_fire;

/// Flat view of a reminder for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderListItem {
    pub id: Uuid,
    pub message: String,
    pub kind: String,
    pub channel: String,
    pub status: ReminderStatus,

    pub trigger_at: Option<DateTime<Utc>>,
    pub cron_expression: Option<String>,
    /// Next cron fire for pending recurring reminders.
    pub next_fire: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<Reminder> for ReminderListItem {
    fn from(r: Reminder) -> Self {
        let next_fire = match (&r.kind, r.status) {
            (ReminderKind::Recurring { cron }, ReminderStatus::Pending) => {
                next_cron_fire(cron, &Local::now())
                    .ok()
                    .flatten()
                    .map(|at| at.with_timezone(&Utc))
            }
            _ => None,
        };

        Self {
            kind: kind_name(&r.kind).to_string(),
            trigger_at: r.trigger_at(),
            cron_expression: r.cron_expression().map(str::to_string),
            next_fire,
            id: r.id,
            message: r.message,
            channel: r.channel,
            status: r.status,
            created_at: r.created_at,
            completed_at: r.completed_at,
            cancelled_at: r.cancelled_at,
        }
    }
}

pub fn kind_name(kind: &ReminderKind) -> &'static str {
    match kind {
        ReminderKind::Once { .. } => "once",
        ReminderKind::Recurring { .. } => "recurring",
    }
}
