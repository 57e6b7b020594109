pub mod clock;
pub mod cron;
pub mod parser;
pub mod phrase;

pub use self::cron::{is_valid_cron, next_cron_fire, parse_schedule};
pub use parser::{parse_time_expression, parse_time_expression_at};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of parsing a reminder time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeExpression {
    /// Fires on every match of a 5-field cron expression.
    Recurring { cron: String, description: String },
    /// Fires once at `at`; `text` is the input as typed.
    Once { at: DateTime<Utc>, text: String },
}

impl TimeExpression {
    pub fn is_recurring(&self) -> bool {
        matches!(self, TimeExpression::Recurring { .. })
    }

    pub fn description(&self) -> &str {
        match self {
            TimeExpression::Recurring { description, .. } => description,
            TimeExpression::Once { text, .. } => text,
        }
    }
}
