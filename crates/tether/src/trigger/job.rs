use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
pub type JobHandler = Arc<dyn Fn() -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

/// Registration options for a trigger job.
#[derive(Clone)]
pub struct JobOptions {
    pub(crate) interval: Duration,
    pub(crate) handler: JobHandler,
    pub(crate) immediate: bool,
    pub(crate) enabled: bool,
    pub(crate) description: Option<String>,
}

impl JobOptions {
    /// Enabled, not immediate, no description.
    pub fn new<F, Fut>(interval: Duration, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            interval,
            handler: Arc::new(move || -> BoxFuture<anyhow::Result<()>> { Box::pin(handler()) }),
            immediate: false,
            enabled: true,
            description: None,
        }
    }

    /// Also run once as soon as the timer is first armed.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub message: String,
    /// Full error chain (`{:?}` of the error).
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Written only by the executor.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunStats {
    pub run_count: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration: Option<Duration>,
    pub last_error: Option<LastError>,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub armed: bool,
    pub interval_ms: u64,
    pub interval_human: String,
    pub run_count: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<LastError>,
    pub created_at: DateTime<Utc>,
    pub next_run: Option<DateTime<Utc>>,
}

fn unit(n: u64, name: &str) -> String {
    format!("{} {}{}", n, name, if n == 1 { "" } else { "s" })
}

/// Human-readable interval: "250 ms", "30 seconds", "1 hour 30 minutes", "2 days".
pub fn format_interval(interval: Duration) -> String {
    let millis = interval.as_millis() as u64;
    let seconds = interval.as_secs();

    if millis < 1000 {
        format!("{millis} ms")
    } else if seconds < 60 {
        unit(seconds, "second")
    } else if seconds < 3600 {
        let mins = seconds / 60;
        let secs = seconds % 60;
        if secs > 0 {
            format!("{} {}", unit(mins, "minute"), unit(secs, "second"))
        } else {
            unit(mins, "minute")
        }
    } else if seconds < 86400 {
        let hours = seconds / 3600;
        let mins = (seconds % 3600) / 60;
        if mins > 0 {
            format!("{} {}", unit(hours, "hour"), unit(mins, "minute"))
        } else {
            unit(hours, "hour")
        }
    } else {
        let days = seconds / 86400;
        let hours = (seconds % 86400) / 3600;
        if hours > 0 {
            format!("{} {}", unit(days, "day"), unit(hours, "hour"))
        } else {
            unit(days, "day")
        }
    }
}

/// `(last_run or created_at) + interval`, pushed to `now + interval` when that
/// is already in the past.
pub fn estimate_next_run(
    last_run: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    interval: Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let step = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX);
    let base = last_run.unwrap_or(created_at);
    let next = base.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC);
    if next < now {
        now.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC)
    } else {
        next
    }
}
