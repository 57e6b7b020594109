//! Interval jobs with run metadata: register a named async closure, let it
//! tick on its own timer, and inspect or control it by name.

pub mod job;
pub mod service;

pub use job::{format_interval, JobHandler, JobOptions, JobStatus, LastError};
pub use service::{TriggerError, TriggerService};
