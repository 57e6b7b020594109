pub mod maintenance;
pub mod model;
pub mod repo;
pub mod scheduler;

pub use maintenance::{cutoff_days, MaintenanceRepo};
pub use model::{NewReminder, Reminder, ReminderKind, ReminderStatus, StatusCounts};
pub use repo::ReminderRepo;
pub use scheduler::{AlertHandler, ReminderScheduler, SchedulerError};
