use sqlx::SqlitePool;
use std::time::Duration;
use tether::config::Config;
use tether::reminders::{cutoff_days, MaintenanceRepo, ReminderRepo, ReminderScheduler};
use tether::trigger::{JobOptions, TriggerError, TriggerService};
use tracing::info;

/// Purges above this size are followed by a VACUUM.
const VACUUM_AFTER_ROWS: u64 = 500;

pub fn register_jobs(
    triggers: &TriggerService,
    cfg: &Config,
    pool: SqlitePool,
    scheduler: ReminderScheduler,
) -> Result<(), TriggerError> {
    let maintenance = MaintenanceRepo::new(pool.clone());
    let purge_after_days = cfg.purge_after_days;
    triggers.register(
        "purge-finished",
        JobOptions::new(cfg.housekeeping_interval, move || {
            let maintenance = maintenance.clone();
            async move {
                let deleted = maintenance
                    .purge_finished_older_than(cutoff_days(purge_after_days))
                    .await?;
                if deleted > 0 {
                    info!(deleted, purge_after_days, "purged finished reminders");
                }
                if deleted >= VACUUM_AFTER_ROWS {
                    maintenance.vacuum().await?;
                }
                anyhow::Ok(())
            }
        })
        .immediate(true)
        .description(format!(
            "delete completed and cancelled reminders older than {purge_after_days} days"
        )),
    )?;

    // Picks up recurring reminders added or cancelled by tetherctl.
    triggers.register(
        "refresh-recurring",
        JobOptions::new(cfg.poll_interval.max(Duration::from_secs(5)), move || {
            let scheduler = scheduler.clone();
            async move {
                scheduler.refresh_recurring().await?;
                anyhow::Ok(())
            }
        })
        .description("sync cron timers with recurring reminders in the store"),
    )?;

    let repo = ReminderRepo::new(pool);
    triggers.register(
        "stats-snapshot",
        JobOptions::new(cfg.housekeeping_interval, move || {
            let repo = repo.clone();
            async move {
                let counts = repo.count_by_status().await?;
                info!(
                    pending = counts.pending,
                    completed = counts.completed,
                    cancelled = counts.cancelled,
                    "reminder stats"
                );
                anyhow::Ok(())
            }
        })
        .description("log reminder counts per status"),
    )?;

    Ok(())
}
