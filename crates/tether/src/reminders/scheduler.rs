//! Reminder scheduler: a poll timer for one-time reminders plus one cron
//! timer per recurring reminder.
//!
//! Firing a reminder means handing it to the alert handler. One-time reminders
//! are marked completed afterwards whether or not the handler succeeded;
//! recurring reminders stay pending until cancelled.
//!
//! Due checks are serialized: the poll timer, the check run by `start` and
//! manual checks never look at the same due reminder at the same time.

use crate::reminders::model::{NewReminder, Reminder, ReminderKind, ReminderStatus};
use crate::reminders::repo::ReminderRepo;
use crate::schedule::{parse_schedule, parse_time_expression, TimeExpression};
use chrono::{DateTime, Local, Utc};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub type AlertFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub type AlertHandler = Arc<dyn Fn(Reminder) -> AlertFuture + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("could not understand reminder time {0:?}")]
    UnparseableTime(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Default)]
struct Timers {
    poll: Option<JoinHandle<()>>,
    cron: HashMap<Uuid, JoinHandle<()>>,
}

type SharedAlert = Arc<RwLock<Option<AlertHandler>>>;

/// One pass over the due one-time reminders, detached from the scheduler so
/// that stopping it never cuts a pass short.
#[derive(Clone)]
struct DueCheck {
    store: ReminderRepo,
    alert: SharedAlert,
    serial: Arc<tokio::sync::Mutex<()>>,
}

impl DueCheck {
    async fn run(self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let _serial = self.serial.lock().await;

        let due = self.store.due(now).await?;
        if !due.is_empty() {
            debug!(count = due.len(), "due reminders");
        }

        let mut fired = 0;
        for reminder in due {
            let id = reminder.id;
            dispatch(self.alert.clone(), reminder).await;
            fired += 1;

            if let Err(e) = self.store.mark_completed(id).await {
                warn!(%id, "could not mark reminder completed: {e:#}");
            }
        }
        Ok(fired)
    }
}

#[derive(Clone)]
pub struct ReminderScheduler {
    store: ReminderRepo,
    alert: SharedAlert,
    timers: Arc<Mutex<Timers>>,
    poll_interval: Duration,
    due_serial: Arc<tokio::sync::Mutex<()>>,
}

impl ReminderScheduler {
    pub fn new(store: ReminderRepo) -> Self {
        Self {
            store,
            alert: Arc::new(RwLock::new(None)),
            timers: Arc::new(Mutex::new(Timers::default())),
            poll_interval: DEFAULT_POLL_INTERVAL,
            due_serial: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn store(&self) -> &ReminderRepo {
        &self.store
    }

    pub fn set_alert_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Reminder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: AlertHandler =
            Arc::new(move |reminder: Reminder| -> AlertFuture { Box::pin(handler(reminder)) });
        *self.alert.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    fn due_check(&self) -> DueCheck {
        DueCheck {
            store: self.store.clone(),
            alert: self.alert.clone(),
            serial: self.due_serial.clone(),
        }
    }

    fn timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.timers().poll.is_some()
    }

    pub fn armed_cron_count(&self) -> usize {
        self.timers().cron.len()
    }

    // ----------------------------
    // Lifecycle
    // ----------------------------

    /// Arm the poll timer, run one due check right away, then arm a cron timer
    /// for every pending recurring reminder. No-op when already running.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        {
            let mut timers = self.timers();
            if timers.poll.is_some() {
                return Ok(());
            }
            timers.poll = Some(self.spawn_poll_timer());
        }
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "reminder scheduler started");

        if let Err(e) = self.check_due_reminders().await {
            warn!("initial due check failed: {e:#}");
        }

        let recurring = match self.store.recurring().await {
            Ok(list) => list,
            Err(e) => {
                self.stop();
                return Err(e.into());
            }
        };
        for reminder in &recurring {
            self.arm_cron(reminder);
        }
        debug!(count = recurring.len(), "armed recurring reminders");

        Ok(())
    }

    /// Disarm every timer. Reminder statuses are left as they are; a due check
    /// or delivery already in progress runs to completion.
    pub fn stop(&self) {
        let mut timers = self.timers();
        let was_running = timers.poll.is_some();

        if let Some(poll) = timers.poll.take() {
            poll.abort();
        }
        for (_, handle) in timers.cron.drain() {
            handle.abort();
        }

        if was_running {
            info!("reminder scheduler stopped");
        }
    }

    fn spawn_poll_timer(&self) -> JoinHandle<()> {
        let check = self.due_check();
        let period = self.poll_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut previous: Option<JoinHandle<()>> = None;

            loop {
                ticker.tick().await;
                if previous.as_ref().is_some_and(|h| !h.is_finished()) {
                    debug!("previous due check still in progress, skipping tick");
                    continue;
                }
                let check = check.clone();
                previous = Some(tokio::spawn(async move {
                    if let Err(e) = check.run(Utc::now()).await {
                        warn!("due check failed: {e:#}");
                    }
                }));
            }
        })
    }

    fn arm_cron(&self, reminder: &Reminder) {
        let ReminderKind::Recurring { cron } = &reminder.kind else {
            return;
        };
        let schedule = match parse_schedule(cron) {
            Ok(s) => s,
            Err(e) => {
                warn!(id = %reminder.id, "not arming recurring reminder: {e:#}");
                return;
            }
        };

        let handle = spawn_cron_timer(
            self.store.clone(),
            self.alert.clone(),
            reminder.clone(),
            schedule,
        );
        if let Some(previous) = self.timers().cron.insert(reminder.id, handle) {
            previous.abort();
        }
    }

    /// Bring the armed cron timers in line with the store: arm pending
    /// recurring reminders created elsewhere, drop timers whose reminder is
    /// gone or finished. Returns `(armed, disarmed)`.
    pub async fn refresh_recurring(&self) -> Result<(usize, usize), SchedulerError> {
        if !self.is_running() {
            return Ok((0, 0));
        }

        let recurring = self.store.recurring().await?;
        let wanted: HashSet<Uuid> = recurring.iter().map(|r| r.id).collect();

        let stale: Vec<Uuid> = {
            let mut timers = self.timers();
            timers.cron.retain(|_, handle| !handle.is_finished());
            timers
                .cron
                .keys()
                .filter(|id| !wanted.contains(id))
                .copied()
                .collect()
        };
        for id in &stale {
            self.disarm_cron(*id);
        }

        let mut armed = 0;
        for reminder in &recurring {
            if !self.timers().cron.contains_key(&reminder.id) {
                self.arm_cron(reminder);
                armed += 1;
            }
        }

        if armed > 0 || !stale.is_empty() {
            debug!(armed, disarmed = stale.len(), "recurring timers refreshed");
        }
        Ok((armed, stale.len()))
    }

    fn disarm_cron(&self, id: Uuid) {
        if let Some(handle) = self.timers().cron.remove(&id) {
            handle.abort();
        }
    }

    // ----------------------------
    // Reminders
    // ----------------------------

    /// Parse `time_spec`, persist the reminder, and arm it straight away when
    /// it is recurring and the scheduler is running.
    pub async fn add_reminder(
        &self,
        message: &str,
        time_spec: &str,
        channel: &str,
    ) -> Result<Reminder, SchedulerError> {
        let expr = parse_time_expression(time_spec)
            .ok_or_else(|| SchedulerError::UnparseableTime(time_spec.to_string()))?;

        let kind = match expr {
            TimeExpression::Recurring { cron, .. } => ReminderKind::Recurring { cron },
            TimeExpression::Once { at, .. } => ReminderKind::Once { at },
        };

        let id = self
            .store
            .create(NewReminder {
                message: message.to_string(),
                kind,
                channel: channel.to_string(),
            })
            .await?;

        let reminder = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("reminder {id} vanished after insert"))?;

        info!(
            id = %reminder.id,
            channel = %reminder.channel,
            recurring = reminder.is_recurring(),
            "reminder added"
        );

        if reminder.is_recurring() && self.is_running() {
            self.arm_cron(&reminder);
        }

        Ok(reminder)
    }

    /// Disarm and cancel. Unknown or already finished ids are not an error;
    /// the return value says whether a pending reminder was cancelled.
    pub async fn cancel_reminder(&self, id: Uuid) -> Result<bool, SchedulerError> {
        self.disarm_cron(id);
        let cancelled = self.store.mark_cancelled(id).await?;
        if cancelled {
            info!(%id, "reminder cancelled");
        }
        Ok(cancelled)
    }

    pub async fn check_due_reminders(&self) -> Result<usize, SchedulerError> {
        self.check_due_reminders_at(Utc::now()).await
    }

    /// Fire every pending one-time reminder due at `now`, in trigger order.
    /// Returns how many fired.
    /// Waits behind a due check that is already in progress.
    pub async fn check_due_reminders_at(&self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        Ok(self.due_check().run(now).await?)
    }
}

fn spawn_cron_timer(
    store: ReminderRepo,
    alert: SharedAlert,
    reminder: Reminder,
    schedule: ::cron::Schedule,
) -> JoinHandle<()> {
    let id = reminder.id;

    tokio::spawn(async move {
        let mut last_fire: Option<DateTime<Local>> = None;
        loop {
            let now = Local::now();
            let from = match last_fire {
                Some(last) if last > now => last,
                _ => now,
            };
            let Some(next) = schedule.after(&from).next() else {
                debug!(%id, "cron schedule exhausted");
                break;
            };

            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
            last_fire = Some(next);

            // Cancelled elsewhere (another process or a direct store write).
            match store.get(id).await {
                Ok(Some(current)) if current.status == ReminderStatus::Pending => {}
                Ok(_) => {
                    debug!(%id, "recurring reminder no longer pending, disarming");
                    break;
                }
                Err(e) => warn!(%id, "could not re-check recurring reminder: {e:#}"),
            }

            // Detached so that disarming never cuts a delivery short.
            tokio::spawn(dispatch(alert.clone(), reminder.clone()));
        }
    })
}

async fn dispatch(alert: SharedAlert, reminder: Reminder) {
    let handler = alert.read().unwrap_or_else(|e| e.into_inner()).clone();
    let id = reminder.id;

    let Some(handler) = handler else {
        info!(%id, channel = %reminder.channel, message = %reminder.message, "reminder fired (no alert handler)");
        return;
    };

    info!(%id, channel = %reminder.channel, "reminder fired");
    // Spawned so a panicking handler is contained like an error.
    match tokio::spawn(handler(reminder)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(%id, "alert dispatch failed: {e:#}"),
        Err(e) => warn!(%id, "alert dispatch panicked: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{make_memory_pool, run_migrations};
    use std::str::FromStr;

    async fn recording_store() -> (ReminderRepo, SharedAlert, Arc<Mutex<Vec<Uuid>>>) {
        let pool = make_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let handler: AlertHandler = Arc::new(move |reminder: Reminder| -> AlertFuture {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().unwrap().push(reminder.id);
                anyhow::Ok(())
            })
        });

        (
            ReminderRepo::new(pool),
            Arc::new(RwLock::new(Some(handler))),
            fired,
        )
    }

    fn every_second() -> ::cron::Schedule {
        ::cron::Schedule::from_str("* * * * * *").unwrap()
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..500 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn cron_timer_fires_on_each_tick_and_leaves_the_reminder_pending() {
        let (store, alert, fired) = recording_store().await;
        let id = store
            .create_recurring("stretch", "* * * * *", "notification")
            .await
            .unwrap();
        let reminder = store.get(id).await.unwrap().unwrap();

        let started = Instant::now();
        let timer = spawn_cron_timer(store.clone(), alert, reminder, every_second());
        wait_for(|| fired.lock().unwrap().len() >= 2).await;
        timer.abort();

        let fired = fired.lock().unwrap().clone();
        assert!(fired.len() >= 2, "fired {} times", fired.len());
        assert!(fired.iter().all(|f| *f == id));
        // One delivery per tick, not several per tick.
        assert!(started.elapsed() >= Duration::from_millis(900));

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReminderStatus::Pending);
        assert_eq!(stored.completed_at, None);
    }

    #[tokio::test]
    async fn cron_timer_skips_and_disarms_when_cancelled_in_the_store() {
        let (store, alert, fired) = recording_store().await;
        let id = store
            .create_recurring("standup", "* * * * *", "notification")
            .await
            .unwrap();
        let reminder = store.get(id).await.unwrap().unwrap();

        let timer = spawn_cron_timer(store.clone(), alert, reminder, every_second());
        assert!(store.mark_cancelled(id).await.unwrap());

        wait_for(|| timer.is_finished()).await;
        assert!(timer.is_finished());
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cron_timer_stops_firing_once_cancelled_in_the_store() {
        let (store, alert, fired) = recording_store().await;
        let id = store
            .create_recurring("water", "* * * * *", "notification")
            .await
            .unwrap();
        let reminder = store.get(id).await.unwrap().unwrap();

        let timer = spawn_cron_timer(store.clone(), alert, reminder, every_second());
        wait_for(|| !fired.lock().unwrap().is_empty()).await;
        assert_eq!(fired.lock().unwrap().len(), 1);

        assert!(store.mark_cancelled(id).await.unwrap());
        wait_for(|| timer.is_finished()).await;
        assert!(timer.is_finished());
        assert_eq!(fired.lock().unwrap().len(), 1);
    }
}
