use crate::trigger::job::{
    estimate_next_run, format_interval, JobHandler, JobOptions, JobStatus, LastError, RunStats,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("job name must not be empty")]
    EmptyName,
    #[error("job {0:?} is already registered")]
    DuplicateJob(String),
    #[error("interval for job {0:?} must be greater than zero")]
    InvalidInterval(String),
    #[error("no job named {0:?}")]
    UnknownJob(String),
}

struct JobEntry {
    description: Option<String>,
    interval: Duration,
    handler: JobHandler,
    enabled: bool,
    /// Pending `immediate` run, consumed the first time the timer is armed.
    run_on_arm: bool,
    created_at: DateTime<Utc>,
    timer: Option<JoinHandle<()>>,
    stats: Arc<Mutex<RunStats>>,
    exec_lock: Arc<tokio::sync::Mutex<()>>,
}

impl JobEntry {
    fn execution(&self, name: &str) -> Execution {
        Execution {
            name: name.to_string(),
            handler: self.handler.clone(),
            stats: self.stats.clone(),
            exec_lock: self.exec_lock.clone(),
        }
    }

    fn arm(&mut self, name: &str) {
        if self.timer.is_some() {
            return;
        }
        self.timer = Some(spawn_timer(self.execution(name), self.interval));
        if self.run_on_arm {
            self.run_on_arm = false;
            tokio::spawn(self.execution(name).run());
        }
        debug!(job = name, interval_ms = self.interval.as_millis() as u64, "job armed");
    }

    fn disarm(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    fn status(&self, name: &str, now: DateTime<Utc>) -> JobStatus {
        let stats = lock(&self.stats).clone();
        let armed = self.timer.is_some();

        JobStatus {
            name: name.to_string(),
            description: self.description.clone(),
            enabled: self.enabled,
            armed,
            interval_ms: self.interval.as_millis() as u64,
            interval_human: format_interval(self.interval),
            run_count: stats.run_count,
            last_run: stats.last_run,
            last_duration_ms: stats.last_duration.map(|d| d.as_millis() as u64),
            last_error: stats.last_error,
            created_at: self.created_at,
            next_run: armed
                .then(|| estimate_next_run(stats.last_run, self.created_at, self.interval, now)),
        }
    }
}

/// Everything an execution needs, detached from the registry so that
/// unregistering or disarming never cuts a run short.
#[derive(Clone)]
struct Execution {
    name: String,
    handler: JobHandler,
    stats: Arc<Mutex<RunStats>>,
    exec_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Execution {
    async fn run(self) {
        let _serial = self.exec_lock.lock().await;

        let started_at = Utc::now();
        let clock = Instant::now();

        // Spawned so a panicking handler is recorded like an error.
        let outcome = match tokio::spawn((self.handler)()).await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("job panicked: {e}")),
        };
        let elapsed = clock.elapsed();

        let mut stats = lock(&self.stats);
        stats.run_count += 1;
        stats.last_run = Some(started_at);
        stats.last_duration = Some(elapsed);

        match outcome {
            Ok(()) => {
                stats.last_error = None;
                debug!(job = %self.name, duration_ms = elapsed.as_millis() as u64, "job finished");
            }
            Err(e) => {
                warn!(job = %self.name, "job failed: {e:#}");
                stats.last_error = Some(LastError {
                    message: e.to_string(),
                    detail: format!("{e:?}"),
                    at: Utc::now(),
                });
            }
        }
    }
}

fn spawn_timer(execution: Execution, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut previous: Option<JoinHandle<()>> = None;

        loop {
            ticker.tick().await;
            // A scheduled run still queued or running means this tick is skipped.
            if previous.as_ref().is_some_and(|h| !h.is_finished()) {
                debug!(job = %execution.name, "previous run still in progress, skipping tick");
                continue;
            }
            previous = Some(tokio::spawn(execution.clone().run()));
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct Registry {
    started: bool,
    jobs: HashMap<String, JobEntry>,
}

/// Named interval jobs. Clones share the same registry.
///
/// Names are trimmed on registration and on every lookup.
#[derive(Clone, Default)]
pub struct TriggerService {
    registry: Arc<Mutex<Registry>>,
}

impl TriggerService {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }

    pub fn is_started(&self) -> bool {
        self.registry().started
    }

    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry().jobs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn register(&self, name: &str, options: JobOptions) -> Result<(), TriggerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TriggerError::EmptyName);
        }
        if options.interval.is_zero() {
            return Err(TriggerError::InvalidInterval(name.to_string()));
        }

        let mut registry = self.registry();
        if registry.jobs.contains_key(name) {
            return Err(TriggerError::DuplicateJob(name.to_string()));
        }

        let mut entry = JobEntry {
            description: options.description,
            interval: options.interval,
            handler: options.handler,
            enabled: options.enabled,
            run_on_arm: options.immediate,
            created_at: Utc::now(),
            timer: None,
            stats: Arc::new(Mutex::new(RunStats::default())),
            exec_lock: Arc::new(tokio::sync::Mutex::new(())),
        };

        if registry.started && entry.enabled {
            entry.arm(name);
        }
        info!(
            job = name,
            interval = %format_interval(entry.interval),
            enabled = entry.enabled,
            "job registered"
        );
        registry.jobs.insert(name.to_string(), entry);

        Ok(())
    }

    /// Arm every enabled job. Idempotent.
    pub fn start(&self) {
        let mut registry = self.registry();
        registry.started = true;

        for (name, entry) in registry.jobs.iter_mut() {
            if entry.enabled {
                entry.arm(name);
            }
        }
        info!(jobs = registry.jobs.len(), "trigger service started");
    }

    /// Disarm and disable. Returns false when the job does not exist.
    pub fn stop(&self, name: &str) -> bool {
        let name = name.trim();
        let mut registry = self.registry();
        let Some(entry) = registry.jobs.get_mut(name) else {
            return false;
        };

        entry.enabled = false;
        if entry.disarm() {
            info!(job = name, "job stopped");
        }
        true
    }

    /// Enable and arm a job; no-op for a job that is already armed.
    pub fn start_job(&self, name: &str, immediate: bool) -> Result<(), TriggerError> {
        let name = name.trim();
        let mut registry = self.registry();
        let entry = registry
            .jobs
            .get_mut(name)
            .ok_or_else(|| TriggerError::UnknownJob(name.to_string()))?;

        if entry.timer.is_some() {
            return Ok(());
        }

        entry.enabled = true;
        entry.run_on_arm |= immediate;
        entry.arm(name);
        info!(job = name, "job started");

        Ok(())
    }

    /// Disarm and forget. Returns false when the job does not exist.
    pub fn unregister(&self, name: &str) -> bool {
        let name = name.trim();
        let mut registry = self.registry();
        match registry.jobs.remove(name) {
            Some(mut entry) => {
                entry.disarm();
                info!(job = name, "job unregistered");
                true
            }
            None => false,
        }
    }

    pub fn update_interval(&self, name: &str, interval: Duration) -> Result<(), TriggerError> {
        let name = name.trim();
        let mut registry = self.registry();
        let entry = registry
            .jobs
            .get_mut(name)
            .ok_or_else(|| TriggerError::UnknownJob(name.to_string()))?;

        if interval.is_zero() {
            return Err(TriggerError::InvalidInterval(name.to_string()));
        }

        entry.interval = interval;
        if entry.disarm() {
            entry.arm(name);
        }
        info!(job = name, interval = %format_interval(interval), "job interval updated");

        Ok(())
    }

    /// Run the job now, outside its schedule, and return its status afterwards.
    /// Waits behind a run of the same job that is already in progress.
    pub async fn trigger(&self, name: &str) -> Result<JobStatus, TriggerError> {
        let name = name.trim();
        let execution = {
            let registry = self.registry();
            registry
                .jobs
                .get(name)
                .map(|entry| entry.execution(name))
                .ok_or_else(|| TriggerError::UnknownJob(name.to_string()))?
        };

        info!(job = name, "job triggered manually");
        execution.run().await;

        // The job may have been unregistered while it ran.
        self.status(name)
    }

    pub fn status(&self, name: &str) -> Result<JobStatus, TriggerError> {
        let name = name.trim();
        let registry = self.registry();
        registry
            .jobs
            .get(name)
            .map(|entry| entry.status(name, Utc::now()))
            .ok_or_else(|| TriggerError::UnknownJob(name.to_string()))
    }

    /// Every job, ordered by name.
    pub fn statuses(&self) -> Vec<JobStatus> {
        let registry = self.registry();
        let now = Utc::now();
        let mut all: Vec<JobStatus> = registry
            .jobs
            .iter()
            .map(|(name, entry)| entry.status(name, now))
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Disarm and disable every job, keeping them registered.
    pub fn stop_all(&self) {
        let mut registry = self.registry();
        for entry in registry.jobs.values_mut() {
            entry.enabled = false;
            entry.disarm();
        }
        info!(jobs = registry.jobs.len(), "all jobs stopped");
    }

    /// Disarm everything, clear the registry and mark the service stopped.
    pub fn shutdown(&self) {
        let mut registry = self.registry();
        for entry in registry.jobs.values_mut() {
            entry.disarm();
        }
        registry.jobs.clear();
        registry.started = false;
        info!("trigger service shut down");
    }
}
