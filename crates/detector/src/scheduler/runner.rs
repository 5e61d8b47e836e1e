use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use ::cron::Schedule;
use chrono::Utc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use vigil_core::{DetectorError, Result};

use super::cron::parse_schedule;
use super::{JobScheduler, ScheduledJob};

/// In-process cron scheduler running jobs on a tokio runtime.
pub struct CronScheduler {
    runtime: Handle,
    /// Trigger loop per recurring job key.
    triggers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl CronScheduler {
    /// Create a scheduler that spawns onto `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            triggers: Mutex::new(HashMap::new()),
        }
    }

    /// Create a scheduler bound to the runtime of the calling task.
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| DetectorError::Scheduler(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(runtime))
    }

    /// Keys of all scheduled recurring jobs, sorted.
    pub fn scheduled_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .triggers
            .lock()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Cancel every recurring trigger. In-flight firings are left to finish.
    pub fn shutdown(&self) {
        match self.triggers.lock() {
            Ok(mut triggers) => {
                for (key, handle) in triggers.drain() {
                    debug!(job = %key, "cancelling trigger");
                    handle.abort();
                }
                info!("Scheduler stopped");
            }
            Err(e) => error!(error = %e, "scheduler lock poisoned during shutdown"),
        }
    }

    fn lock_triggers(&self) -> Result<MutexGuard<'_, HashMap<String, JoinHandle<()>>>> {
        self.triggers
            .lock()
            .map_err(|e| DetectorError::Scheduler(format!("trigger map lock: {e}")))
    }
}

impl JobScheduler for CronScheduler {
    fn schedule_recurring(
        &self,
        job_key: &str,
        cron_expression: &str,
        job: Arc<dyn ScheduledJob>,
    ) -> Result<()> {
        let schedule = parse_schedule(cron_expression)?;

        let mut triggers = self.lock_triggers()?;
        if triggers.contains_key(job_key) {
            return Err(DetectorError::Conflict(format!(
                "job {} is already scheduled",
                job_key
            )));
        }

        let handle = self
            .runtime
            .spawn(run_trigger(job_key.to_string(), schedule, job));
        triggers.insert(job_key.to_string(), handle);

        info!(job = %job_key, cron = %cron_expression, "scheduled recurring job");
        Ok(())
    }

    fn schedule_once(&self, job_key: &str, job: Arc<dyn ScheduledJob>) -> Result<()> {
        self.runtime.spawn(fire(job_key.to_string(), job));
        info!(job = %job_key, "scheduled one-shot job");
        Ok(())
    }

    fn cancel(&self, job_key: &str) -> Result<()> {
        let handle = self
            .lock_triggers()?
            .remove(job_key)
            .ok_or_else(|| DetectorError::NotFound(format!("no scheduled job {}", job_key)))?;
        handle.abort();

        info!(job = %job_key, "cancelled recurring job");
        Ok(())
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        if let Ok(triggers) = self.triggers.get_mut() {
            for handle in triggers.values() {
                handle.abort();
            }
        }
    }
}

/// Sleep until each upcoming tick and spawn a firing for it.
async fn run_trigger(job_key: String, schedule: Schedule, job: Arc<dyn ScheduledJob>) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            info!(job = %job_key, "cron schedule has no further ticks");
            return;
        };

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        debug!(job = %job_key, next = %next, "waiting for next tick");
        tokio::time::sleep(wait).await;

        tokio::spawn(fire(job_key.clone(), Arc::clone(&job)));

        // Never fire twice for the same tick.
        let remaining = (next - Utc::now()).to_std().unwrap_or_default();
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
    }
}

/// Run one firing and report its outcome.
async fn fire(job_key: String, job: Arc<dyn ScheduledJob>) {
    let started = Instant::now();
    debug!(job = %job_key, name = %job.name(), "firing job");

    match job.execute().await {
        Ok(()) => {
            debug!(job = %job_key, elapsed_ms = started.elapsed().as_millis() as u64, "job completed");
        }
        Err(e) => {
            warn!(job = %job_key, error = %e, "job failed");
        }
    }
}
