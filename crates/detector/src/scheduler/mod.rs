//! Job scheduling.
//!
//! [`JobScheduler`] is the seam between the job registry and whatever fires
//! jobs. [`CronScheduler`] is the in-process implementation: one tokio task
//! per recurring key sleeps until the next cron tick and spawns each firing as
//! its own task, so firings of different jobs (and overlapping firings of the
//! same job) run concurrently.

mod cron;
mod runner;


use std::sync::Arc;

use async_trait::async_trait;

use vigil_core::Result;

pub use self::cron::{normalize_cron, parse_schedule};
pub use self::runner::CronScheduler;

/// A unit of work the scheduler can fire.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Stable name for logging and metrics.
    fn name(&self) -> &str;

    /// Run one firing. Errors are reported by the scheduler, never retried.
    async fn execute(&self) -> Result<()>;
}

/// Registers and cancels job firings.
///
/// Calls only register or remove triggers; they never wait for a job to run.
pub trait JobScheduler: Send + Sync {
    /// Fire `job` on every tick of `cron_expression` until cancelled.
    ///
    /// Fails with `Validation` for a malformed expression and `Conflict` when
    /// `job_key` is already scheduled.
    fn schedule_recurring(
        &self,
        job_key: &str,
        cron_expression: &str,
        job: Arc<dyn ScheduledJob>,
    ) -> Result<()>;

    /// Fire `job` once, immediately.
    fn schedule_once(&self, job_key: &str, job: Arc<dyn ScheduledJob>) -> Result<()>;

    /// Stop future firings of `job_key`. In-flight firings run to completion.
    ///
    /// Fails with `NotFound` for an unknown key.
    fn cancel(&self, job_key: &str) -> Result<()>;
}
