//! Registry of scheduled anomaly detection jobs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use vigil_core::{AnomalyFunctionSpec, DetectorError, FunctionId, Result};

use crate::client::MetricClient;
use crate::executor::{ExecutionContext, JobExecutor};
use crate::function::FunctionFactory;
use crate::metrics::MetricRegistry;
use crate::scheduler::{parse_schedule, JobScheduler};
use crate::store::{ResultStore, SpecStore};
use crate::window::WindowBounds;

/// Scheduler key of the recurring job for `id`.
pub fn scheduled_job_key(id: FunctionId) -> String {
    format!("scheduled_anomaly_function_job_{}", id)
}

/// Scheduler key of one-shot runs for `id`.
pub fn ad_hoc_job_key(id: FunctionId) -> String {
    format!("ad_hoc_anomaly_function_job_{}", id)
}

/// Starts, stops and tracks recurring detection jobs.
///
/// The id -> job key registry is the only mutable state. Every operation holds
/// its lock for the full call, including the scheduler calls it makes, so
/// operations are mutually exclusive.
pub struct JobManager {
    specs: Arc<dyn SpecStore>,
    factory: Arc<FunctionFactory>,
    scheduler: Arc<dyn JobScheduler>,
    client: Arc<dyn MetricClient>,
    results: Arc<dyn ResultStore>,
    metrics: Arc<MetricRegistry>,
    jobs: Mutex<BTreeMap<FunctionId, String>>,
}

impl JobManager {
    pub fn new(
        specs: Arc<dyn SpecStore>,
        factory: Arc<FunctionFactory>,
        scheduler: Arc<dyn JobScheduler>,
        client: Arc<dyn MetricClient>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            specs,
            factory,
            scheduler,
            client,
            results,
            metrics: Arc::new(MetricRegistry::new()),
            jobs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Share an existing metric registry instead of a private one.
    pub fn with_metrics(mut self, metrics: Arc<MetricRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricRegistry> {
        &self.metrics
    }

    /// Ids of functions with a live recurring registration, ascending.
    pub fn list_active_jobs(&self) -> Result<Vec<FunctionId>> {
        Ok(self.lock_jobs()?.keys().copied().collect())
    }

    /// Register the recurring job of function `id`.
    pub fn start(&self, id: FunctionId) -> Result<()> {
        let mut jobs = self.lock_jobs()?;

        let spec = self.find_spec(id)?;
        if let Some(existing) = jobs.get(&id) {
            return Err(DetectorError::Conflict(format!(
                "function {} is already scheduled as {}",
                id, existing
            )));
        }

        let job_key = scheduled_job_key(id);
        let executor = self.executor(&spec, &job_key, WindowBounds::default())?;
        parse_schedule(&spec.cron)?;

        self.scheduler
            .schedule_recurring(&job_key, &spec.cron, Arc::new(executor))?;
        jobs.insert(id, job_key.clone());

        info!(function_id = id, job = %job_key, "Started {}", spec);
        Ok(())
    }

    /// Cancel the recurring job of function `id`. A running pass finishes.
    pub fn stop(&self, id: FunctionId) -> Result<()> {
        let mut jobs = self.lock_jobs()?;

        let job_key = jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| DetectorError::NotFound(format!("no scheduled job for function {}", id)))?;
        self.cancel_trigger(id, &job_key)?;
        jobs.remove(&id);

        info!(function_id = id, job = %job_key, "Stopped");
        Ok(())
    }

    /// Fire one pass of function `id` immediately, without registering it.
    ///
    /// `start` and `end` are optional ISO-8601 window overrides, validated
    /// before anything is scheduled.
    pub fn run_ad_hoc(&self, id: FunctionId, start: Option<&str>, end: Option<&str>) -> Result<()> {
        let _jobs = self.lock_jobs()?;

        let executor = self.ad_hoc_executor(id, start, end)?;
        let job_key = executor.context().job_name.clone();
        self.scheduler.schedule_once(&job_key, Arc::new(executor))?;

        info!(
            function_id = id,
            job = %job_key,
            start = start.unwrap_or("-"),
            end = end.unwrap_or("-"),
            "Scheduled ad hoc run"
        );
        Ok(())
    }

    /// Build the executor for a one-shot run of function `id` without
    /// scheduling it.
    pub fn ad_hoc_executor(
        &self,
        id: FunctionId,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<JobExecutor> {
        let spec = self.find_spec(id)?;
        let bounds = WindowBounds::parse(start, end)?;
        self.executor(&spec, &ad_hoc_job_key(id), bounds)
    }

    /// Cancel every registration. Returns how many were stopped; registrations
    /// whose cancel failed stay in the registry.
    pub fn stop_all(&self) -> Result<usize> {
        let mut jobs = self.lock_jobs()?;
        let registered: Vec<(FunctionId, String)> =
            jobs.iter().map(|(id, key)| (*id, key.clone())).collect();
        let mut stopped = 0;

        for (id, job_key) in registered {
            match self.cancel_trigger(id, &job_key) {
                Ok(()) => {
                    jobs.remove(&id);
                    info!(function_id = id, job = %job_key, "Stopped");
                    stopped += 1;
                }
                Err(e) => warn!(function_id = id, job = %job_key, error = %e, "cancel failed"),
            }
        }
        Ok(stopped)
    }

    /// Cancel the trigger of a registered job. A trigger the scheduler no
    /// longer knows counts as cancelled.
    fn cancel_trigger(&self, id: FunctionId, job_key: &str) -> Result<()> {
        match self.scheduler.cancel(job_key) {
            Err(DetectorError::NotFound(_)) => {
                warn!(function_id = id, job = %job_key, "trigger already gone");
                Ok(())
            }
            other => other,
        }
    }

    fn find_spec(&self, id: FunctionId) -> Result<AnomalyFunctionSpec> {
        self.specs
            .find_by_id(id)?
            .ok_or_else(|| DetectorError::NotFound(format!("anomaly function {}", id)))
    }

    fn executor(
        &self,
        spec: &AnomalyFunctionSpec,
        job_name: &str,
        bounds: WindowBounds,
    ) -> Result<JobExecutor> {
        let function = self.factory.from_spec(spec)?;
        Ok(JobExecutor::new(ExecutionContext {
            job_name: job_name.to_string(),
            function,
            client: Arc::clone(&self.client),
            store: Arc::clone(&self.results),
            metrics: Arc::clone(&self.metrics),
            bounds,
        }))
    }

    fn lock_jobs(&self) -> Result<MutexGuard<'_, BTreeMap<FunctionId, String>>> {
        self.jobs
            .lock()
            .map_err(|e| DetectorError::Scheduler(format!("job registry lock: {e}")))
    }
}
