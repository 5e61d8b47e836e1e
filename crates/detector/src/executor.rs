//! One end-to-end detection pass for a single function.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use vigil_core::{AnomalyFunctionSpec, AnomalyResult, DetectorError, FunctionId, Result};

use crate::aggregation::metric_function;
use crate::client::MetricClient;
use crate::exploration::{build_requests, ExplorationEngine, ExplorationStats};
use crate::function::AnomalyFunction;
use crate::metrics::MetricRegistry;
use crate::scheduler::ScheduledJob;
use crate::store::{ResultStore, ResultTransaction};
use crate::window::{resolve_window, DetectionWindow, WindowBounds};

/// Everything one job needs to execute, fixed when the job is scheduled.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Stable job name; also names the analysis-duration histogram.
    pub job_name: String,
    pub function: Arc<dyn AnomalyFunction>,
    pub client: Arc<dyn MetricClient>,
    pub store: Arc<dyn ResultStore>,
    pub metrics: Arc<MetricRegistry>,
    /// Explicit window overrides; empty for scheduled runs.
    pub bounds: WindowBounds,
}

/// Report of one completed pass.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub job_name: String,
    pub function_id: FunctionId,
    pub window: DetectionWindow,
    pub requests: usize,
    pub known_anomalies: usize,
    pub persisted: usize,
    pub stats: ExplorationStats,
    pub elapsed_ms: u64,
}

/// Runs detection passes for one function.
pub struct JobExecutor {
    context: ExecutionContext,
}

impl JobExecutor {
    pub fn new(context: ExecutionContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Run one pass with the window anchored at the current instant.
    pub async fn run(&self) -> Result<ExecutionSummary> {
        self.run_at(Utc::now()).await
    }

    /// Run one pass with the window anchored at `now`.
    ///
    /// Per-request and per-key failures are logged and skipped. Failure of
    /// either transaction fails the whole pass; the write transaction is
    /// all-or-nothing.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<ExecutionSummary> {
        let started = Instant::now();
        let ctx = &self.context;
        let spec = ctx.function.spec();

        let window = resolve_window(spec, now, ctx.bounds)?;
        window.validate()?;
        let metric_function = metric_function(spec)?;

        let known = self.known_anomalies(spec, &window).await?;

        let queue = build_requests(spec, &metric_function, window);
        let requests = queue.len();
        let histogram = ctx.metrics.histogram(&ctx.job_name);
        let outcome = ExplorationEngine::new(
            ctx.function.as_ref(),
            ctx.client.as_ref(),
            &histogram,
            window,
            &known,
        )
        .explore(queue)
        .await;

        let persisted = self.persist(outcome.results).await?;

        let summary = ExecutionSummary {
            job_name: ctx.job_name.clone(),
            function_id: spec.id,
            window,
            requests,
            known_anomalies: known.len(),
            persisted,
            stats: outcome.stats,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            job = %summary.job_name,
            function_id = summary.function_id,
            window = %summary.window,
            requests = summary.requests,
            persisted = summary.persisted,
            elapsed_ms = summary.elapsed_ms,
            "detection pass complete"
        );
        Ok(summary)
    }

    /// Read already-stored anomalies for this function and window.
    async fn known_anomalies(
        &self,
        spec: &AnomalyFunctionSpec,
        window: &DetectionWindow,
    ) -> Result<Vec<AnomalyResult>> {
        let mut tx = self.context.store.begin().await.map_err(persistence)?;

        let found = tx
            .find_all_by_collection_time_and_function(
                &spec.collection,
                window.start,
                window.end,
                spec.id,
            )
            .await;

        match found {
            Ok(found) => {
                tx.commit().await.map_err(persistence)?;
                Ok(found)
            }
            Err(e) => {
                rollback(tx.as_mut(), &self.context.job_name).await;
                Err(persistence(e))
            }
        }
    }

    /// Store `results` in one transaction, returning how many were written.
    async fn persist(&self, results: Vec<AnomalyResult>) -> Result<usize> {
        if results.is_empty() {
            return Ok(0);
        }
        let count = results.len();

        let mut tx = self.context.store.begin().await.map_err(persistence)?;
        match create_all(tx.as_mut(), &results).await {
            Ok(()) => {
                tx.commit().await.map_err(persistence)?;
                for result in &results {
                    info!(
                        job = %self.context.job_name,
                        dimensions = %result.dimensions,
                        start = %result.start_time,
                        end = %result.end_time,
                        score = result.score,
                        "persisted anomaly"
                    );
                }
                Ok(count)
            }
            Err(e) => {
                rollback(tx.as_mut(), &self.context.job_name).await;
                Err(persistence(e))
            }
        }
    }
}

async fn create_all(tx: &mut dyn ResultTransaction, results: &[AnomalyResult]) -> Result<()> {
    for result in results {
        tx.create(result.clone()).await?;
    }
    Ok(())
}

async fn rollback(tx: &mut dyn ResultTransaction, job_name: &str) {
    if let Err(e) = tx.rollback().await {
        warn!(job = %job_name, error = %e, "rollback failed");
    }
}

fn persistence(e: DetectorError) -> DetectorError {
    match e {
        DetectorError::Persistence(_) => e,
        other => DetectorError::Persistence(other.to_string()),
    }
}

#[async_trait]
impl ScheduledJob for JobExecutor {
    fn name(&self) -> &str {
        &self.context.job_name
    }

    async fn execute(&self) -> Result<()> {
        self.run().await.map(|_| ())
    }
}
