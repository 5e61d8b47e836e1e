//! Dimension exploration for one execution.
//!
//! The top-level request and one grouped request per explore dimension are
//! drained from a FIFO work queue. Each request's series are analyzed per
//! dimension key; results matching known anomalies are dropped.

use std::collections::VecDeque;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use vigil_core::{AnomalyFunctionSpec, AnomalyResult, DetectionRequest};

use crate::client::MetricClient;
use crate::function::AnomalyFunction;
use crate::metrics::Histogram;
use crate::window::DetectionWindow;

/// Series with fewer buckets than this are not analyzed.
pub const MIN_BUCKETS: usize = 2;

/// Build the request queue: the root request first, then one request per
/// explore dimension in declaration order.
pub fn build_requests(
    spec: &AnomalyFunctionSpec,
    metric_function: &str,
    window: DetectionWindow,
) -> VecDeque<DetectionRequest> {
    let root = DetectionRequest::new(
        spec.collection.clone(),
        metric_function,
        window.start,
        window.end,
    );

    let mut queue = VecDeque::new();
    for dimension in spec.explore_dimension_names() {
        queue.push_back(root.grouped_by(dimension));
    }
    queue.push_front(root);
    queue
}

/// Counters for one exploration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExplorationStats {
    pub requests_processed: usize,
    pub requests_failed: usize,
    pub keys_analyzed: usize,
    pub keys_skipped: usize,
    pub keys_failed: usize,
    pub anomalies_found: usize,
    pub anomalies_known: usize,
}

#[derive(Debug, Default)]
pub struct ExplorationOutcome {
    /// New, stamped results ready to persist.
    pub results: Vec<AnomalyResult>,
    pub stats: ExplorationStats,
}

/// Drives detection requests through the metric client and the function.
pub struct ExplorationEngine<'a> {
    function: &'a dyn AnomalyFunction,
    client: &'a dyn MetricClient,
    histogram: &'a Histogram,
    window: DetectionWindow,
    known_anomalies: &'a [AnomalyResult],
}

impl<'a> ExplorationEngine<'a> {
    pub fn new(
        function: &'a dyn AnomalyFunction,
        client: &'a dyn MetricClient,
        histogram: &'a Histogram,
        window: DetectionWindow,
        known_anomalies: &'a [AnomalyResult],
    ) -> Self {
        Self {
            function,
            client,
            histogram,
            window,
            known_anomalies,
        }
    }

    /// Drain `queue`, processing every request exactly once.
    pub async fn explore(&self, mut queue: VecDeque<DetectionRequest>) -> ExplorationOutcome {
        let mut outcome = ExplorationOutcome::default();
        while let Some(request) = queue.pop_front() {
            let next = self.explore_combination(&request, &mut outcome).await;
            queue.extend(next);
        }
        outcome
    }

    /// Analyze every dimension key returned for `request`.
    ///
    /// Returns follow-up requests to enqueue. Exploration is one level deep, so
    /// this is currently always empty.
    async fn explore_combination(
        &self,
        request: &DetectionRequest,
        outcome: &mut ExplorationOutcome,
    ) -> Vec<DetectionRequest> {
        info!(request = %request, "exploring");
        outcome.stats.requests_processed += 1;

        let series = match self.client.execute(request).await {
            Ok(series) => series,
            Err(e) => {
                error!(request = %request, error = %e, "metric query failed");
                outcome.stats.requests_failed += 1;
                return Vec::new();
            }
        };
        debug!(request = %request, keys = series.len(), "query returned");

        let spec = self.function.spec();
        for (key, ts) in &series {
            if ts.len() < MIN_BUCKETS {
                warn!(dimensions = %key, buckets = ts.len(), "insufficient data to run anomaly detection function");
                outcome.stats.keys_skipped += 1;
                continue;
            }

            let started = Instant::now();
            let analyzed = self.function.analyze(
                key,
                ts,
                self.window.start,
                self.window.end,
                self.known_anomalies,
            );

            let mut results = match analyzed {
                Ok(results) => {
                    self.histogram.update(started.elapsed());
                    results
                }
                Err(e) => {
                    error!(dimensions = %key, error = %e, "could not compute anomalies");
                    outcome.stats.keys_failed += 1;
                    continue;
                }
            };
            outcome.stats.keys_analyzed += 1;
            outcome.stats.anomalies_found += results.len();

            for result in &mut results {
                result.stamp(spec);
            }

            let before = results.len();
            results.retain(|r| !self.known_anomalies.contains(r) && !outcome.results.contains(r));
            outcome.stats.anomalies_known += before - results.len();

            if !results.is_empty() {
                info!(
                    dimensions = %key,
                    count = results.len(),
                    window = %self.window,
                    "found anomalies"
                );
                outcome.results.extend(results);
            }
        }

        Vec::new()
    }
}
