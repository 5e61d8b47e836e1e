//! Metric query clients.

mod http;

use async_trait::async_trait;
use indexmap::IndexMap;

use vigil_core::{DetectionRequest, DimensionKey, MetricTimeSeries, Result};

pub use self::http::{render_query, HttpMetricClient, QueryResult};

/// Series returned for one request, in the order the source produced them.
pub type SeriesByDimension = IndexMap<DimensionKey, MetricTimeSeries>;

/// Executes detection requests against a metric source.
///
/// Implementations must be safe to share across concurrently running jobs.
/// Failures are reported as [`DetectorError::Query`](vigil_core::DetectorError::Query).
#[async_trait]
pub trait MetricClient: Send + Sync {
    async fn execute(&self, request: &DetectionRequest) -> Result<SeriesByDimension>;
}
