//! Pluggable anomaly detection functions.
//!
//! A function is bound to one [`AnomalyFunctionSpec`] and analyzes a single
//! dimension slice at a time. Implementations are selected by the spec's type
//! tag through a [`FunctionFactory`].

mod factory;
mod threshold;

use chrono::{DateTime, Utc};

use vigil_core::{AnomalyFunctionSpec, AnomalyResult, DimensionKey, MetricTimeSeries, Result};

pub use self::factory::{FunctionConstructor, FunctionFactory};
pub use self::threshold::ThresholdFunction;

/// Detection algorithm bound to one function spec.
pub trait AnomalyFunction: Send + Sync {
    /// The spec this function was built from.
    fn spec(&self) -> &AnomalyFunctionSpec;

    /// Find anomalies in `series` for the window `[window_start, window_end)`.
    ///
    /// `known_anomalies` are results already stored for this function and
    /// window; implementations may use them as context. Failures are reported
    /// as [`DetectorError::Analysis`](vigil_core::DetectorError::Analysis).
    fn analyze(
        &self,
        dimension_key: &DimensionKey,
        series: &MetricTimeSeries,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        known_anomalies: &[AnomalyResult],
    ) -> Result<Vec<AnomalyResult>>;
}
