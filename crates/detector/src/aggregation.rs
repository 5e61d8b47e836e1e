//! Bucket aggregation descriptor used in metric queries.

use vigil_core::{AnomalyFunctionSpec, DetectorError, Result};

/// Format the aggregation function for `spec`, e.g. `AGGREGATE_1_HOURS(pageViews)`.
pub fn metric_function(spec: &AnomalyFunctionSpec) -> Result<String> {
    if spec.bucket_size == 0 {
        return Err(DetectorError::Validation(format!(
            "function {} has zero bucket size",
            spec.id
        )));
    }
    let metric = spec.metric.trim();
    if metric.is_empty() {
        return Err(DetectorError::Validation(format!(
            "function {} has no metric",
            spec.id
        )));
    }
    Ok(format!(
        "AGGREGATE_{}_{}({})",
        spec.bucket_size, spec.bucket_unit, metric
    ))
}
