use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One metric query issued while exploring a function's window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRequest {
    pub collection: String,
    /// Aggregation function, e.g. `AGGREGATE_1_HOURS(pageViews)`.
    pub metric_function: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Dimension to break the aggregate out by; `None` for the top-level series.
    pub group_by: Option<String>,
}

impl DetectionRequest {
    pub fn new(
        collection: impl Into<String>,
        metric_function: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            collection: collection.into(),
            metric_function: metric_function.into(),
            start,
            end,
            group_by: None,
        }
    }

    /// Copy of this request grouped by `dimension`.
    pub fn grouped_by(&self, dimension: impl Into<String>) -> Self {
        Self {
            group_by: Some(dimension.into()),
            ..self.clone()
        }
    }
}

impl fmt::Display for DetectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} [{}, {})",
            self.metric_function,
            self.collection,
            self.start.to_rfc3339(),
            self.end.to_rfc3339()
        )?;
        if let Some(ref dim) = self.group_by {
            write!(f, " group by {}", dim)?;
        }
        Ok(())
    }
}
