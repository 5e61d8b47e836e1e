use std::collections::BTreeMap;
use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Identifier of a stored anomaly function.
pub type FunctionId = u64;

/// Granularity used for windows, delays and aggregation buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Milliseconds in one unit.
    pub fn millis_per_unit(&self) -> u64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
        }
    }

    /// Convert `amount` of this unit to milliseconds, saturating on overflow.
    pub fn to_millis(&self, amount: u64) -> u64 {
        amount.saturating_mul(self.millis_per_unit())
    }

    /// Convert `amount` of this unit to a signed duration.
    pub fn to_duration(&self, amount: u64) -> Duration {
        let millis = i64::try_from(self.to_millis(amount)).unwrap_or(i64::MAX);
        Duration::milliseconds(millis)
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUnit::Milliseconds => write!(f, "MILLISECONDS"),
            TimeUnit::Seconds => write!(f, "SECONDS"),
            TimeUnit::Minutes => write!(f, "MINUTES"),
            TimeUnit::Hours => write!(f, "HOURS"),
            TimeUnit::Days => write!(f, "DAYS"),
        }
    }
}

fn default_active() -> bool {
    true
}

/// Stored configuration of one anomaly detection function.
///
/// Specs are owned by the spec store and treated as read-only by the
/// scheduling and execution code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFunctionSpec {
    pub id: FunctionId,
    /// Type tag used to select the detection function implementation.
    #[serde(rename = "type")]
    pub function_type: String,
    pub metric: String,
    pub collection: String,
    /// Cron expression (5 or 6 fields) for recurring execution.
    pub cron: String,
    pub window_size: u64,
    pub window_unit: TimeUnit,
    /// Delay subtracted from "now" when computing the window end.
    #[serde(default)]
    pub window_delay: Option<u64>,
    /// Unit of `window_delay`; falls back to `window_unit` when unset.
    #[serde(default)]
    pub window_delay_unit: Option<TimeUnit>,
    pub bucket_size: u64,
    pub bucket_unit: TimeUnit,
    /// Comma-separated dimension names to break the metric out by.
    #[serde(default)]
    pub explore_dimensions: Option<String>,
    /// Free-form properties passed to the function and copied onto results.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl AnomalyFunctionSpec {
    /// Explore dimension names in declaration order. Blank entries are dropped.
    pub fn explore_dimension_names(&self) -> Vec<&str> {
        match self.explore_dimensions.as_deref() {
            Some(dims) => dims
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn window_duration(&self) -> Duration {
        self.window_unit.to_duration(self.window_size)
    }

    /// Window delay, zero when no delay is configured.
    pub fn delay_duration(&self) -> Duration {
        match self.window_delay {
            Some(delay) => self
                .window_delay_unit
                .unwrap_or(self.window_unit)
                .to_duration(delay),
            None => Duration::zero(),
        }
    }
}

impl fmt::Display for AnomalyFunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} {}:{} cron='{}' window={} {}",
            self.function_type,
            self.id,
            self.collection,
            self.metric,
            self.cron,
            self.window_size,
            self.window_unit
        )
    }
}
