use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spec::{AnomalyFunctionSpec, FunctionId};

/// Ordered dimension values identifying one time-series slice of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionKey(Vec<String>);

impl DimensionKey {
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for DimensionKey {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Time-bucketed observations of one metric for one dimension key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTimeSeries {
    buckets: BTreeMap<DateTime<Utc>, f64>,
}

impl MetricTimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of the bucket starting at `time`, replacing any previous value.
    pub fn insert(&mut self, time: DateTime<Utc>, value: f64) {
        self.buckets.insert(time, value);
    }

    pub fn get(&self, time: &DateTime<Utc>) -> Option<f64> {
        self.buckets.get(time).copied()
    }

    /// Number of time buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buckets in ascending time order.
    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &f64)> {
        self.buckets.iter()
    }
}

impl FromIterator<(DateTime<Utc>, f64)> for MetricTimeSeries {
    fn from_iter<I: IntoIterator<Item = (DateTime<Utc>, f64)>>(iter: I) -> Self {
        Self {
            buckets: iter.into_iter().collect(),
        }
    }
}

/// An anomaly found by a detection function.
///
/// Produced transiently by `analyze`, stamped with the owning function's
/// identity, and durable only once a result store commits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Assigned by the result store on commit.
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub function_id: Option<FunctionId>,
    #[serde(default)]
    pub function_type: Option<String>,
    #[serde(default)]
    pub function_properties: BTreeMap<String, String>,
    pub collection: String,
    pub metric: String,
    pub dimensions: DimensionKey,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub score: f64,
    pub weight: f64,
    #[serde(default)]
    pub properties: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl AnomalyResult {
    /// Unstamped result for one dimension slice and time range.
    pub fn new(
        dimensions: DimensionKey,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        score: f64,
    ) -> Self {
        Self {
            id: None,
            function_id: None,
            function_type: None,
            function_properties: BTreeMap::new(),
            collection: String::new(),
            metric: String::new(),
            dimensions,
            start_time,
            end_time,
            score,
            weight: 1.0,
            properties: None,
            created_at: None,
        }
    }

    /// Attach the identity of the function that produced this result.
    pub fn stamp(&mut self, spec: &AnomalyFunctionSpec) {
        self.function_id = Some(spec.id);
        self.function_type = Some(spec.function_type.clone());
        self.function_properties = spec.properties.clone();
        self.collection = spec.collection.clone();
        if self.metric.is_empty() {
            self.metric = spec.metric.clone();
        }
    }
}

/// Results are the same anomaly when collection, dimension key, time range and
/// function id match. Scores and metadata are ignored.
impl PartialEq for AnomalyResult {
    fn eq(&self, other: &Self) -> bool {
        self.collection == other.collection
            && self.dimensions == other.dimensions
            && self.start_time == other.start_time
            && self.end_time == other.end_time
            && self.function_id == other.function_id
    }
}

impl Eq for AnomalyResult {}
