//! Shared fixtures for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use vigil_core::{
    AnomalyFunctionSpec, AnomalyResult, DetectionRequest, DetectorError, DimensionKey,
    MetricTimeSeries, Result, TimeUnit,
};

use crate::client::{MetricClient, SeriesByDimension};
use crate::function::AnomalyFunction;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
}

pub fn spec(id: u64) -> AnomalyFunctionSpec {
    AnomalyFunctionSpec {
        id,
        function_type: "THRESHOLD".to_string(),
        metric: "latency".to_string(),
        collection: "api".to_string(),
        cron: "0 0 * * * *".to_string(),
        window_size: 1,
        window_unit: TimeUnit::Days,
        window_delay: None,
        window_delay_unit: None,
        bucket_size: 1,
        bucket_unit: TimeUnit::Hours,
        explore_dimensions: None,
        properties: BTreeMap::from([("max".to_string(), "100".to_string())]),
        is_active: true,
    }
}

pub fn key(values: &[&str]) -> DimensionKey {
    values.iter().copied().collect()
}

/// Hourly series starting at [`t0`].
pub fn hourly(values: &[f64]) -> MetricTimeSeries {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (t0() + Duration::hours(i as i64), *v))
        .collect()
}

/// One-hour result for `dims` starting `hour` hours after [`t0`].
pub fn result_at(dims: &[&str], hour: i64) -> AnomalyResult {
    let start = t0() + Duration::hours(hour);
    AnomalyResult::new(key(dims), start, start + Duration::hours(1), 1.0)
}

/// Metric client answering by group-by dimension and recording every request.
#[derive(Default)]
pub struct ScriptedClient {
    responses: HashMap<Option<String>, SeriesByDimension>,
    failing: HashSet<Option<String>>,
    requests: Mutex<Vec<DetectionRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, group_by: Option<&str>, series: SeriesByDimension) -> Self {
        self.responses.insert(group_by.map(str::to_string), series);
        self
    }

    pub fn fail(mut self, group_by: Option<&str>) -> Self {
        self.failing.insert(group_by.map(str::to_string));
        self
    }

    pub fn requests(&self) -> Vec<DetectionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricClient for ScriptedClient {
    async fn execute(&self, request: &DetectionRequest) -> Result<SeriesByDimension> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failing.contains(&request.group_by) {
            return Err(DetectorError::Query(format!("scripted failure for {}", request)));
        }
        Ok(self
            .responses
            .get(&request.group_by)
            .cloned()
            .unwrap_or_default())
    }
}

/// Function returning canned results per dimension key.
pub struct ScriptedFunction {
    spec: AnomalyFunctionSpec,
    results: HashMap<DimensionKey, Vec<AnomalyResult>>,
    failing: HashSet<DimensionKey>,
    calls: Mutex<Vec<DimensionKey>>,
}

impl ScriptedFunction {
    pub fn new(spec: AnomalyFunctionSpec) -> Self {
        Self {
            spec,
            results: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(mut self, dims: &[&str], results: Vec<AnomalyResult>) -> Self {
        self.results.insert(key(dims), results);
        self
    }

    pub fn failing_on(mut self, dims: &[&str]) -> Self {
        self.failing.insert(key(dims));
        self
    }

    pub fn calls(&self) -> Vec<DimensionKey> {
        self.calls.lock().unwrap().clone()
    }
}

impl AnomalyFunction for ScriptedFunction {
    fn spec(&self) -> &AnomalyFunctionSpec {
        &self.spec
    }

    fn analyze(
        &self,
        dimension_key: &DimensionKey,
        _series: &MetricTimeSeries,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
        _known_anomalies: &[AnomalyResult],
    ) -> Result<Vec<AnomalyResult>> {
        self.calls.lock().unwrap().push(dimension_key.clone());
        if self.failing.contains(dimension_key) {
            return Err(DetectorError::Analysis(format!("scripted failure for {}", dimension_key)));
        }
        Ok(self.results.get(dimension_key).cloned().unwrap_or_default())
    }
}
