use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use vigil_core::{DetectionRequest, DetectorError, DimensionKey, MetricTimeSeries, Result};

use super::{MetricClient, SeriesByDimension};

/// Render the SQL-like query understood by the metric query service.
pub fn render_query(request: &DetectionRequest) -> String {
    let mut sql = format!(
        "SELECT {} FROM {} WHERE time BETWEEN '{}' AND '{}'",
        request.metric_function,
        request.collection,
        request.start.to_rfc3339(),
        request.end.to_rfc3339()
    );
    if let Some(ref dim) = request.group_by {
        sql.push_str(" GROUP BY ");
        sql.push_str(dim);
    }
    sql
}

/// Raw response body of the query service.
///
/// `data` maps a JSON-encoded array of dimension values to a map of
/// epoch-millisecond bucket times to one value per requested metric.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub data: IndexMap<String, BTreeMap<String, Vec<f64>>>,
}

impl QueryResult {
    /// Decode into per-dimension series using the first metric column.
    pub fn into_series(self) -> Result<SeriesByDimension> {
        let mut out = IndexMap::with_capacity(self.data.len());

        for (raw_key, buckets) in self.data {
            let values: Vec<String> = serde_json::from_str(&raw_key).map_err(|e| {
                DetectorError::Query(format!("malformed dimension key {:?}: {}", raw_key, e))
            })?;

            let mut series = MetricTimeSeries::new();
            for (raw_time, metrics) in buckets {
                let millis: i64 = raw_time.parse().map_err(|_| {
                    DetectorError::Query(format!("malformed bucket time {:?}", raw_time))
                })?;
                let time = Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
                    DetectorError::Query(format!("bucket time {} out of range", millis))
                })?;
                if let Some(value) = metrics.first() {
                    series.insert(time, *value);
                }
            }

            out.insert(DimensionKey::new(values), series);
        }

        Ok(out)
    }
}

/// [`MetricClient`] backed by the HTTP query endpoint `GET <base>/query/<sql>`.
#[derive(Debug, Clone)]
pub struct HttpMetricClient {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpMetricClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            DetectorError::Validation(format!("invalid metric service url {:?}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DetectorError::Validation(format!(
                "metric service url {} cannot be a base",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectorError::Query(format!("failed to build http client: {e}")))?;

        Ok(Self { base_url, client })
    }

    /// Full query URL for `request`; the SQL text is percent-encoded as one path segment.
    pub fn query_url(&self, request: &DetectionRequest) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DetectorError::Query(format!("metric service url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push("query")
            .push(&render_query(request));
        Ok(url)
    }
}

#[async_trait]
impl MetricClient for HttpMetricClient {
    async fn execute(&self, request: &DetectionRequest) -> Result<SeriesByDimension> {
        let url = self.query_url(request)?;
        debug!(url = %url, "querying metric service");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DetectorError::Query(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(%status, body = %body, "metric service returned non-2xx status");
            return Err(DetectorError::Query(format!(
                "metric service returned {}: {}",
                status, body
            )));
        }

        let result: QueryResult = response
            .json()
            .await
            .map_err(|e| DetectorError::Query(format!("malformed query response: {e}")))?;

        result.into_series()
    }
}
