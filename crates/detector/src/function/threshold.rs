use chrono::{DateTime, Duration, Utc};

use vigil_core::{
    AnomalyFunctionSpec, AnomalyResult, DetectorError, DimensionKey, MetricTimeSeries, Result,
};

use super::AnomalyFunction;

/// Flags every bucket whose value falls outside a fixed `[min, max]` band.
///
/// Configured through the spec properties `min` and/or `max`; at least one
/// must be present. Each violating bucket becomes a one-bucket anomaly whose
/// score is the relative deviation from the violated bound.
#[derive(Debug, Clone)]
pub struct ThresholdFunction {
    spec: AnomalyFunctionSpec,
    min: Option<f64>,
    max: Option<f64>,
    bucket: Duration,
}

impl ThresholdFunction {
    pub const TYPE: &'static str = "THRESHOLD";

    pub fn from_spec(spec: &AnomalyFunctionSpec) -> Result<Self> {
        let min = parse_bound(spec, "min")?;
        let max = parse_bound(spec, "max")?;

        if min.is_none() && max.is_none() {
            return Err(DetectorError::Validation(format!(
                "threshold function {} needs a 'min' or 'max' property",
                spec.id
            )));
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(DetectorError::Validation(format!(
                    "threshold function {} has min {} above max {}",
                    spec.id, lo, hi
                )));
            }
        }

        Ok(Self {
            spec: spec.clone(),
            min,
            max,
            bucket: spec.bucket_unit.to_duration(spec.bucket_size),
        })
    }

    /// The violated bound for `value`, if any.
    fn violated_bound(&self, value: f64) -> Option<f64> {
        match (self.min, self.max) {
            (Some(lo), _) if value < lo => Some(lo),
            (_, Some(hi)) if value > hi => Some(hi),
            _ => None,
        }
    }
}

fn parse_bound(spec: &AnomalyFunctionSpec, key: &str) -> Result<Option<f64>> {
    spec.properties
        .get(key)
        .map(|raw| {
            raw.trim().parse::<f64>().map_err(|_| {
                DetectorError::Validation(format!(
                    "threshold function {} has non-numeric '{}': {:?}",
                    spec.id, key, raw
                ))
            })
        })
        .transpose()
}

impl AnomalyFunction for ThresholdFunction {
    fn spec(&self) -> &AnomalyFunctionSpec {
        &self.spec
    }

    fn analyze(
        &self,
        dimension_key: &DimensionKey,
        series: &MetricTimeSeries,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        known_anomalies: &[AnomalyResult],
    ) -> Result<Vec<AnomalyResult>> {
        let mut results = Vec::new();

        for (time, value) in series.iter() {
            if *time < window_start || *time >= window_end {
                continue;
            }
            if !value.is_finite() {
                return Err(DetectorError::Analysis(format!(
                    "non-finite value {} at {} for {}",
                    value,
                    time.to_rfc3339(),
                    dimension_key
                )));
            }

            let Some(bound) = self.violated_bound(*value) else {
                continue;
            };

            let end = time.checked_add_signed(self.bucket).ok_or_else(|| {
                DetectorError::Analysis(format!(
                    "bucket of {} {} starting {} overflows for {}",
                    self.spec.bucket_size,
                    self.spec.bucket_unit,
                    time.to_rfc3339(),
                    dimension_key
                ))
            })?;
            let already_known = known_anomalies.iter().any(|k| {
                k.dimensions == *dimension_key && k.start_time == *time && k.end_time == end
            });
            if already_known {
                continue;
            }

            let deviation = (value - bound).abs();
            let score = if bound == 0.0 { deviation } else { deviation / bound.abs() };

            let mut result = AnomalyResult::new(dimension_key.clone(), *time, end, score);
            result.metric = self.spec.metric.clone();
            result.properties = Some(format!("value={};bound={}", value, bound));
            results.push(result);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use vigil_core::TimeUnit;

    use super::*;

    fn spec(props: &[(&str, &str)]) -> AnomalyFunctionSpec {
        AnomalyFunctionSpec {
            id: 11,
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
            properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            is_active: true,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
    }

    fn series(values: &[f64]) -> MetricTimeSeries {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (t0() + Duration::hours(i as i64), *v))
            .collect()
    }

    #[test]
    fn flags_values_outside_band() {
        let f = ThresholdFunction::from_spec(&spec(&[("min", "10"), ("max", "100")])).unwrap();
        let key = DimensionKey::from_iter(["*"]);
        let results = f
            .analyze(&key, &series(&[50.0, 150.0, 5.0, 100.0]), t0(), t0() + Duration::days(1), &[])
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].start_time, t0() + Duration::hours(1));
        assert_eq!(results[0].end_time, t0() + Duration::hours(2));
        assert!((results[0].score - 0.5).abs() < 1e-9);
        assert_eq!(results[1].start_time, t0() + Duration::hours(2));
        assert!((results[1].score - 0.5).abs() < 1e-9);
        assert_eq!(results[0].metric, "latency");
    }

    #[test]
    fn ignores_buckets_outside_window() {
        let f = ThresholdFunction::from_spec(&spec(&[("max", "1")])).unwrap();
        let key = DimensionKey::default();
        let results = f
            .analyze(&key, &series(&[5.0, 5.0, 5.0]), t0() + Duration::hours(1), t0() + Duration::hours(2), &[])
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].start_time, t0() + Duration::hours(1));
    }

    #[test]
    fn skips_known_anomalies() {
        let f = ThresholdFunction::from_spec(&spec(&[("max", "1")])).unwrap();
        let key = DimensionKey::from_iter(["us"]);
        let known = vec![AnomalyResult::new(key.clone(), t0(), t0() + Duration::hours(1), 4.0)];
        let results = f
            .analyze(&key, &series(&[5.0, 5.0]), t0(), t0() + Duration::days(1), &known)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].start_time, t0() + Duration::hours(1));
    }

    #[test]
    fn requires_numeric_bound() {
        assert!(matches!(
            ThresholdFunction::from_spec(&spec(&[])),
            Err(DetectorError::Validation(_))
        ));
        assert!(matches!(
            ThresholdFunction::from_spec(&spec(&[("max", "lots")])),
            Err(DetectorError::Validation(_))
        ));
        assert!(matches!(
            ThresholdFunction::from_spec(&spec(&[("min", "5"), ("max", "1")])),
            Err(DetectorError::Validation(_))
        ));
    }

    #[test]
    fn non_finite_value_is_analysis_error() {
        let f = ThresholdFunction::from_spec(&spec(&[("max", "1")])).unwrap();
        let err = f
            .analyze(&DimensionKey::default(), &series(&[f64::NAN]), t0(), t0() + Duration::days(1), &[])
            .unwrap_err();
        assert!(matches!(err, DetectorError::Analysis(_)));
    }

    #[test]
    fn oversized_bucket_is_an_analysis_error() {
        let mut spec = spec(&[("max", "100")]);
        spec.bucket_size = u64::MAX;
        let f = ThresholdFunction::from_spec(&spec).unwrap();

        let err = f
            .analyze(&DimensionKey::default(), &series(&[500.0]), t0(), t0() + Duration::days(1), &[])
            .unwrap_err();
        assert!(matches!(err, DetectorError::Analysis(_)));
    }
}
