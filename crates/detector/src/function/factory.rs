use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use vigil_core::{AnomalyFunctionSpec, DetectorError, Result};

use super::threshold::ThresholdFunction;
use super::AnomalyFunction;

/// Builds a function instance from its spec.
pub type FunctionConstructor =
    Box<dyn Fn(&AnomalyFunctionSpec) -> Result<Arc<dyn AnomalyFunction>> + Send + Sync>;

/// Registry of function constructors keyed by type tag.
///
/// Type tags are matched case-insensitively.
pub struct FunctionFactory {
    constructors: HashMap<String, FunctionConstructor>,
}

impl FunctionFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Factory with the built-in functions registered.
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        factory.register(ThresholdFunction::TYPE, |spec| {
            Ok(Arc::new(ThresholdFunction::from_spec(spec)?) as Arc<dyn AnomalyFunction>)
        });
        factory
    }

    /// Register (or replace) the constructor for `function_type`.
    pub fn register<F>(&mut self, function_type: &str, constructor: F)
    where
        F: Fn(&AnomalyFunctionSpec) -> Result<Arc<dyn AnomalyFunction>> + Send + Sync + 'static,
    {
        debug!(function_type = %function_type, "registered anomaly function type");
        self.constructors
            .insert(function_type.to_uppercase(), Box::new(constructor));
    }

    /// Build the function for `spec`.
    pub fn from_spec(&self, spec: &AnomalyFunctionSpec) -> Result<Arc<dyn AnomalyFunction>> {
        let constructor = self
            .constructors
            .get(&spec.function_type.to_uppercase())
            .ok_or_else(|| {
                DetectorError::Validation(format!(
                    "unknown anomaly function type '{}' for function {}",
                    spec.function_type, spec.id
                ))
            })?;
        constructor(spec)
    }

    /// Registered type tags, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for FunctionFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use vigil_core::{AnomalyResult, DimensionKey, MetricTimeSeries, TimeUnit};

    use super::*;

    struct NoopFunction {
        spec: AnomalyFunctionSpec,
    }

    impl AnomalyFunction for NoopFunction {
        fn spec(&self) -> &AnomalyFunctionSpec {
            &self.spec
        }

        fn analyze(
            &self,
            _key: &DimensionKey,
            _series: &MetricTimeSeries,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _known: &[AnomalyResult],
        ) -> Result<Vec<AnomalyResult>> {
            Ok(Vec::new())
        }
    }

    fn spec(function_type: &str) -> AnomalyFunctionSpec {
        AnomalyFunctionSpec {
            id: 1,
            function_type: function_type.to_string(),
            metric: "m".to_string(),
            collection: "c".to_string(),
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

    #[test]
    fn defaults_include_threshold() {
        let factory = FunctionFactory::with_defaults();
        assert_eq!(factory.types(), vec!["THRESHOLD"]);

        let function = factory.from_spec(&spec("threshold")).unwrap();
        assert_eq!(function.spec().id, 1);
    }

    #[test]
    fn custom_type_registration() {
        let mut factory = FunctionFactory::new();
        factory.register("noop", |spec| {
            Ok(Arc::new(NoopFunction { spec: spec.clone() }) as Arc<dyn AnomalyFunction>)
        });

        assert!(factory.from_spec(&spec("NOOP")).is_ok());
    }

    #[test]
    fn unknown_type_is_validation_error() {
        let factory = FunctionFactory::with_defaults();
        match factory.from_spec(&spec("KALMAN")) {
            Err(DetectorError::Validation(msg)) => assert!(msg.contains("KALMAN")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected validation error"),
        }
    }
}
