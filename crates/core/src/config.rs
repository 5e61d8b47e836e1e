use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Non-empty value of `key`, looked up as `{PROFILE}_{KEY}` before `{KEY}`.
fn lookup(profile: &str, key: &str) -> Option<String> {
    let non_empty = |k: &str| env::var(k).ok().filter(|v| !v.is_empty());
    if profile.is_empty() {
        return non_empty(key);
    }
    non_empty(&format!("{profile}_{key}")).or_else(|| non_empty(key))
}

fn lookup_parsed<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    lookup(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub functions: FunctionsConfig,
    pub metrics: MetricSourceConfig,
    pub results: ResultsConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `VIGIL_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        Self::for_profile(&lookup("", "VIGIL_PROFILE").unwrap_or_default())
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            functions: FunctionsConfig::from_env_profiled(p),
            metrics: MetricSourceConfig::from_env_profiled(p),
            results: ResultsConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  functions:   specs_dir={}", self.functions.specs_dir.display());
        tracing::info!(
            "  metrics:     url={}, timeout={}s",
            self.metrics.url,
            self.metrics.timeout_secs
        );
        match &self.results.journal_path {
            Some(path) => tracing::info!("  results:     journal={}", path.display()),
            None => tracing::info!("  results:     in-memory (VIGIL_RESULTS_PATH unset)"),
        }
    }
}

// ── Function specs ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionsConfig {
    /// Directory scanned for `*.yml` / `*.yaml` function specs.
    pub specs_dir: PathBuf,
}

impl FunctionsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            specs_dir: lookup(p, "VIGIL_SPECS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/functions")),
        }
    }
}

// ── Metric query service ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSourceConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl MetricSourceConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: lookup(p, "VIGIL_METRIC_URL")
                .unwrap_or_else(|| "http://localhost:1426".to_string()),
            timeout_secs: lookup_parsed(p, "VIGIL_QUERY_TIMEOUT_SECS", 30),
        }
    }
}

// ── Result persistence ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsConfig {
    /// JSON-lines journal of committed anomalies; results stay in memory when unset.
    pub journal_path: Option<PathBuf>,
}

impl ResultsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            journal_path: lookup(p, "VIGIL_RESULTS_PATH").map(PathBuf::from),
        }
    }
}
