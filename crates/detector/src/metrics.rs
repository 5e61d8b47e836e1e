use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Duration histogram for one named job.
#[derive(Debug, Default)]
pub struct Histogram {
    inner: Mutex<HistogramSnapshot>,
}

/// Point-in-time view of a [`Histogram`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
    pub mean: Duration,
    pub last: Option<Duration>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Histogram {
    /// Record one observed duration.
    pub fn update(&self, duration: Duration) {
        // A poisoned histogram only loses an observation.
        let Ok(mut h) = self.inner.lock() else {
            return;
        };

        h.count += 1;
        h.min = Some(h.min.map_or(duration, |m| m.min(duration)));
        h.max = Some(h.max.map_or(duration, |m| m.max(duration)));
        h.last = Some(duration);
        h.last_updated = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        h.mean = if h.count == 1 {
            duration
        } else {
            let prev_nanos = h.mean.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / h.count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        self.inner
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

/// Named histograms shared by every job execution.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    histograms: RwLock<BTreeMap<String, Arc<Histogram>>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the histogram registered under `name`, creating it on first use.
    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        if let Ok(histograms) = self.histograms.read() {
            if let Some(h) = histograms.get(name) {
                return Arc::clone(h);
            }
        }
        match self.histograms.write() {
            Ok(mut histograms) => Arc::clone(histograms.entry(name.to_string()).or_default()),
            // Still hand out a working histogram; it just is not registered.
            Err(_) => Arc::new(Histogram::default()),
        }
    }

    /// Snapshot of every registered histogram, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, HistogramSnapshot> {
        self.histograms
            .read()
            .map(|hs| {
                hs.iter()
                    .map(|(name, h)| (name.clone(), h.snapshot()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
