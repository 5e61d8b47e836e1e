//! Scheduled anomaly detection.
//!
//! [`JobManager`] keeps the registry of recurring jobs and hands them to a
//! [`JobScheduler`]. Each firing runs a [`JobExecutor`] pass: resolve the
//! detection window, fetch already-known anomalies, explore the metric by its
//! configured dimensions, analyze every series and persist the new results in
//! one transaction.

pub mod aggregation;
pub mod client;
pub mod executor;
pub mod exploration;
pub mod function;
pub mod manager;
pub mod metrics;
pub mod scheduler;
pub mod store;
pub mod window;

#[cfg(test)]
mod testing;

pub use aggregation::metric_function;
pub use client::{HttpMetricClient, MetricClient, SeriesByDimension};
pub use executor::{ExecutionContext, ExecutionSummary, JobExecutor};
pub use exploration::{ExplorationEngine, ExplorationOutcome, ExplorationStats};
pub use function::{AnomalyFunction, FunctionFactory, ThresholdFunction};
pub use manager::{ad_hoc_job_key, scheduled_job_key, JobManager};
pub use metrics::{Histogram, HistogramSnapshot, MetricRegistry};
pub use scheduler::{CronScheduler, JobScheduler, ScheduledJob};
pub use store::{
    FileSpecStore, JournalResultStore, MemoryResultStore, MemorySpecStore, ResultStore,
    ResultTransaction, SpecStore,
};
pub use window::{compute_window, DetectionWindow, WindowBounds};
