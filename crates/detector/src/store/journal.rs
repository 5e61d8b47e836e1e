//! Durable result store backed by an append-only JSON-lines file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use vigil_core::{AnomalyResult, DetectorError, Result};

use super::memory::{lock, MemoryTransaction, StoredResults};
use super::{ResultStore, ResultTransaction};

/// Append-only file of committed results, one JSON object per line.
#[derive(Debug)]
pub(super) struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Append `rows` and sync them to disk.
    pub(super) fn append(&self, rows: &[AnomalyResult]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for row in rows {
            let line = serde_json::to_string(row)
                .map_err(|e| DetectorError::Serialize(e.to_string()))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

/// [`ResultStore`] that keeps results in memory and journals every commit.
///
/// Opening the store replays the journal, so ids and known anomalies survive
/// restarts. A commit is visible only after its rows are on disk.
#[derive(Debug, Clone)]
pub struct JournalResultStore {
    journal: Arc<Journal>,
    inner: Arc<Mutex<StoredResults>>,
}

impl JournalResultStore {
    /// Open (or create) the journal at `path` and replay its rows.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut stored = StoredResults::default();
        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let mut rows = Vec::new();
            for (n, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let row: AnomalyResult = serde_json::from_str(line).map_err(|e| {
                    DetectorError::Serialize(format!("{}:{}: {}", path.display(), n + 1, e))
                })?;
                rows.push(row);
            }
            stored.publish(rows);
        }

        info!(path = %path.display(), rows = stored.rows().len(), "opened result journal");
        Ok(Self {
            journal: Arc::new(Journal { path }),
            inner: Arc::new(Mutex::new(stored)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.journal.path
    }

    /// Every committed result in commit order.
    pub fn all(&self) -> Result<Vec<AnomalyResult>> {
        Ok(lock(&self.inner)?.rows().to_vec())
    }
}

#[async_trait]
impl ResultStore for JournalResultStore {
    async fn begin(&self) -> Result<Box<dyn ResultTransaction>> {
        Ok(MemoryTransaction::open(
            Arc::clone(&self.inner),
            Some(Arc::clone(&self.journal)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use vigil_core::DimensionKey;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn result(offset_hours: i64) -> AnomalyResult {
        let start = t0() + Duration::hours(offset_hours);
        let mut r = AnomalyResult::new(DimensionKey::from_iter(["US"]), start, start + Duration::hours(1), 2.5);
        r.function_id = Some(3);
        r.collection = "web".to_string();
        r
    }

    #[tokio::test]
    async fn committed_results_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results").join("anomalies.jsonl");

        let store = JournalResultStore::open(&path).unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.create(result(0)).await.unwrap();
        tx.create(result(1)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);

        let reopened = JournalResultStore::open(&path).unwrap();
        let rows = reopened.all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id, Some(2));
        assert_eq!(rows[1].dimensions, DimensionKey::from_iter(["US"]));

        let mut tx = reopened.begin().await.unwrap();
        let known = tx
            .find_all_by_collection_time_and_function("web", t0(), t0() + Duration::days(1), 3)
            .await
            .unwrap();
        tx.create(result(2)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(known.len(), 2);
        assert_eq!(reopened.all().unwrap()[2].id, Some(3));
    }

    #[tokio::test]
    async fn rolled_back_results_are_not_journaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anomalies.jsonl");

        let store = JournalResultStore::open(&path).unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.create(result(0)).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.all().unwrap().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_line_is_reported_with_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anomalies.jsonl");
        fs::write(&path, "\n{not json}\n").unwrap();

        let err = JournalResultStore::open(&path).unwrap_err();
        assert!(matches!(err, DetectorError::Serialize(ref msg) if msg.contains(":2:")));
    }
}
