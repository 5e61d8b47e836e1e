use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use vigil_core::{AnomalyFunctionSpec, AnomalyResult, DetectorError, FunctionId, Result};

use super::journal::Journal;
use super::{ResultStore, ResultTransaction, SpecStore};

// ── Specs ───────────────────────────────────────────────────────────

/// In-memory [`SpecStore`].
#[derive(Debug, Default)]
pub struct MemorySpecStore {
    specs: RwLock<BTreeMap<FunctionId, AnomalyFunctionSpec>>,
}

impl MemorySpecStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a spec, returning the previous one.
    pub fn insert(&self, spec: AnomalyFunctionSpec) -> Option<AnomalyFunctionSpec> {
        self.specs
            .write()
            .ok()
            .and_then(|mut specs| specs.insert(spec.id, spec))
    }

    pub fn remove(&self, id: FunctionId) -> Option<AnomalyFunctionSpec> {
        self.specs.write().ok().and_then(|mut specs| specs.remove(&id))
    }
}

impl FromIterator<AnomalyFunctionSpec> for MemorySpecStore {
    fn from_iter<I: IntoIterator<Item = AnomalyFunctionSpec>>(iter: I) -> Self {
        Self {
            specs: RwLock::new(iter.into_iter().map(|s| (s.id, s)).collect()),
        }
    }
}

impl SpecStore for MemorySpecStore {
    fn find_by_id(&self, id: FunctionId) -> Result<Option<AnomalyFunctionSpec>> {
        let specs = self
            .specs
            .read()
            .map_err(|e| DetectorError::Persistence(format!("spec store lock: {e}")))?;
        Ok(specs.get(&id).cloned())
    }

    fn find_all(&self) -> Result<Vec<AnomalyFunctionSpec>> {
        let specs = self
            .specs
            .read()
            .map_err(|e| DetectorError::Persistence(format!("spec store lock: {e}")))?;
        Ok(specs.values().cloned().collect())
    }
}

// ── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(super) struct StoredResults {
    rows: Vec<AnomalyResult>,
    next_id: u64,
}

/// In-memory transactional [`ResultStore`].
///
/// Each transaction stages its writes privately; commit publishes them in one
/// step under the store lock and assigns ids.
#[derive(Debug, Clone, Default)]
pub struct MemoryResultStore {
    inner: Arc<Mutex<StoredResults>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-existing results directly, outside any transaction.
    pub fn seed(&self, results: impl IntoIterator<Item = AnomalyResult>) -> Result<()> {
        let mut stored = lock(&self.inner)?;
        let rows = stored.prepare(results.into_iter().collect());
        stored.publish(rows);
        Ok(())
    }

    /// Every committed result in insertion order.
    pub fn all(&self) -> Vec<AnomalyResult> {
        self.inner
            .lock()
            .map(|s| s.rows.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|s| s.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StoredResults {
    /// Assign ids and creation times to `results` without publishing them.
    pub(super) fn prepare(&self, results: Vec<AnomalyResult>) -> Vec<AnomalyResult> {
        let now = Utc::now();
        results
            .into_iter()
            .zip(self.next_id + 1..)
            .map(|(mut result, id)| {
                result.id = Some(id);
                result.created_at.get_or_insert(now);
                result
            })
            .collect()
    }

    pub(super) fn publish(&mut self, rows: Vec<AnomalyResult>) {
        for row in rows {
            if let Some(id) = row.id {
                self.next_id = self.next_id.max(id);
            }
            self.rows.push(row);
        }
    }

    pub(super) fn rows(&self) -> &[AnomalyResult] {
        &self.rows
    }

    /// Results of `function_id` in `collection` whose range overlaps `[start, end)`.
    fn overlapping(
        &self,
        collection: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        function_id: FunctionId,
    ) -> Vec<AnomalyResult> {
        self.rows
            .iter()
            .filter(|r| {
                r.collection == collection
                    && r.function_id == Some(function_id)
                    && r.start_time < end
                    && r.end_time > start
            })
            .cloned()
            .collect()
    }
}

pub(super) fn lock(inner: &Mutex<StoredResults>) -> Result<std::sync::MutexGuard<'_, StoredResults>> {
    inner
        .lock()
        .map_err(|e| DetectorError::Persistence(format!("result store lock: {e}")))
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn begin(&self) -> Result<Box<dyn ResultTransaction>> {
        Ok(MemoryTransaction::open(Arc::clone(&self.inner), None))
    }
}

/// Transaction over [`StoredResults`], optionally writing through a journal.
pub(super) struct MemoryTransaction {
    inner: Arc<Mutex<StoredResults>>,
    journal: Option<Arc<Journal>>,
    staged: Vec<AnomalyResult>,
    finished: bool,
}

impl MemoryTransaction {
    pub(super) fn open(
        inner: Arc<Mutex<StoredResults>>,
        journal: Option<Arc<Journal>>,
    ) -> Box<dyn ResultTransaction> {
        Box::new(Self {
            inner,
            journal,
            staged: Vec::new(),
            finished: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(DetectorError::Persistence(
                "transaction already finished".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultTransaction for MemoryTransaction {
    async fn find_all_by_collection_time_and_function(
        &mut self,
        collection: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        function_id: FunctionId,
    ) -> Result<Vec<AnomalyResult>> {
        self.ensure_open()?;
        Ok(lock(&self.inner)?.overlapping(collection, start, end, function_id))
    }

    async fn create(&mut self, result: AnomalyResult) -> Result<()> {
        self.ensure_open()?;
        self.staged.push(result);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.finished = true;

        let mut stored = lock(&self.inner)?;
        let rows = stored.prepare(std::mem::take(&mut self.staged));
        if let Some(journal) = &self.journal {
            journal.append(&rows)?;
        }
        stored.publish(rows);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.staged.clear();
        self.finished = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.staged.is_empty() {
            debug!(staged = self.staged.len(), "discarding uncommitted results");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone};
    use vigil_core::{DimensionKey, TimeUnit};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn result(function_id: FunctionId, collection: &str, offset_hours: i64) -> AnomalyResult {
        let start = t0() + Duration::hours(offset_hours);
        let mut r = AnomalyResult::new(DimensionKey::from_iter(["*"]), start, start + Duration::hours(1), 1.0);
        r.function_id = Some(function_id);
        r.collection = collection.to_string();
        r
    }

    fn spec(id: FunctionId) -> AnomalyFunctionSpec {
        AnomalyFunctionSpec {
            id,
            function_type: "THRESHOLD".to_string(),
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
            properties: BTreeMap::new(),
            is_active: true,
        }
    }

    #[test]
    fn spec_store_lookup() {
        let store: MemorySpecStore = [spec(2), spec(1)].into_iter().collect();
        assert_eq!(store.find_by_id(1).unwrap().unwrap().id, 1);
        assert!(store.find_by_id(3).unwrap().is_none());

        let ids: Vec<_> = store.find_all().unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);

        assert!(store.remove(2).is_some());
        assert!(store.find_by_id(2).unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_publishes_and_assigns_ids() {
        let store = MemoryResultStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create(result(1, "c", 0)).await.unwrap();
        tx.create(result(1, "c", 1)).await.unwrap();
        assert!(store.is_empty());

        tx.commit().await.unwrap();
        let all = store.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, Some(1));
        assert_eq!(all[1].id, Some(2));
        assert!(all[0].created_at.is_some());
    }

    #[tokio::test]
    async fn rollback_and_drop_discard_writes() {
        let store = MemoryResultStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.create(result(1, "c", 0)).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(tx.commit().await.is_err());

        {
            let mut tx = store.begin().await.unwrap();
            tx.create(result(1, "c", 0)).await.unwrap();
        }

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn lookup_filters_collection_function_and_window() {
        let store = MemoryResultStore::new();
        store
            .seed([
                result(1, "c", 2),
                result(1, "c", 30),
                result(2, "c", 2),
                result(1, "other", 2),
            ])
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = tx
            .find_all_by_collection_time_and_function("c", t0(), t0() + Duration::days(1), 1)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].start_time, t0() + Duration::hours(2));
    }

    #[tokio::test]
    async fn lookup_includes_results_straddling_window_edges() {
        let store = MemoryResultStore::new();
        store
            .seed([result(1, "c", 3), result(1, "c", 5), result(1, "c", 6)])
            .unwrap();

        // window [03:30, 06:00) cuts the 03:00 bucket and ends where 06:00 begins
        let mut tx = store.begin().await.unwrap();
        let found = tx
            .find_all_by_collection_time_and_function(
                "c",
                t0() + Duration::minutes(210),
                t0() + Duration::hours(6),
                1,
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let starts: Vec<_> = found.iter().map(|r| r.start_time).collect();
        assert_eq!(starts, vec![t0() + Duration::hours(3), t0() + Duration::hours(5)]);
    }

    #[tokio::test]
    async fn ids_continue_after_seeded_rows() {
        let store = MemoryResultStore::new();
        store.seed([result(1, "c", 0)]).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.create(result(1, "c", 1)).await.unwrap();
        tx.commit().await.unwrap();

        let ids: Vec<_> = store.all().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
    }
}
