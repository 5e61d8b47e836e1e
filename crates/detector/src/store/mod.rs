//! Function spec and anomaly result stores.
//!
//! Result persistence goes through explicit transactions: callers open one
//! with [`ResultStore::begin`], pass it by `&mut` into each store call and
//! finish it with `commit` or `rollback`. Dropping an unfinished transaction
//! discards its writes.

mod file;
mod journal;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vigil_core::{AnomalyFunctionSpec, AnomalyResult, FunctionId, Result};

pub use self::file::{FileSpecStore, LoadResult, LoadStatus};
pub use self::journal::JournalResultStore;
pub use self::memory::{MemoryResultStore, MemorySpecStore};

/// Read access to stored function specs.
pub trait SpecStore: Send + Sync {
    fn find_by_id(&self, id: FunctionId) -> Result<Option<AnomalyFunctionSpec>>;

    /// All specs, ordered by id.
    fn find_all(&self) -> Result<Vec<AnomalyFunctionSpec>>;
}

/// Transactional store of anomaly results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Open a new transaction scope.
    async fn begin(&self) -> Result<Box<dyn ResultTransaction>>;
}

/// One open transaction against a [`ResultStore`].
#[async_trait]
pub trait ResultTransaction: Send {
    /// Stored results of `function_id` in `collection` lying within `[start, end]`.
    async fn find_all_by_collection_time_and_function(
        &mut self,
        collection: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        function_id: FunctionId,
    ) -> Result<Vec<AnomalyResult>>;

    /// Stage `result` for insertion on commit.
    async fn create(&mut self, result: AnomalyResult) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
