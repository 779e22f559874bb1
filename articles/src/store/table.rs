use async_trait::async_trait;

use crate::error::SyncResult;
use crate::types::{ArticleRow, ColumnSchema, TableRef};

/// Counters reported by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Number of target rows inserted or updated, when the store reports it.
    pub affected_rows: Option<u64>,
}

/// Analytical table store holding the target and staging tables.
///
/// Implementations must wait for every operation to complete before returning: the
/// reconciler treats each call as a synchronous barrier. The merge must be a single
/// atomic statement on the store side.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Returns the name of the table store implementation.
    fn name(&self) -> &'static str;

    /// Creates a table with the given columns.
    async fn create_table(&self, table: &TableRef, columns: &[ColumnSchema]) -> SyncResult<()>;

    /// Replaces the content of `table` with `rows` (write-truncate) and returns the number of
    /// rows written.
    async fn load_rows(&self, table: &TableRef, rows: Vec<ArticleRow>) -> SyncResult<usize>;

    /// Upserts every row of `staging` into `target`, matching on the primary columns.
    ///
    /// Matched target rows get all non-key columns from the staging row, unmatched staging
    /// rows are inserted, target rows without a staging counterpart are left untouched.
    async fn merge_tables(
        &self,
        target: &TableRef,
        staging: &TableRef,
        columns: &[ColumnSchema],
    ) -> SyncResult<MergeStats>;

    /// Drops a table.
    ///
    /// Returns an error of kind [`crate::error::ErrorKind::DestinationTableMissing`] when the
    /// table does not exist.
    async fn drop_table(&self, table: &TableRef) -> SyncResult<()>;
}
