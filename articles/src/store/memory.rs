//! In-memory blob and table stores for testing and development.
//!
//! Both stores keep all data behind an `Arc<Mutex<_>>`, so clones share state and tests can
//! inspect what a run left behind. Individual operations can be made to fail to exercise
//! error paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::store::{BlobStore, MergeStats, TableStore};
use crate::sync_error;
use crate::types::{ArticleRow, ColumnSchema, TableRef};

/// Operations of [`MemoryTableStore`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableOperation {
    CreateTable,
    LoadRows,
    MergeTables,
    DropTable,
}

#[derive(Debug, Default)]
struct TableInner {
    tables: HashMap<TableRef, Vec<ArticleRow>>,
    failures: HashMap<TableOperation, ErrorKind>,
    operations: Vec<(TableOperation, TableRef)>,
}

impl TableInner {
    fn record(&mut self, operation: TableOperation, table: &TableRef) -> SyncResult<()> {
        self.operations.push((operation, table.clone()));

        if let Some(kind) = self.failures.get(&operation) {
            return Err(sync_error!(
                *kind,
                "Injected table store failure",
                format!("{operation:?} on {table}")
            ));
        }

        Ok(())
    }
}

/// In-memory table store.
///
/// Tables are keyed by their full [`TableRef`]. The merge follows the semantics of a
/// BigQuery `MERGE`: it fails when two staging rows share a key, since one target row may
/// only be matched by a single source row.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    inner: Arc<Mutex<TableInner>>,
}

impl MemoryTableStore {
    /// Creates a new store without tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `table` holding `rows`, replacing any existing table with the same name.
    pub async fn insert_table(&self, table: TableRef, rows: Vec<ArticleRow>) {
        let mut inner = self.inner.lock().await;
        inner.tables.insert(table, rows);
    }

    /// Returns a copy of the rows of `table`, or `None` if it does not exist.
    pub async fn table_rows(&self, table: &TableRef) -> Option<Vec<ArticleRow>> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).cloned()
    }

    /// Returns the references of all existing tables.
    pub async fn tables(&self) -> HashSet<TableRef> {
        let inner = self.inner.lock().await;
        inner.tables.keys().cloned().collect()
    }

    /// Returns the operations attempted so far, in order, including failed ones.
    pub async fn operations(&self) -> Vec<(TableOperation, TableRef)> {
        let inner = self.inner.lock().await;
        inner.operations.clone()
    }

    /// Makes every subsequent `operation` fail with an error of `kind`.
    pub async fn fail_on(&self, operation: TableOperation, kind: ErrorKind) {
        let mut inner = self.inner.lock().await;
        inner.failures.insert(operation, kind);
    }
}

fn missing_table(table: &TableRef) -> SyncError {
    sync_error!(
        ErrorKind::DestinationTableMissing,
        "Table not found",
        table.to_string()
    )
}

#[async_trait]
impl TableStore for MemoryTableStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_table(&self, table: &TableRef, _columns: &[ColumnSchema]) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.record(TableOperation::CreateTable, table)?;

        if inner.tables.contains_key(table) {
            bail!(
                ErrorKind::DestinationError,
                "Table already exists",
                table.to_string()
            );
        }

        info!(%table, "creating table");
        inner.tables.insert(table.clone(), Vec::new());

        Ok(())
    }

    async fn load_rows(&self, table: &TableRef, rows: Vec<ArticleRow>) -> SyncResult<usize> {
        let mut inner = self.inner.lock().await;
        inner.record(TableOperation::LoadRows, table)?;

        let Some(table_rows) = inner.tables.get_mut(table) else {
            return Err(missing_table(table));
        };

        info!(%table, rows = rows.len(), "loading rows");
        let loaded = rows.len();
        *table_rows = rows;

        Ok(loaded)
    }

    async fn merge_tables(
        &self,
        target: &TableRef,
        staging: &TableRef,
        _columns: &[ColumnSchema],
    ) -> SyncResult<MergeStats> {
        let mut inner = self.inner.lock().await;
        inner.record(TableOperation::MergeTables, target)?;

        let Some(staging_rows) = inner.tables.get(staging).cloned() else {
            return Err(missing_table(staging));
        };
        let Some(target_rows) = inner.tables.get_mut(target) else {
            return Err(missing_table(target));
        };

        let mut seen = HashSet::with_capacity(staging_rows.len());
        for row in &staging_rows {
            if !seen.insert(row.article_id.as_str()) {
                bail!(
                    ErrorKind::DestinationQueryFailed,
                    "MERGE must match at most one source row for each target row",
                    row.article_id.clone()
                );
            }
        }

        let mut positions: BTreeMap<String, usize> = target_rows
            .iter()
            .enumerate()
            .map(|(index, row)| (row.article_id.clone(), index))
            .collect();

        let affected_rows = staging_rows.len() as u64;
        for row in staging_rows {
            match positions.get(&row.article_id) {
                Some(&index) => target_rows[index] = row,
                None => {
                    positions.insert(row.article_id.clone(), target_rows.len());
                    target_rows.push(row);
                }
            }
        }

        info!(%target, %staging, affected_rows, "merged tables");

        Ok(MergeStats {
            affected_rows: Some(affected_rows),
        })
    }

    async fn drop_table(&self, table: &TableRef) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.record(TableOperation::DropTable, table)?;

        if inner.tables.remove(table).is_none() {
            return Err(missing_table(table));
        }

        info!(%table, "dropped table");

        Ok(())
    }
}

/// Operations of [`MemoryBlobStore`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobOperation {
    ListObjects,
    ReadObject,
    WriteObject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub content: Bytes,
}

#[derive(Debug, Default)]
struct BlobInner {
    buckets: HashMap<String, BTreeMap<String, StoredObject>>,
    failures: HashSet<BlobOperation>,
}

/// In-memory blob store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<BlobInner>>,
}

impl MemoryBlobStore {
    /// Creates a new store without buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bucket if it does not exist yet.
    pub async fn create_bucket(&self, bucket: &str) {
        let mut inner = self.inner.lock().await;
        inner.buckets.entry(bucket.to_string()).or_default();
    }

    /// Returns a copy of a stored object.
    pub async fn object(&self, bucket: &str, object_name: &str) -> Option<StoredObject> {
        let inner = self.inner.lock().await;
        inner
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(object_name))
            .cloned()
    }

    /// Makes every subsequent `operation` fail as a transport failure.
    pub async fn fail_on(&self, operation: BlobOperation) {
        let mut inner = self.inner.lock().await;
        inner.failures.insert(operation);
    }

    async fn check(&self, operation: BlobOperation) -> SyncResult<()> {
        let inner = self.inner.lock().await;
        if inner.failures.contains(&operation) {
            bail!(
                ErrorKind::SourceIoError,
                "Injected blob store failure",
                format!("{operation:?}")
            );
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_objects(&self, bucket: &str) -> SyncResult<Vec<String>> {
        self.check(BlobOperation::ListObjects).await?;

        let inner = self.inner.lock().await;
        let Some(objects) = inner.buckets.get(bucket) else {
            bail!(ErrorKind::SourceObjectMissing, "Bucket not found", bucket);
        };

        Ok(objects.keys().cloned().collect())
    }

    async fn read_object(&self, bucket: &str, object_name: &str) -> SyncResult<Bytes> {
        self.check(BlobOperation::ReadObject).await?;

        let inner = self.inner.lock().await;
        match inner.buckets.get(bucket).and_then(|o| o.get(object_name)) {
            Some(object) => Ok(object.content.clone()),
            None => bail!(
                ErrorKind::SourceObjectMissing,
                "Object not found",
                format!("gs://{bucket}/{object_name}")
            ),
        }
    }

    async fn write_object(
        &self,
        bucket: &str,
        object_name: &str,
        content_type: &str,
        content: Bytes,
    ) -> SyncResult<()> {
        self.check(BlobOperation::WriteObject).await?;

        let mut inner = self.inner.lock().await;
        inner.buckets.entry(bucket.to_string()).or_default().insert(
            object_name.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                content,
            },
        );

        Ok(())
    }
}
