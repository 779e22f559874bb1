//! Merges a batch of articles into the target table through a run-scoped staging table.
//!
//! One run creates a freshly named staging table, loads the batch into it, issues a single
//! `MERGE` keyed on `article_id` and always attempts to drop the staging table afterwards.
//! Runs share no in-process state; the random staging name is the only thing keeping
//! concurrent runs apart.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::normalize::{deduplicate_by_key, normalize_records};
use crate::store::{MergeStats, TableStore};
use crate::sync_error;
use crate::types::{ARTICLE_COLUMNS, ArticleRecord, ArticleRow, TableRef};

/// Infix between the target table name and the random suffix of staging tables.
const STAGING_TABLE_INFIX: &str = "_temp_";

/// Number of hex characters of the random staging suffix.
const STAGING_SUFFIX_LEN: usize = 8;

/// Outcome of a successful reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The staging table used by the run. It no longer exists when the report is returned.
    pub staging_table: TableRef,
    /// Number of records in the batch handed to the reconciler.
    pub records_received: usize,
    /// Number of records loaded into staging and merged into the target.
    pub records_merged: usize,
    /// Records dropped because a later record in the batch had the same `article_id`.
    pub duplicates_dropped: usize,
    /// Target rows inserted or updated, when the table store reports it.
    pub affected_rows: Option<u64>,
}

/// Generates a run-scoped staging table name for `target_table_id`.
///
/// Uniqueness comes from a random UUID fragment only; there is no lock between runs.
pub fn staging_table_id(target_table_id: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();

    format!(
        "{target_table_id}{STAGING_TABLE_INFIX}{}",
        &suffix[..STAGING_SUFFIX_LEN]
    )
}

/// Upserts article batches into a target table.
#[derive(Clone)]
pub struct Reconciler {
    table_store: Arc<dyn TableStore>,
    target: TableRef,
}

impl Reconciler {
    /// Creates a reconciler writing into `target` through `table_store`.
    pub fn new(table_store: Arc<dyn TableStore>, target: TableRef) -> Self {
        Self {
            table_store,
            target,
        }
    }

    /// Merges `records` into the target table.
    ///
    /// An empty batch returns [`ErrorKind::NoData`] without touching the table store. Load and
    /// merge failures are returned as [`ErrorKind::LoadFailed`] and [`ErrorKind::MergeFailed`].
    /// The staging table is dropped whatever the outcome; a failed drop is logged and never
    /// replaces the outcome of the run.
    pub async fn reconcile(&self, records: Vec<ArticleRecord>) -> SyncResult<ReconcileReport> {
        let records_received = records.len();
        if records_received == 0 {
            info!(target_table = %self.target, "no records to reconcile");
            return Err(sync_error!(
                ErrorKind::NoData,
                "No records to reconcile",
                self.target.to_string()
            ));
        }

        let (rows, duplicates_dropped) = deduplicate_by_key(normalize_records(records));
        if duplicates_dropped > 0 {
            warn!(
                target_table = %self.target,
                duplicates_dropped,
                "batch contains duplicate article ids, keeping the last occurrence"
            );
        }

        let staging = self.target.sibling(staging_table_id(&self.target.table_id));
        let records_merged = rows.len();

        let result = self.stage_and_merge(&staging, rows).await;
        self.drop_staging(&staging).await;

        let stats = result?;
        info!(
            store = self.table_store.name(),
            target_table = %self.target,
            records_merged,
            affected_rows = ?stats.affected_rows,
            "upserted records into target table"
        );

        Ok(ReconcileReport {
            staging_table: staging,
            records_received,
            records_merged,
            duplicates_dropped,
            affected_rows: stats.affected_rows,
        })
    }

    async fn stage_and_merge(
        &self,
        staging: &TableRef,
        rows: Vec<ArticleRow>,
    ) -> SyncResult<MergeStats> {
        self.table_store
            .create_table(staging, ARTICLE_COLUMNS)
            .await
            .map_err(|err| {
                self.stage_failed(
                    "create_staging",
                    staging,
                    err,
                    ErrorKind::StagingCreateFailed,
                    "Failed to create staging table",
                )
            })?;
        info!(staging_table = %staging, "created staging table");

        let loaded = self
            .table_store
            .load_rows(staging, rows)
            .await
            .map_err(|err| {
                self.stage_failed(
                    "load",
                    staging,
                    err,
                    ErrorKind::LoadFailed,
                    "Failed to load records into staging table",
                )
            })?;
        info!(staging_table = %staging, rows = loaded, "loaded records into staging table");

        let stats = self
            .table_store
            .merge_tables(&self.target, staging, ARTICLE_COLUMNS)
            .await
            .map_err(|err| {
                self.stage_failed(
                    "merge",
                    staging,
                    err,
                    ErrorKind::MergeFailed,
                    "Failed to merge staging table into target table",
                )
            })?;
        info!(
            staging_table = %staging,
            target_table = %self.target,
            "merged staging table into target table"
        );

        Ok(stats)
    }

    fn stage_failed(
        &self,
        stage: &'static str,
        staging: &TableRef,
        err: SyncError,
        kind: ErrorKind,
        description: &'static str,
    ) -> SyncError {
        error!(
            stage,
            staging_table = %staging,
            target_table = %self.target,
            error = %err,
            "reconciliation stage failed"
        );

        err.in_stage(kind, description)
    }

    async fn drop_staging(&self, staging: &TableRef) {
        match self.table_store.drop_table(staging).await {
            Ok(()) => info!(staging_table = %staging, "dropped staging table"),
            Err(err) if err.kind() == ErrorKind::DestinationTableMissing => {
                warn!(staging_table = %staging, "staging table not found for deletion");
            }
            Err(err) => {
                let err = err.in_stage(ErrorKind::CleanupFailed, "Failed to drop staging table");
                error!(
                    stage = "cleanup",
                    staging_table = %staging,
                    error = %err,
                    "failed to drop staging table"
                );
            }
        }
    }
}
