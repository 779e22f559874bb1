//! Runs a reconciliation from the snapshots stored in a bucket.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::SyncResult;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::snapshot::{decode_snapshot, select_latest};
use crate::store::BlobStore;

/// Which snapshot a run should reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSource {
    pub bucket: String,
    /// Explicit object to load. When `None`, the latest snapshot in the bucket is used.
    pub object_name: Option<String>,
}

impl SnapshotSource {
    /// Reconcile the latest snapshot in `bucket`.
    pub fn latest(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object_name: None,
        }
    }

    /// Reconcile a specific object of `bucket`.
    pub fn object(bucket: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object_name: Some(object_name.into()),
        }
    }
}

/// Outcome of a successful snapshot sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub bucket: String,
    pub object_name: String,
    pub reconcile: ReconcileReport,
}

/// Loads snapshots from blob storage and hands them to a [`Reconciler`].
#[derive(Clone)]
pub struct SnapshotSync {
    blob_store: Arc<dyn BlobStore>,
    reconciler: Reconciler,
}

impl SnapshotSync {
    pub fn new(blob_store: Arc<dyn BlobStore>, reconciler: Reconciler) -> Self {
        Self {
            blob_store,
            reconciler,
        }
    }

    /// Reconciles the snapshot described by `source`.
    ///
    /// Fails with [`crate::error::ErrorKind::NoSnapshotFound`] when the bucket holds no
    /// snapshot and with [`crate::error::ErrorKind::NoData`] when the snapshot is empty. In
    /// both cases the table store is never touched.
    pub async fn run(&self, source: &SnapshotSource) -> SyncResult<SyncReport> {
        let bucket = source.bucket.as_str();
        info!(store = self.blob_store.name(), bucket, "processing data from bucket");

        let object_name = match &source.object_name {
            Some(object_name) => object_name.clone(),
            None => self.latest_snapshot(bucket).await?,
        };
        info!(bucket, object_name, "selected snapshot");

        let content = self
            .blob_store
            .read_object(bucket, &object_name)
            .await
            .inspect_err(|err| {
                error!(stage = "download", bucket, object_name, error = %err, "failed to download snapshot");
            })?;

        let records = decode_snapshot(&content).inspect_err(|err| {
            error!(stage = "decode", bucket, object_name, error = %err, "failed to decode snapshot");
        })?;
        info!(bucket, object_name, records = records.len(), "decoded snapshot");

        let reconcile = self.reconciler.reconcile(records).await?;

        Ok(SyncReport {
            bucket: bucket.to_string(),
            object_name,
            reconcile,
        })
    }

    async fn latest_snapshot(&self, bucket: &str) -> SyncResult<String> {
        let object_names = self
            .blob_store
            .list_objects(bucket)
            .await
            .inspect_err(|err| {
                error!(stage = "list", bucket, error = %err, "failed to list snapshots");
            })?;

        let latest = select_latest(&object_names).inspect_err(|_| {
            info!(bucket, objects = object_names.len(), "no snapshot found in bucket");
        })?;

        Ok(latest.object_name().to_string())
    }
}
