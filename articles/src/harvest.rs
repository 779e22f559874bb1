//! Publication of harvested articles as immutable snapshots.
//!
//! The scraping itself lives behind [`Harvester`]; this module only turns a fetched listing
//! into a timestamp-named snapshot object. No scraper ships with this crate: a deployment
//! provides its own [`Harvester`] and calls [`harvest_and_publish`] on its own schedule.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::error::SyncResult;
use crate::snapshot::{SNAPSHOT_CONTENT_TYPE, SnapshotName, encode_snapshot};
use crate::store::BlobStore;
use crate::types::ArticleRecord;

/// Source of the current article listing.
///
/// A fetch is a single best-effort attempt. Transport failures must be returned as
/// [`crate::error::ErrorKind::SourceIoError`]; implementations do not retry.
#[async_trait]
pub trait Harvester: Send + Sync {
    async fn fetch_articles(&self) -> SyncResult<Vec<ArticleRecord>>;
}

/// Writes `records` to `bucket` as the snapshot created at `created_at`.
pub async fn publish_snapshot(
    blob_store: &dyn BlobStore,
    bucket: &str,
    records: &[ArticleRecord],
    created_at: DateTime<Utc>,
) -> SyncResult<SnapshotName> {
    let name = SnapshotName::for_timestamp(created_at);
    let content = encode_snapshot(records)?;

    blob_store
        .write_object(
            bucket,
            name.object_name(),
            SNAPSHOT_CONTENT_TYPE,
            Bytes::from(content),
        )
        .await
        .inspect_err(|err| {
            error!(stage = "upload", bucket, object_name = name.object_name(), error = %err, "failed to upload snapshot");
        })?;

    info!(
        bucket,
        object_name = name.object_name(),
        records = records.len(),
        "uploaded snapshot"
    );

    Ok(name)
}

/// Fetches the current listing and publishes it as a snapshot stamped with the current time.
pub async fn harvest_and_publish(
    harvester: &dyn Harvester,
    blob_store: &dyn BlobStore,
    bucket: &str,
) -> SyncResult<SnapshotName> {
    let records = harvester.fetch_articles().await.inspect_err(|err| {
        error!(stage = "fetch", error = %err, "failed to fetch articles");
    })?;

    publish_snapshot(blob_store, bucket, &records, Utc::now()).await
}
