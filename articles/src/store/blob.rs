use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SyncResult;

/// Blob storage holding immutable snapshot objects.
///
/// Every call is a single attempt. Transport failures are returned as
/// [`crate::error::ErrorKind::SourceIoError`] and are never retried internally; a missing
/// object is reported as [`crate::error::ErrorKind::SourceObjectMissing`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns the name of the blob store implementation.
    fn name(&self) -> &'static str;

    /// Lists the names of all objects in `bucket`.
    async fn list_objects(&self, bucket: &str) -> SyncResult<Vec<String>>;

    /// Downloads the full content of an object.
    async fn read_object(&self, bucket: &str, object_name: &str) -> SyncResult<Bytes>;

    /// Writes an object, replacing any existing object with the same name.
    async fn write_object(
        &self,
        bucket: &str,
        object_name: &str,
        content_type: &str,
        content: Bytes,
    ) -> SyncResult<()>;
}
