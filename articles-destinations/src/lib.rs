//! Production implementations of the article stores.
//!
//! BigQuery backs [`articles::store::TableStore`] and Google Cloud Storage backs
//! [`articles::store::BlobStore`]. Each is behind its own cargo feature.

#[cfg(feature = "bigquery")]
pub mod bigquery;
#[cfg(feature = "gcs")]
pub mod gcs;
