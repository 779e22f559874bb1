//! Seams to the external systems: blob storage for snapshots and the table store for articles.

pub mod blob;
pub mod memory;
pub mod table;

pub use blob::BlobStore;
pub use table::{MergeStats, TableStore};
