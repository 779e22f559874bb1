//! Harvested article snapshots and their reconciliation into an analytical table.
//!
//! The [`reconcile::Reconciler`] merges a batch of [`types::ArticleRecord`]s into a target
//! table keyed by `article_id`, using a run-scoped staging table and a single `MERGE`.
//! [`sync::SnapshotSync`] feeds it from the latest snapshot of a bucket, and
//! [`harvest::publish_snapshot`] writes new snapshots. External systems are reached through
//! the [`store::BlobStore`] and [`store::TableStore`] traits.

pub mod error;
pub mod harvest;
mod macros;
pub mod normalize;
pub mod reconcile;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod types;
