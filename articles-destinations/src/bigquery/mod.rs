mod client;
mod core;
mod encoding;

pub use client::{BigQueryClient, QueryOutcome};
pub use core::BigQueryTableStore;
