//! Tracing setup shared by the article sync binaries and tests.

pub mod tracing;
