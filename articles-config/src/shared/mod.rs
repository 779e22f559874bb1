//! Shared configuration types for the article sync services.

mod application;
mod base;
mod destination;
mod source;

pub use application::ApplicationSettings;
pub use base::ValidationError;
pub use destination::{BigQueryCredentials, DestinationConfig};
pub use source::SourceConfig;
