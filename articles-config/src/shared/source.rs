use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;
use crate::shared::base::require_non_empty;

/// Where snapshots are read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Bucket holding the `rappler_articles_*.json` snapshots.
    pub bucket_name: String,
    /// Overrides the storage endpoint, e.g. for an emulator. Requests are sent unauthenticated.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("source.bucket_name", &self.bucket_name)
    }
}
