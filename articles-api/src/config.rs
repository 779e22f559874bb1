use articles_config::Config;
use articles_config::shared::{
    ApplicationSettings, DestinationConfig, SourceConfig, ValidationError,
};
use serde::Deserialize;

/// Complete configuration for the sync API service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Bucket holding the article snapshots.
    pub source: SourceConfig,
    /// BigQuery table the snapshots are reconciled into.
    pub destination: DestinationConfig,
    /// Application server settings.
    #[serde(default)]
    pub application: ApplicationSettings,
}

impl ApiConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.destination.validate()
    }
}

impl Config for ApiConfig {
    const ENV_ALIASES: &'static [(&'static str, &'static str)] = &[
        ("GCP_PROJECT", "destination.project_id"),
        ("BQ_DATASET", "destination.dataset_id"),
        ("BQ_TABLE", "destination.table_id"),
        ("BUCKET_NAME", "source.bucket_name"),
        (
            "GOOGLE_APPLICATION_CREDENTIALS",
            "destination.service_account_key_path",
        ),
        ("PORT", "application.port"),
    ];
}
