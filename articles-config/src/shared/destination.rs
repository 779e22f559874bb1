use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;
use crate::shared::base::require_non_empty;

const fn default_query_timeout_ms() -> u32 {
    DestinationConfig::DEFAULT_QUERY_TIMEOUT_MS
}

/// BigQuery table the snapshots are reconciled into.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid accidentally
/// leaking the service account key into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    /// Google Cloud project identifier.
    pub project_id: String,
    /// BigQuery dataset identifier.
    pub dataset_id: String,
    /// Target table identifier. Staging tables are created next to it.
    pub table_id: String,
    /// Path to a service account key file.
    #[serde(default)]
    pub service_account_key_path: Option<String>,
    /// Inline service account key.
    #[serde(default)]
    pub service_account_key: Option<SecretString>,
    /// How long a query request waits for its job before falling back to polling.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u32,
}

/// How the BigQuery and storage clients authenticate.
#[derive(Debug, Clone, Copy)]
pub enum BigQueryCredentials<'a> {
    /// Service account key file.
    KeyPath(&'a str),
    /// Inline service account key.
    Key(&'a SecretString),
    /// Application default credentials of the runtime environment.
    ApplicationDefault,
}

impl DestinationConfig {
    pub const DEFAULT_QUERY_TIMEOUT_MS: u32 = 60_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("destination.project_id", &self.project_id)?;
        require_non_empty("destination.dataset_id", &self.dataset_id)?;
        require_non_empty("destination.table_id", &self.table_id)?;

        if self.query_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "destination.query_timeout_ms",
                constraint: "must be greater than zero",
            });
        }

        if self.service_account_key.is_some() && self.service_account_key_path.is_some() {
            return Err(ValidationError::AmbiguousCredentials);
        }

        Ok(())
    }

    /// Returns the configured credentials, falling back to application default credentials.
    pub fn credentials(&self) -> BigQueryCredentials<'_> {
        match (&self.service_account_key, &self.service_account_key_path) {
            (Some(key), _) => BigQueryCredentials::Key(key),
            (None, Some(path)) => BigQueryCredentials::KeyPath(path),
            (None, None) => BigQueryCredentials::ApplicationDefault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DestinationConfig {
        DestinationConfig {
            project_id: "project".to_string(),
            dataset_id: "news".to_string(),
            table_id: "articles".to_string(),
            service_account_key_path: None,
            service_account_key: None,
            query_timeout_ms: DestinationConfig::DEFAULT_QUERY_TIMEOUT_MS,
        }
    }

    #[test]
    fn rejects_blank_identifiers() {
        let mut config = config();
        config.table_id = " ".to_string();

        assert!(matches!(
            config.validate(),
            Err(ValidationError::EmptyField("destination.table_id"))
        ));
    }

    #[test]
    fn rejects_two_credential_sources() {
        let mut config = config();
        config.service_account_key_path = Some("/secrets/key.json".to_string());
        config.service_account_key = Some(SecretString::new("{}".to_string()));

        assert!(matches!(
            config.validate(),
            Err(ValidationError::AmbiguousCredentials)
        ));
    }

    #[test]
    fn falls_back_to_application_default_credentials() {
        let mut config = config();
        assert!(matches!(
            config.credentials(),
            BigQueryCredentials::ApplicationDefault
        ));

        config.service_account_key_path = Some("/secrets/key.json".to_string());
        assert!(matches!(
            config.credentials(),
            BigQueryCredentials::KeyPath("/secrets/key.json")
        ));
    }
}
