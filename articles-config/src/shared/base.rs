use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required identifier is empty.
    #[error("`{0}` must not be empty")]
    EmptyField(&'static str),
    /// A field has a value outside of its accepted range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue {
        field: &'static str,
        constraint: &'static str,
    },
    /// Both a service account key and a key path are configured.
    #[error(
        "Invalid destination config: only one of `service_account_key` or `service_account_key_path` may be set"
    )]
    AmbiguousCredentials,
}

/// Fails with [`ValidationError::EmptyField`] when `value` is blank.
pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }

    Ok(())
}
