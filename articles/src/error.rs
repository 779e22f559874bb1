//! Error types and result definitions for article sync operations.
//!
//! [`SyncError`] carries an [`ErrorKind`] used to route failures (no data, transport, load,
//! merge, cleanup), a static description, optional dynamic detail, an optional source error
//! and the callsite where the error was created.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for sync operations using [`SyncError`] as the error type.
pub type SyncResult<T> = Result<T, SyncError>;

/// Main error type for sync operations.
///
/// Cloning is cheap: the source error is stored behind an [`Arc`] so the same failure can be
/// logged at the stage where it happened and still returned to the caller.
#[derive(Debug, Clone)]
pub struct SyncError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

/// Categories of errors that can occur while harvesting and reconciling articles.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // No data
    NoSnapshotFound,
    NoData,

    // Source (blob storage) errors
    SourceIoError,
    SourceObjectMissing,

    // Reconciliation stages
    StagingCreateFailed,
    LoadFailed,
    MergeFailed,
    CleanupFailed,

    // Destination (table store) errors
    DestinationQueryFailed,
    DestinationIoError,
    DestinationTableMissing,
    DestinationError,

    // Data & serialization
    InvalidData,
    SerializationError,
    DeserializationError,

    // Configuration, security & IO
    ConfigError,
    AuthenticationError,
    IoError,

    Unknown,
}

impl SyncError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Returns `true` when the error means there was nothing to reconcile.
    ///
    /// These errors are reported to callers as a "no data" outcome rather than as a
    /// processing failure.
    pub fn is_no_data(&self) -> bool {
        matches!(self.kind, ErrorKind::NoSnapshotFound | ErrorKind::NoData)
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Re-labels this error with a new kind and description, keeping the original as source.
    ///
    /// Used at stage boundaries so that, for example, a query failure raised by the table
    /// store while loading rows surfaces as [`ErrorKind::LoadFailed`].
    #[track_caller]
    pub fn in_stage(self, kind: ErrorKind, description: &'static str) -> SyncError {
        let detail = self.detail.clone().unwrap_or_else(|| self.description.clone());
        SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(detail),
            Some(Arc::new(self)),
        )
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SyncError {
            kind,
            description,
            detail,
            source,
            location: Location::caller(),
        }
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &SyncError) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        if let Some(detail) = self.detail.as_deref() {
            if detail.trim().is_empty() {
                write!(f, "\n  Detail: <empty>")?;
            } else {
                write!(f, "\n  Detail:")?;
                for line in detail.lines() {
                    write!(f, "\n    {line}")?;
                }
            }
        }

        Ok(())
    }
}

impl error::Error for SyncError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

/// Creates a [`SyncError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for SyncError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`SyncError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for SyncError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`std::io::Error`] to [`SyncError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for SyncError {
    #[track_caller]
    fn from(err: std::io::Error) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`serde_json::Error`] to [`SyncError`] with the appropriate error kind.
impl From<serde_json::Error> for SyncError {
    #[track_caller]
    fn from(err: serde_json::Error) -> SyncError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
