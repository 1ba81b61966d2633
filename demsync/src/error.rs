//! Error types and result definitions for synchronization operations.
//!
//! Provides an error system with classification and captured callsite
//! metadata. [`SyncError`] pairs a machine-checkable [`ErrorKind`] with a
//! static description and optional dynamic detail, so callers can branch on
//! the kind (e.g. constraint violations routed to the failure log) while
//! operators still get the full story in logs.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Specific categories of errors that can occur during synchronization.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection errors.
    ConnectionFailed,
    AuthenticationError,
    SubscriptionLost,

    // Query and execution errors.
    QueryFailed,
    ConstraintViolation,

    // Data and mapping errors.
    ConversionError,
    MappingFailed,
    ValidationError,

    // IO and serialization errors.
    IoError,
    SerializationError,
    DeserializationError,

    // Configuration and state errors.
    ConfigError,
    InvalidState,

    // Unknown / uncategorized.
    Unknown,
}

/// Detailed payload stored inside [`SyncError`].
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

/// Main error type for synchronization operations.
#[derive(Debug, Clone)]
pub struct SyncError {
    payload: ErrorPayload,
}

impl SyncError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches an originating [`error::Error`] and returns the modified
    /// instance. The stored source is preserved across clones and exposed via
    /// [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    /// Creates a [`SyncError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SyncError {
            payload: ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
            },
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = self.payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}",
            self.payload.kind,
            self.payload.description,
            location.file(),
            location.line(),
        )?;

        if let Some(detail) = self.payload.detail.as_deref() {
            write!(f, " ({detail})")?;
        }

        Ok(())
    }
}

impl error::Error for SyncError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Creates a [`SyncError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for SyncError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`SyncError`] from an error kind, static description, and
/// dynamic detail.
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

/// Converts [`serde_json::Error`] to [`SyncError`] with the appropriate kind.
impl From<serde_json::Error> for SyncError {
    #[track_caller]
    fn from(err: serde_json::Error) -> SyncError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            _ => (
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

/// Converts [`std::num::ParseIntError`] to [`SyncError`] with
/// [`ErrorKind::ConversionError`].
impl From<std::num::ParseIntError> for SyncError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Integer parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`chrono::ParseError`] to [`SyncError`] with
/// [`ErrorKind::ConversionError`].
impl From<chrono::ParseError> for SyncError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Datetime parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`sqlx::Error`] to [`SyncError`] with the appropriate kind.
///
/// Database errors are classified by SQLSTATE class so the apply engine can
/// intercept constraint violations (class 23) and route them to the failure
/// log, while connection-class failures stay retryable.
impl From<sqlx::Error> for SyncError {
    #[track_caller]
    fn from(err: sqlx::Error) -> SyncError {
        let (kind, description) = match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(code) if code.starts_with("23") => (
                    ErrorKind::ConstraintViolation,
                    "Postgres constraint violation",
                ),
                Some(code) if code.starts_with("08") => {
                    (ErrorKind::ConnectionFailed, "Postgres connection failed")
                }
                Some(code) if code.starts_with("28") => (
                    ErrorKind::AuthenticationError,
                    "Postgres authentication failed",
                ),
                Some(code) if code.starts_with("22") => {
                    (ErrorKind::ConversionError, "Postgres data conversion failed")
                }
                Some(code) if code.starts_with("42") => {
                    (ErrorKind::QueryFailed, "Postgres syntax or access error")
                }
                _ => (ErrorKind::QueryFailed, "Postgres query failed"),
            },
            sqlx::Error::Io(_) => (ErrorKind::IoError, "Postgres I/O error"),
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                (ErrorKind::ConnectionFailed, "Postgres pool unavailable")
            }
            _ => (ErrorKind::QueryFailed, "Database operation failed"),
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

/// Converts [`tokio_postgres::Error`] to [`SyncError`] with the appropriate
/// kind.
///
/// Used by the notification listener; an error without a SQLSTATE means the
/// connection itself went away, which is the retryable case.
impl From<tokio_postgres::Error> for SyncError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> SyncError {
        let (kind, description) = match err.code() {
            Some(sqlstate) => match sqlstate.code() {
                code if code.starts_with("23") => (
                    ErrorKind::ConstraintViolation,
                    "Postgres constraint violation",
                ),
                code if code.starts_with("08") => {
                    (ErrorKind::ConnectionFailed, "Postgres connection failed")
                }
                code if code.starts_with("28") => (
                    ErrorKind::AuthenticationError,
                    "Postgres authentication failed",
                ),
                _ => (ErrorKind::QueryFailed, "Postgres error"),
            },
            None => (ErrorKind::ConnectionFailed, "Postgres connection failed"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_error;

    #[test]
    fn kind_and_detail_are_preserved() {
        let err = sync_error!(
            ErrorKind::ValidationError,
            "invalid assignment keys",
            "demanda_id must be greater than 0"
        );

        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(err.detail(), Some("demanda_id must be greater than 0"));
    }

    #[test]
    fn display_includes_kind_description_and_detail() {
        let err = sync_error!(ErrorKind::QueryFailed, "query failed", "boom");
        let rendered = err.to_string();

        assert!(rendered.contains("QueryFailed"));
        assert!(rendered.contains("query failed"));
        assert!(rendered.contains("boom"));
    }

    #[test]
    fn source_error_is_exposed() {
        let io_err = std::io::Error::other("disk on fire");
        let err: SyncError = io_err.into();

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(std::error::Error::source(&err).is_some());
    }
}
