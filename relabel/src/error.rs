//! Error type shared by every relabeling component.
//!
//! [`RelabelError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error, the call site and a backtrace. Errors raised by
//! several pages or workers are aggregated into a single value so that a run can report all of
//! them at once.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use config::shared::ValidationError;

/// Result type used throughout the crate.
pub type RelabelResult<T> = Result<T, RelabelError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Error raised while scanning, mutating or coordinating pages.
#[derive(Debug, Clone)]
pub struct RelabelError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Failures collected from several pages or workers.
    Many {
        errors: Vec<RelabelError>,
        location: &'static Location<'static>,
    },
}

/// Classification of relabeling failures.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration Errors
    ConfigError,
    InvalidPageSize,

    // Store Errors
    StoreConnectionFailed,
    StoreQueryFailed,
    StoreTransactionFailed,
    StoreIoError,
    StoreMigrationFailed,

    // Record Shape Errors
    RecordNotFound,
    MissingTag,
    MissingAttribute,

    // Scan Errors
    ScanFailed,

    // Pipeline & Worker Errors
    WorkerPanic,
    PipelineAborted,

    // IO & Deserialization Errors
    IoError,
    DeserializationError,

    Unknown,

    // Injected through failpoints to exercise the failure policies.
    #[cfg(feature = "failpoints")]
    WithNoRetry,
    #[cfg(feature = "failpoints")]
    WithTimedRetry,
}

impl ErrorKind {
    /// Returns `true` for failures that may succeed when the page is attempted again.
    ///
    /// Record shape errors are never transient: the same record fails the same way.
    pub fn is_transient(&self) -> bool {
        match self {
            ErrorKind::StoreConnectionFailed
            | ErrorKind::StoreQueryFailed
            | ErrorKind::StoreTransactionFailed
            | ErrorKind::StoreIoError => true,
            #[cfg(feature = "failpoints")]
            ErrorKind::WithTimedRetry => true,
            _ => false,
        }
    }
}

impl RelabelError {
    /// Returns the kind of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every kind contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|err| err.detail()),
        }
    }

    /// Returns `true` only when every contained error is transient.
    pub fn is_transient(&self) -> bool {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind.is_transient(),
            ErrorRepr::Many { ref errors, .. } => {
                !errors.is_empty() && errors.iter().all(|err| err.is_transient())
            }
        }
    }

    /// Attaches the error that caused this one. No-op on aggregates.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        RelabelError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for RelabelError {
    fn eq(&self, other: &RelabelError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for RelabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail:", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented(f, "Backtrace:", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, header: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {header}")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for RelabelError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for RelabelError {
    #[track_caller]
    fn from((kind, description): (ErrorKind, &'static str)) -> RelabelError {
        RelabelError::from_components(kind, Cow::Borrowed(description), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for RelabelError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, description, detail): (ErrorKind, &'static str, D)) -> RelabelError {
        RelabelError::from_components(kind, Cow::Borrowed(description), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for RelabelError
where
    E: Into<RelabelError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> RelabelError {
        let location = Location::caller();
        let mut errors: Vec<RelabelError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        RelabelError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<ValidationError> for RelabelError {
    #[track_caller]
    fn from(err: ValidationError) -> RelabelError {
        let (kind, description) = match err {
            ValidationError::InvalidPageSize(_) | ValidationError::PageSizeTooLarge(_) => {
                (ErrorKind::InvalidPageSize, "Invalid page size")
            }
            _ => (ErrorKind::ConfigError, "Invalid configuration"),
        };

        let detail = err.to_string();
        RelabelError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::io::Error> for RelabelError {
    #[track_caller]
    fn from(err: std::io::Error) -> RelabelError {
        let detail = err.to_string();
        RelabelError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_json::Error> for RelabelError {
    #[track_caller]
    fn from(err: serde_json::Error) -> RelabelError {
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
        RelabelError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// SQLSTATE class `40`, serialization failures and deadlocks.
const TRANSACTION_ROLLBACK_CLASS: &str = "40";

impl From<sqlx::Error> for RelabelError {
    #[track_caller]
    fn from(err: sqlx::Error) -> RelabelError {
        let (kind, description) = match &err {
            sqlx::Error::Database(db_err)
                if db_err
                    .code()
                    .is_some_and(|code| code.starts_with(TRANSACTION_ROLLBACK_CLASS)) =>
            {
                (
                    ErrorKind::StoreTransactionFailed,
                    "Store transaction was rolled back",
                )
            }
            sqlx::Error::Database(_) => (ErrorKind::StoreQueryFailed, "Store query failed"),
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                (ErrorKind::StoreIoError, "Store I/O operation failed")
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => (
                ErrorKind::StoreConnectionFailed,
                "Store connection unavailable",
            ),
            sqlx::Error::RowNotFound => (ErrorKind::RecordNotFound, "Record not found"),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => (
                ErrorKind::DeserializationError,
                "Store row decoding failed",
            ),
            sqlx::Error::Migrate(_) => (
                ErrorKind::StoreMigrationFailed,
                "Store migration failed",
            ),
            _ => (ErrorKind::StoreQueryFailed, "Store operation failed"),
        };

        let detail = err.to_string();
        RelabelError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<sqlx::migrate::MigrateError> for RelabelError {
    #[track_caller]
    fn from(err: sqlx::migrate::MigrateError) -> RelabelError {
        let detail = err.to_string();
        RelabelError::from_components(
            ErrorKind::StoreMigrationFailed,
            Cow::Borrowed("Store migration failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relabel_error;

    #[test]
    fn aggregating_a_single_error_returns_it_unchanged() {
        let error = RelabelError::from(vec![relabel_error!(
            ErrorKind::MissingTag,
            "Record has no tags"
        )]);

        assert_eq!(error.kind(), ErrorKind::MissingTag);
        assert_eq!(error.kinds(), vec![ErrorKind::MissingTag]);
    }

    #[test]
    fn aggregated_errors_flatten_their_kinds() {
        let error = RelabelError::from(vec![
            relabel_error!(ErrorKind::MissingTag, "Record has no tags"),
            relabel_error!(ErrorKind::WorkerPanic, "Worker panicked"),
        ]);

        assert_eq!(
            error.kinds(),
            vec![ErrorKind::MissingTag, ErrorKind::WorkerPanic]
        );
        assert!(error.to_string().starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn detail_is_rendered_in_display() {
        let error = relabel_error!(
            ErrorKind::MissingAttribute,
            "Record is missing an attribute",
            "record 7 has no `username`"
        );

        assert_eq!(error.detail(), Some("record 7 has no `username`"));
        assert!(error.to_string().contains("record 7 has no `username`"));
    }

    #[test]
    fn only_store_failures_are_transient() {
        assert!(ErrorKind::StoreConnectionFailed.is_transient());
        assert!(ErrorKind::StoreTransactionFailed.is_transient());
        assert!(!ErrorKind::MissingAttribute.is_transient());
        assert!(!ErrorKind::WorkerPanic.is_transient());

        let mixed = RelabelError::from(vec![
            relabel_error!(ErrorKind::StoreQueryFailed, "Store query failed"),
            relabel_error!(ErrorKind::MissingTag, "Record has no tags"),
        ]);
        assert!(!mixed.is_transient());
    }

    #[test]
    fn invalid_page_size_maps_to_its_own_kind() {
        let error = RelabelError::from(ValidationError::InvalidPageSize(0));
        assert_eq!(error.kind(), ErrorKind::InvalidPageSize);

        let error = RelabelError::from(ValidationError::ShutdownTimeoutZero);
        assert_eq!(error.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn pool_timeouts_are_connection_failures() {
        let error = RelabelError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(error.kind(), ErrorKind::StoreConnectionFailed);
        assert!(error.is_transient());
    }

    #[test]
    fn migration_errors_are_not_transient() {
        let error = RelabelError::from(sqlx::migrate::MigrateError::VersionMissing(3));
        assert_eq!(error.kind(), ErrorKind::StoreMigrationFailed);
        assert!(!error.is_transient());
    }
}
