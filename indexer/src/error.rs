//! Error types and result definitions for indexer operations.
//!
//! An [`IndexerError`] is either a single failure or an aggregate of several. A single failure
//! carries an [`ErrorKind`], a static description, an optional dynamic detail and cause, and the
//! call site and backtrace of its creation. Startup aggregates the failures of both reference
//! tables into one error.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type for indexer operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

type Cause = Arc<dyn error::Error + Send + Sync>;

/// Categories of failures, grouped by the component that raises them.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connections
    SourceConnectionFailed,
    IndexConnectionFailed,
    StreamConnectionFailed,

    // Statements
    SourceQueryFailed,
    IndexQueryFailed,

    // Row data
    InvalidData,
    ConversionError,
    DeserializationError,
    SerializationError,

    ConfigError,

    ReferenceTableIncomplete,

    StreamIoError,

    IoError,

    Unknown,
}

impl ErrorKind {
    /// Returns `true` if the change-stream connection may be reopened after this error.
    pub fn is_connection_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::StreamConnectionFailed | ErrorKind::StreamIoError
        )
    }
}

#[derive(Debug, Clone)]
struct Failure {
    kind: ErrorKind,
    description: &'static str,
    detail: Option<Cow<'static, str>>,
    cause: Option<Cause>,
    created_at: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

#[derive(Debug, Clone)]
enum Inner {
    Failure(Box<Failure>),
    Aggregate {
        members: Vec<IndexerError>,
        created_at: &'static Location<'static>,
    },
}

/// Main error type of the indexer.
#[derive(Debug, Clone)]
pub struct IndexerError {
    inner: Inner,
}

impl IndexerError {
    #[track_caller]
    fn failure(
        kind: ErrorKind,
        description: &'static str,
        detail: Option<Cow<'static, str>>,
        cause: Option<Cause>,
    ) -> Self {
        Self {
            inner: Inner::Failure(Box::new(Failure {
                kind,
                description,
                detail,
                cause,
                created_at: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            })),
        }
    }

    fn as_failure(&self) -> Option<&Failure> {
        match &self.inner {
            Inner::Failure(failure) => Some(failure),
            Inner::Aggregate { .. } => None,
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// An aggregate reports the kind of its first member, or [`ErrorKind::Unknown`] when empty.
    pub fn kind(&self) -> ErrorKind {
        self.kinds().first().copied().unwrap_or(ErrorKind::Unknown)
    }

    /// Returns the kinds of every failure contained in this error, in order.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match &self.inner {
            Inner::Failure(failure) => vec![failure.kind],
            Inner::Aggregate { members, .. } => members.iter().flat_map(Self::kinds).collect(),
        }
    }

    pub fn description(&self) -> &str {
        self.as_failure()
            .map_or("multiple errors", |failure| failure.description)
    }

    /// Returns the dynamic detail. An aggregate returns the first detail among its members.
    pub fn detail(&self) -> Option<&str> {
        match &self.inner {
            Inner::Failure(failure) => failure.detail.as_deref(),
            Inner::Aggregate { members, .. } => members.iter().find_map(Self::detail),
        }
    }

    /// Returns the members of an aggregate, [`None`] for a single failure.
    pub fn errors(&self) -> Option<&[IndexerError]> {
        match &self.inner {
            Inner::Failure(_) => None,
            Inner::Aggregate { members, .. } => Some(members),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.as_failure().map(|failure| failure.backtrace.as_ref())
    }

    /// Where the error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match &self.inner {
            Inner::Failure(failure) => failure.created_at,
            Inner::Aggregate { created_at, .. } => *created_at,
        }
    }

    /// Attaches the underlying cause, exposed through [`error::Error::source`].
    ///
    /// Ignored for aggregates, whose source is their first member.
    pub fn with_source<E>(mut self, cause: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let Inner::Failure(failure) = &mut self.inner {
            failure.cause = Some(Arc::new(cause));
        }
        self
    }
}

/// Errors compare by kind, aggregates member by member.
impl PartialEq for IndexerError {
    fn eq(&self, other: &IndexerError) -> bool {
        match (&self.inner, &other.inner) {
            (Inner::Failure(a), Inner::Failure(b)) => a.kind == b.kind,
            (Inner::Aggregate { members: a, .. }, Inner::Aggregate { members: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for IndexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Failure(failure) => {
                write!(f, "[{:?}] {}", failure.kind, failure.description)?;
                match failure.detail.as_deref().map(str::trim) {
                    Some(detail) if !detail.is_empty() => write!(f, ": {detail}"),
                    _ => Ok(()),
                }
            }
            Inner::Aggregate { members, .. } => {
                let plural = if members.len() == 1 { "" } else { "s" };
                write!(f, "[Many] {} error{plural} aggregated", members.len())?;
                members
                    .iter()
                    .enumerate()
                    .try_for_each(|(index, member)| write!(f, "\n  {}. {member}", index + 1))
            }
        }
    }
}

impl error::Error for IndexerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.inner {
            Inner::Failure(failure) => failure
                .cause
                .as_deref()
                .map(|cause| cause as &(dyn error::Error + 'static)),
            Inner::Aggregate { members, .. } => members
                .first()
                .map(|member| member as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for IndexerError {
    #[track_caller]
    fn from((kind, description): (ErrorKind, &'static str)) -> IndexerError {
        IndexerError::failure(kind, description, None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for IndexerError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, description, detail): (ErrorKind, &'static str, D)) -> IndexerError {
        IndexerError::failure(kind, description, Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for IndexerError
where
    E: Into<IndexerError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> IndexerError {
        let created_at = Location::caller();
        let mut members: Vec<IndexerError> = errors.into_iter().map(Into::into).collect();

        if members.len() == 1
            && let Some(member) = members.pop()
        {
            return member;
        }

        IndexerError {
            inner: Inner::Aggregate {
                members,
                created_at,
            },
        }
    }
}

/// Builds a failure whose detail is the display output of `cause`.
#[track_caller]
fn caused_by<E>(kind: ErrorKind, description: &'static str, cause: E) -> IndexerError
where
    E: error::Error + Send + Sync + 'static,
{
    let detail = Cow::Owned(cause.to_string());
    IndexerError::failure(kind, description, Some(detail), Some(Arc::new(cause)))
}

impl From<std::io::Error> for IndexerError {
    #[track_caller]
    fn from(err: std::io::Error) -> IndexerError {
        caused_by(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for IndexerError {
    #[track_caller]
    fn from(err: serde_json::Error) -> IndexerError {
        if err.is_io() {
            caused_by(ErrorKind::IoError, "JSON I/O operation failed", err)
        } else {
            caused_by(
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
                err,
            )
        }
    }
}

/// Converts [`sqlx::Error`] assuming the failing query hit the source database.
///
/// The index store maps its own errors explicitly to the index kinds.
impl From<sqlx::Error> for IndexerError {
    #[track_caller]
    fn from(err: sqlx::Error) -> IndexerError {
        let kind = if matches!(
            err,
            sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::PoolClosed
                | sqlx::Error::PoolTimedOut
        ) {
            ErrorKind::SourceConnectionFailed
        } else {
            ErrorKind::SourceQueryFailed
        };

        caused_by(kind, "Database operation failed", err)
    }
}
