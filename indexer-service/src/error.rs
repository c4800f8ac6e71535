use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt::{self, Write};
use std::iter;

use indexer::error::IndexerError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure of the indexer binary.
///
/// Pipeline failures keep their [`IndexerError`]. Setup failures of the binary carry the
/// backtrace of where they were raised.
#[derive(Debug)]
pub enum ServiceError {
    Indexer(IndexerError),
    /// Configuration loading or validation, or telemetry setup.
    Setup {
        cause: Box<dyn Error + Send + Sync>,
        backtrace: Backtrace,
    },
    Io {
        cause: std::io::Error,
        backtrace: Backtrace,
    },
}

impl ServiceError {
    pub fn config<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        ServiceError::Setup {
            cause: Box::new(err),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ServiceError::Indexer(_) => "indexer error",
            ServiceError::Setup { .. } => "configuration error",
            ServiceError::Io { .. } => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        let backtrace = match self {
            ServiceError::Indexer(err) => err.backtrace()?,
            ServiceError::Setup { backtrace, .. } | ServiceError::Io { backtrace, .. } => backtrace,
        };

        (backtrace.status() == BacktraceStatus::Captured).then_some(backtrace)
    }

    /// Multi-line report written to stderr when the binary exits with an error.
    ///
    /// The backtrace is included only when one was captured, that is when `RUST_BACKTRACE` or
    /// `RUST_LIB_BACKTRACE` enables it.
    pub fn render_report(&self) -> String {
        let mut report = format!("indexer failed\ncategory: {}\nerror: {self}\n", self.category());

        // An aggregate already prints each member.
        let aggregated = matches!(self, ServiceError::Indexer(err) if err.errors().is_some());
        if !aggregated {
            let causes = iter::successors(self.source(), |&cause| cause.source());
            for (position, cause) in causes.enumerate() {
                let _ = writeln!(report, "cause {}: {cause}", position + 1);
            }
        }

        if let Some(backtrace) = self.backtrace() {
            let _ = write!(report, "backtrace:\n{backtrace}");
            if !report.ends_with('\n') {
                report.push('\n');
            }
        }

        report
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Indexer(err) => err.fmt(f),
            ServiceError::Setup { cause, .. } => write!(f, "configuration error: {cause}"),
            ServiceError::Io { cause, .. } => write!(f, "i/o error: {cause}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServiceError::Indexer(err) => err.source(),
            ServiceError::Setup { cause, .. } => Some(cause.as_ref()),
            ServiceError::Io { cause, .. } => Some(cause),
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(cause: std::io::Error) -> Self {
        ServiceError::Io {
            cause,
            backtrace: Backtrace::capture(),
        }
    }
}

impl From<IndexerError> for ServiceError {
    fn from(err: IndexerError) -> Self {
        ServiceError::Indexer(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer::error::ErrorKind;

    #[test]
    fn report_walks_the_cause_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "base.yaml missing");

        let report = ServiceError::from(io).render_report();

        assert!(report.starts_with("indexer failed\n"));
        assert!(report.contains("category: i/o error\n"));
        assert!(report.contains("cause 1: base.yaml missing\n"));
    }

    #[derive(Debug)]
    struct ReadFailed(std::io::Error);

    impl fmt::Display for ReadFailed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("cannot read configuration")
        }
    }

    impl Error for ReadFailed {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn report_numbers_nested_causes() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied");

        let report = ServiceError::config(ReadFailed(io)).render_report();

        assert!(report.contains("category: configuration error\n"));
        assert!(report.contains("cause 1: cannot read configuration\n"));
        assert!(report.contains("cause 2: permission denied\n"));
    }

    #[test]
    fn aggregate_is_reported_once() {
        let err = ServiceError::from(IndexerError::from(vec![
            IndexerError::from((ErrorKind::ReferenceTableIncomplete, "Groups incomplete")),
            IndexerError::from((ErrorKind::ReferenceTableIncomplete, "Sections incomplete")),
        ]));

        let report = err.render_report();

        assert!(report.contains("category: indexer error\n"));
        assert!(report.contains("2 errors aggregated"));
        assert!(!report.contains("cause 1:"));
    }
}
