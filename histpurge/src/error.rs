use std::error;
use std::fmt;

/// Convenient result type for purge operations using [`PurgeError`] as the error type.
pub type PurgeResult<T> = Result<T, PurgeError>;

/// Main error type of the purge controller.
///
/// Every fatal condition unwinds to the purge session as a [`PurgeError`], which decides
/// whether the node state has to be restored and which exit status the process reports.
#[derive(Debug, Clone)]
pub struct PurgeError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
}

/// Categories of errors raised during a purge session.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Database Errors
    ConnectionError,
    QueryError,
    QueryTimeout,

    // Cluster Control Errors
    ControlError,
    ControlParseError,
    ControlTimeout,

    // Session Errors
    SignalInterrupt,
    ConfigError,

    // IO Errors
    IoError,
}

impl PurgeError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
        }
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &'static str {
        match self.repr {
            ErrorRepr::WithDescription(_, desc)
            | ErrorRepr::WithDescriptionAndDetail(_, desc, _) => desc,
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For database errors the detail includes the failing statement, for control errors
    /// the command that was sent to the coordinator.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::WithDescription(_, _) => None,
        }
    }
}

impl PartialEq for PurgeError {
    fn eq(&self, other: &PurgeError) -> bool {
        self.kind() == other.kind()
    }
}

impl fmt::Display for PurgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;

                Ok(())
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)?;

                Ok(())
            }
        }
    }
}

impl error::Error for PurgeError {}

/// Creates a [`PurgeError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for PurgeError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> PurgeError {
        PurgeError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

/// Creates a [`PurgeError`] from an error kind, static description, and dynamic detail.
impl From<(ErrorKind, &'static str, String)> for PurgeError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> PurgeError {
        PurgeError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

/// Converts [`std::io::Error`] to [`PurgeError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for PurgeError {
    fn from(err: std::io::Error) -> PurgeError {
        PurgeError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`tokio::time::error::Elapsed`] to [`PurgeError`] with [`ErrorKind::QueryTimeout`].
impl From<tokio::time::error::Elapsed> for PurgeError {
    fn from(err: tokio::time::error::Elapsed) -> PurgeError {
        PurgeError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::QueryTimeout,
                "Operation timed out",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`sqlx::Error`] to [`PurgeError`].
///
/// Transport and configuration failures map to [`ErrorKind::ConnectionError`], everything
/// the server reports about a statement maps to [`ErrorKind::QueryError`].
impl From<sqlx::Error> for PurgeError {
    fn from(err: sqlx::Error) -> PurgeError {
        let (kind, description) = match &err {
            sqlx::Error::Configuration(_)
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => {
                (ErrorKind::ConnectionError, "MySQL connection error")
            }
            sqlx::Error::Database(_) => (ErrorKind::QueryError, "MySQL statement failed"),
            sqlx::Error::RowNotFound => (ErrorKind::QueryError, "MySQL statement returned no row"),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => (
                ErrorKind::QueryError,
                "MySQL statement returned an unexpected shape",
            ),
            _ => (ErrorKind::QueryError, "MySQL error occurred"),
        };

        PurgeError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, purge_error};

    #[test]
    fn error_display_includes_detail() {
        let err = PurgeError::from((
            ErrorKind::QueryError,
            "MySQL statement failed",
            "Lock wait timeout exceeded; statement: DELETE FROM `tungsten`.`history`".to_string(),
        ));
        let display_str = format!("{err}");

        assert!(display_str.starts_with("QueryError: MySQL statement failed -> "));
        assert!(display_str.contains("DELETE FROM"));
    }

    #[test]
    fn error_display_without_detail() {
        let err = PurgeError::from((ErrorKind::SignalInterrupt, "Purge session interrupted"));

        assert_eq!(
            format!("{err}"),
            "SignalInterrupt: Purge session interrupted"
        );
        assert_eq!(err.detail(), None);
    }

    #[test]
    fn sqlx_errors_are_classified() {
        let err = PurgeError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::QueryError);

        let err = PurgeError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
    }

    #[tokio::test]
    async fn elapsed_timeouts_are_query_timeouts() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();

        assert_eq!(PurgeError::from(elapsed).kind(), ErrorKind::QueryTimeout);
    }

    #[test]
    fn macros_build_and_return_errors() {
        fn failing() -> PurgeResult<()> {
            bail!(
                ErrorKind::ControlError,
                "Cluster control command failed",
                "set policy manual"
            );
        }

        let err = failing().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ControlError);
        assert_eq!(err.detail(), Some("set policy manual"));

        let err = purge_error!(ErrorKind::ConfigError, "Invalid configuration");
        assert_eq!(err.description(), "Invalid configuration");
    }
}
