//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use mastery_core::quiz::QuizError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors surfaced to callers of the quiz services.
///
/// None of these is fatal to the process; a caller can always retry the
/// action or fall back to an empty view.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("sign in required")]
    AuthRequired,

    #[error("failed to load data: {0}")]
    FetchFailed(#[source] StorageError),

    #[error(transparent)]
    ValidationFailed(#[from] QuizError),

    #[error("failed to save attempt: {0}")]
    PersistenceFailed(#[source] StorageError),

    #[error("backing store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("progress recorder is not running")]
    RecorderStopped,
}

impl ServiceError {
    /// Whether retrying the same call might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Timeout(_) => true,
            ServiceError::FetchFailed(e) | ServiceError::PersistenceFailed(e) => {
                matches!(e, StorageError::Connection(_) | StorageError::Http { .. })
            }
            _ => false,
        }
    }

    /// Whether a failed write can be sent again without risking a duplicate.
    ///
    /// A timed-out insert may still have committed, so it is never resent.
    #[must_use]
    pub fn is_safe_to_resend(&self) -> bool {
        !matches!(self, ServiceError::Timeout(_)) && self.is_transient()
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("remote backend selected but QUIZ_REMOTE_URL / QUIZ_REMOTE_API_KEY are not set")]
    RemoteNotConfigured,
    #[error("unknown backend: {0} (expected sqlite or remote)")]
    UnknownBackend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_transient_but_not_resendable() {
        let err = ServiceError::Timeout(Duration::from_secs(1));
        assert!(err.is_transient());
        assert!(!err.is_safe_to_resend());
    }

    #[test]
    fn only_connection_failures_are_resendable() {
        assert!(
            ServiceError::PersistenceFailed(StorageError::Connection("reset".into()))
                .is_safe_to_resend()
        );
        assert!(!ServiceError::PersistenceFailed(StorageError::NotFound).is_safe_to_resend());
        assert!(!ServiceError::PersistenceFailed(StorageError::Unauthorized).is_safe_to_resend());
        assert!(!ServiceError::Cancelled.is_safe_to_resend());
    }
}
