//! Timeout and cancellation around backing-store calls.

use std::future::Future;
use std::time::Duration;

use storage::repository::StorageError;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;

/// Why a guarded call did not produce a value.
#[derive(Debug)]
pub(crate) enum CallError {
    Store(StorageError),
    Timeout(Duration),
    Cancelled,
}

impl CallError {
    /// A read failed.
    pub(crate) fn into_fetch(self) -> ServiceError {
        match self {
            CallError::Store(e) => ServiceError::FetchFailed(e),
            CallError::Timeout(d) => ServiceError::Timeout(d),
            CallError::Cancelled => ServiceError::Cancelled,
        }
    }

    /// A write failed.
    pub(crate) fn into_persist(self) -> ServiceError {
        match self {
            CallError::Store(e) => ServiceError::PersistenceFailed(e),
            CallError::Timeout(d) => ServiceError::Timeout(d),
            CallError::Cancelled => ServiceError::Cancelled,
        }
    }
}

/// Applies one timeout and one cancellation token to every store call made
/// through it. Clones share the token.
#[derive(Debug, Clone)]
pub struct CallGuard {
    timeout: Duration,
    token: CancellationToken,
}

impl CallGuard {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            token: CancellationToken::new(),
        }
    }

    /// Same timeout, driven by `token` instead.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels every in-flight and future call made through this guard.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) async fn run<T, F>(&self, call: F) -> Result<T, CallError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        if self.token.is_cancelled() {
            return Err(CallError::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(CallError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(inner) => inner.map_err(CallError::Store),
                Err(_) => Err(CallError::Timeout(self.timeout)),
            },
        }
    }
}
