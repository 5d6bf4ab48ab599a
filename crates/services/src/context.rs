use mastery_core::model::UserId;
use storage::repository::{AuthSession, SessionProvider};

use crate::error::ServiceError;
use crate::guard::CallGuard;

/// The signed-in user, resolved once and handed to each service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    session: AuthSession,
}

impl SessionContext {
    /// Asks the session provider who is signed in.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::AuthRequired` when nobody is signed in, or the
    /// guard's `FetchFailed`/`Timeout`/`Cancelled` if the check itself fails.
    pub async fn resolve(
        sessions: &dyn SessionProvider,
        guard: &CallGuard,
    ) -> Result<Self, ServiceError> {
        let session = guard
            .run(sessions.current_session())
            .await
            .map_err(|e| e.into_fetch())?;
        match session {
            Some(session) => {
                tracing::debug!(user = %session.user_id, "session resolved");
                Ok(Self { session })
            }
            None => Err(ServiceError::AuthRequired),
        }
    }

    /// Context for a known user, bypassing the provider.
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            session: AuthSession::new(user_id),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.session.user_id
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.session.email.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use storage::repository::InMemoryRepository;

    use super::*;

    #[tokio::test]
    async fn signed_out_requires_auth() {
        let repo = InMemoryRepository::new();
        let guard = CallGuard::new(Duration::from_secs(1));
        let err = SessionContext::resolve(&repo, &guard).await.unwrap_err();
        assert!(matches!(err, ServiceError::AuthRequired));
    }

    #[tokio::test]
    async fn signed_in_resolves_user() {
        let user = UserId::random();
        let repo = InMemoryRepository::signed_in(user);
        let guard = CallGuard::new(Duration::from_secs(1));
        let ctx = SessionContext::resolve(&repo, &guard).await.unwrap();
        assert_eq!(ctx.user_id(), user);
        assert_eq!(ctx.email(), None);
    }
}
