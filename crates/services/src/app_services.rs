use std::sync::Arc;

use mastery_core::model::UserId;
use storage::remote::RemoteConfig;
use storage::repository::{InMemoryRepository, SessionProvider, Storage};
use tokio_util::sync::CancellationToken;

use crate::Clock;
use crate::aggregation::AggregationView;
use crate::config::{Backend, ServiceConfig};
use crate::context::SessionContext;
use crate::error::{AppServicesError, ServiceError};
use crate::guard::CallGuard;
use crate::loader::SessionLoader;
use crate::recorder::{ProgressRecorder, RecorderHandle, RetryPolicy};
use crate::runner::QuizRunner;

/// Assembles the quiz services over one storage backend.
///
/// Quizzes must be started inside a tokio runtime: each runner spawns its
/// own progress recorder worker.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    guard: CallGuard,
    sessions: Arc<dyn SessionProvider>,
    loader: Arc<SessionLoader>,
    aggregation: Arc<AggregationView>,
    recorder: ProgressRecorder,
    retry: RetryPolicy,
}

impl AppServices {
    /// Wire services over an already built `Storage`.
    #[must_use]
    pub fn from_storage(storage: &Storage, config: &ServiceConfig, clock: Clock) -> Self {
        let guard = CallGuard::new(config.call_timeout);
        let loader = SessionLoader::new(Arc::clone(&storage.questions), guard.clone())
            .with_batch_size(config.batch_size)
            .with_shuffle(config.shuffle);
        let aggregation = AggregationView::new(
            Arc::clone(&storage.mastery),
            Arc::clone(&storage.profiles),
            Arc::clone(&storage.progress),
            guard.clone(),
        )
        .with_leaderboard_limit(config.leaderboard_limit);
        let recorder = ProgressRecorder::new(Arc::clone(&storage.progress), guard.clone());
        let retry = RetryPolicy {
            max_attempts: config.record_max_attempts,
            backoff: config.record_backoff,
        };

        Self {
            clock,
            guard,
            sessions: Arc::clone(&storage.sessions),
            loader: Arc::new(loader),
            aggregation: Arc::new(aggregation),
            recorder,
            retry,
        }
    }

    /// Services backed by the in-memory repository.
    #[must_use]
    pub fn in_memory(repo: InMemoryRepository, config: &ServiceConfig, clock: Clock) -> Self {
        Self::from_storage(&Storage::in_memory(repo), config, clock)
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if connecting or migrating fails.
    pub async fn new_sqlite(
        db_url: &str,
        session_user: Option<UserId>,
        config: &ServiceConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url, session_user).await?;
        Ok(Self::from_storage(&storage, config, clock))
    }

    /// Build services backed by the hosted REST API.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Storage` if the HTTP client cannot be built.
    pub fn new_remote(
        remote: RemoteConfig,
        config: &ServiceConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::remote(remote)?;
        Ok(Self::from_storage(&storage, config, clock))
    }

    /// Build services for whichever backend `backend` names.
    ///
    /// # Errors
    ///
    /// See [`Self::new_sqlite`] and [`Self::new_remote`].
    pub async fn connect(
        backend: Backend,
        config: &ServiceConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        match backend {
            Backend::Sqlite { db_url, user_id } => {
                Self::new_sqlite(&db_url, user_id, config, clock).await
            }
            Backend::Remote(remote) => Self::new_remote(remote, config, clock),
        }
    }

    /// Who is signed in.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::AuthRequired` when nobody is.
    pub async fn resolve_session(&self) -> Result<SessionContext, ServiceError> {
        SessionContext::resolve(self.sessions.as_ref(), &self.guard).await
    }

    /// Ends the session. Attempts still queued by a runner keep draining.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::FetchFailed`, `Timeout` or `Cancelled` if the
    /// provider call fails.
    pub async fn sign_out(&self) -> Result<(), ServiceError> {
        self.guard
            .run(self.sessions.sign_out())
            .await
            .map_err(|e| e.into_fetch())
    }

    /// Loads a batch and wraps it in a runner with its own recorder worker,
    /// so its outcome reports only this quiz's attempts.
    ///
    /// # Errors
    ///
    /// See [`SessionLoader::start_quiz`].
    pub async fn start_quiz(
        &self,
        ctx: &SessionContext,
        filter: Option<&str>,
    ) -> Result<QuizRunner, ServiceError> {
        let session = self.loader.start_quiz(ctx, filter).await?;
        Ok(QuizRunner::new(
            session,
            self.spawn_recorder(),
            self.clock,
        ))
    }

    /// Cancelling this token aborts every in-flight and future store call.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.guard.token()
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn loader(&self) -> Arc<SessionLoader> {
        Arc::clone(&self.loader)
    }

    #[must_use]
    pub fn aggregation(&self) -> Arc<AggregationView> {
        Arc::clone(&self.aggregation)
    }

    #[must_use]
    pub fn recorder(&self) -> ProgressRecorder {
        self.recorder.clone()
    }

    /// Starts a fresh recorder worker with the configured retry policy.
    #[must_use]
    pub fn spawn_recorder(&self) -> RecorderHandle {
        RecorderHandle::spawn(self.recorder.clone(), self.retry)
    }
}
