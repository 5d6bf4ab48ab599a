use async_trait::async_trait;
use mastery_core::model::{
    AttemptRecord, Domain, DomainMastery, LeaderboardEntry, Profile, Question, QuestionId, UserId,
    award_points, rank_by_points,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("not authorized")]
    Unauthorized,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backing store returned status {status}: {body}")]
    Http { status: u16, body: String },
}

/// The authenticated user as reported by the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: UserId,
    pub email: Option<String>,
}

impl AuthSession {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
        }
    }
}

/// Source of the current authentication session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Returns the active session, or `None` when nobody is signed in.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be checked.
    async fn current_session(&self) -> Result<Option<AuthSession>, StorageError>;

    /// Ends the active session. Signing out twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store rejects the request.
    async fn sign_out(&self) -> Result<(), StorageError>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Fetch at most `limit` questions, optionally restricted to one domain.
    ///
    /// Order is whatever the store returns.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the read fails or a row does not validate.
    async fn fetch_questions(
        &self,
        domain: Option<Domain>,
        limit: u32,
    ) -> Result<Vec<Question>, StorageError>;

    /// Insert or replace a question. Used for seeding.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;
}

/// Append-only attempt history.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Append one attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the question does not exist, or
    /// other storage errors.
    async fn append_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError>;

    /// Number of attempts ever recorded for a user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the count cannot be read.
    async fn count_attempts(&self, user_id: UserId) -> Result<u64, StorageError>;
}

/// Read side of the per-domain aggregates the store maintains.
#[async_trait]
pub trait MasteryRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the read fails.
    async fn mastery_for_user(&self, user_id: UserId) -> Result<Vec<DomainMastery>, StorageError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user has no profile.
    async fn get_profile(&self, user_id: UserId) -> Result<Profile, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be stored.
    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StorageError>;

    /// Top `limit` profiles by total points, highest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the read fails.
    async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    questions: Vec<Question>,
    attempts: Vec<AttemptRecord>,
    mastery: HashMap<(UserId, Domain), DomainMastery>,
    profiles: HashMap<UserId, Profile>,
    session: Option<AuthSession>,
}

/// In-memory repository for tests and prototyping.
///
/// Mirrors the server-side bookkeeping of the hosted store: appending an
/// attempt updates the user's domain mastery and adds the award to the
/// profile's points.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository with `user_id` already signed in.
    #[must_use]
    pub fn signed_in(user_id: UserId) -> Self {
        let repo = Self::new();
        if let Ok(mut state) = repo.state.lock() {
            state.session = Some(AuthSession::new(user_id));
        }
        repo
    }

    /// Replace the current session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn set_session(&self, session: Option<AuthSession>) -> Result<(), StorageError> {
        self.lock()?.session = session;
        Ok(())
    }

    /// Snapshot of every attempt appended so far, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn attempts(&self) -> Result<Vec<AttemptRecord>, StorageError> {
        Ok(self.lock()?.attempts.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn question_domain(questions: &[Question], id: QuestionId) -> Option<Domain> {
    questions.iter().find(|q| q.id() == id).map(Question::domain)
}

#[async_trait]
impl SessionProvider for InMemoryRepository {
    async fn current_session(&self) -> Result<Option<AuthSession>, StorageError> {
        Ok(self.lock()?.session.clone())
    }

    async fn sign_out(&self) -> Result<(), StorageError> {
        self.lock()?.session = None;
        Ok(())
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn fetch_questions(
        &self,
        domain: Option<Domain>,
        limit: u32,
    ) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard
            .questions
            .iter()
            .filter(|q| domain.is_none_or(|d| q.domain() == d))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        match guard.questions.iter().position(|q| q.id() == question.id()) {
            Some(idx) => guard.questions[idx] = question.clone(),
            None => guard.questions.push(question.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn append_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let domain =
            question_domain(&guard.questions, attempt.question_id).ok_or(StorageError::NotFound)?;

        guard.attempts.push(attempt.clone());
        guard
            .mastery
            .entry((attempt.user_id, domain))
            .or_insert_with(|| DomainMastery::empty(attempt.user_id, domain))
            .record(attempt.is_correct);
        let profile = guard
            .profiles
            .entry(attempt.user_id)
            .or_insert_with(|| Profile::new(attempt.user_id, None));
        profile.total_points = profile
            .total_points
            .saturating_add(u64::from(award_points(attempt.is_correct)));
        Ok(())
    }

    async fn count_attempts(&self, user_id: UserId) -> Result<u64, StorageError> {
        let guard = self.lock()?;
        let count = guard.attempts.iter().filter(|a| a.user_id == user_id).count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl MasteryRepository for InMemoryRepository {
    async fn mastery_for_user(&self, user_id: UserId) -> Result<Vec<DomainMastery>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<_> = guard
            .mastery
            .values()
            .filter(|m| m.user_id() == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(DomainMastery::domain);
        Ok(rows)
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn get_profile(&self, user_id: UserId) -> Result<Profile, StorageError> {
        let guard = self.lock()?;
        guard.profiles.get(&user_id).cloned().ok_or(StorageError::NotFound)
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, StorageError> {
        let guard = self.lock()?;
        let mut entries: Vec<_> = guard.profiles.values().map(LeaderboardEntry::from).collect();
        rank_by_points(&mut entries);
        entries.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(entries)
    }
}

/// Session provider for local backends: whoever was configured at startup
/// stays signed in until `sign_out`.
#[derive(Debug, Default)]
pub struct StaticSessionProvider {
    session: Mutex<Option<AuthSession>>,
}

impl StaticSessionProvider {
    #[must_use]
    pub fn new(session: Option<AuthSession>) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn current_session(&self) -> Result<Option<AuthSession>, StorageError> {
        let guard = self
            .session
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn sign_out(&self) -> Result<(), StorageError> {
        let mut guard = self
            .session
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionProvider>,
    pub questions: Arc<dyn QuestionRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub mastery: Arc<dyn MasteryRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
}

impl Storage {
    /// Every port served by one shared in-memory repository.
    #[must_use]
    pub fn in_memory(repo: InMemoryRepository) -> Self {
        Self {
            sessions: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            mastery: Arc::new(repo.clone()),
            profiles: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mastery_core::time::fixed_now;

    fn question(domain: Domain, correct: &str) -> Question {
        Question::new(
            QuestionId::random(),
            "Q",
            ["a".into(), "b".into(), "c".into(), "d".into()],
            correct,
            "",
            domain,
            "topic",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_respects_filter_and_limit() {
        let repo = InMemoryRepository::new();
        for _ in 0..4 {
            repo.upsert_question(&question(Domain::Aptitude, "A")).await.unwrap();
            repo.upsert_question(&question(Domain::Verbal, "A")).await.unwrap();
        }

        let all = repo.fetch_questions(None, 10).await.unwrap();
        assert_eq!(all.len(), 8);

        let verbal = repo.fetch_questions(Some(Domain::Verbal), 3).await.unwrap();
        assert_eq!(verbal.len(), 3);
        assert!(verbal.iter().all(|q| q.domain() == Domain::Verbal));
    }

    #[tokio::test]
    async fn append_updates_mastery_and_points() {
        let user = UserId::random();
        let repo = InMemoryRepository::signed_in(user);
        let q = question(Domain::Reasoning, "C");
        repo.upsert_question(&q).await.unwrap();

        for correct in [true, false, true] {
            let rec = AttemptRecord::new(user, q.id(), correct, fixed_now());
            repo.append_attempt(&rec).await.unwrap();
        }

        let mastery = repo.mastery_for_user(user).await.unwrap();
        assert_eq!(mastery.len(), 1);
        assert_eq!(mastery[0].total_attempted(), 3);
        assert_eq!(mastery[0].total_correct(), 2);

        let profile = repo.get_profile(user).await.unwrap();
        assert_eq!(profile.total_points, 22);
        assert_eq!(repo.count_attempts(user).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn append_for_unknown_question_fails() {
        let repo = InMemoryRepository::new();
        let rec = AttemptRecord::new(UserId::random(), QuestionId::random(), true, fixed_now());
        let err = repo.append_attempt(&rec).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
        assert!(repo.attempts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sign_out_clears_session() {
        let repo = InMemoryRepository::signed_in(UserId::random());
        assert!(repo.current_session().await.unwrap().is_some());
        repo.sign_out().await.unwrap();
        repo.sign_out().await.unwrap();
        assert!(repo.current_session().await.unwrap().is_none());
    }
}
