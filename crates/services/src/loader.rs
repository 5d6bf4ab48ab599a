use std::sync::Arc;

use rand::rng;
use rand::seq::SliceRandom;

use mastery_core::model::{Domain, Question};
use mastery_core::quiz::QuizSession;
use storage::repository::QuestionRepository;

use crate::config::DEFAULT_BATCH_SIZE;
use crate::context::SessionContext;
use crate::error::ServiceError;
use crate::guard::CallGuard;

/// Fetches question batches and turns them into quiz sessions.
#[derive(Clone)]
pub struct SessionLoader {
    questions: Arc<dyn QuestionRepository>,
    guard: CallGuard,
    batch_size: u32,
    shuffle: bool,
}

impl SessionLoader {
    #[must_use]
    pub fn new(questions: Arc<dyn QuestionRepository>, guard: CallGuard) -> Self {
        Self {
            questions,
            guard,
            batch_size: DEFAULT_BATCH_SIZE,
            shuffle: false,
        }
    }

    /// Clamped to `1..=10`; a quiz never holds more than ten questions.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.clamp(1, DEFAULT_BATCH_SIZE);
        self
    }

    /// Shuffle each fetched batch before handing it out.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    #[must_use]
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Loads up to one batch of questions.
    ///
    /// `filter` must name a domain (`"verbal"`, `"general_knowledge"`, ...);
    /// anything else loads from every domain. An empty batch is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::FetchFailed`, `Timeout` or `Cancelled` when the
    /// read does not complete. Nothing is retried.
    pub async fn load_questions(&self, filter: Option<&str>) -> Result<Vec<Question>, ServiceError> {
        let domain = Domain::from_filter(filter);
        if domain.is_none() && filter.is_some_and(|raw| !raw.trim().is_empty()) {
            tracing::debug!(filter = ?filter, "ignoring unknown domain filter");
        }
        self.load_domain(domain).await
    }

    /// Same as [`Self::load_questions`] with an already parsed domain.
    ///
    /// # Errors
    ///
    /// See [`Self::load_questions`].
    pub async fn load_domain(&self, domain: Option<Domain>) -> Result<Vec<Question>, ServiceError> {
        let mut questions = self
            .guard
            .run(self.questions.fetch_questions(domain, self.batch_size))
            .await
            .map_err(|e| e.into_fetch())?;

        // Adapters honor the limit; this keeps the batch bound regardless.
        questions.truncate(self.batch_size as usize);
        if self.shuffle {
            questions.as_mut_slice().shuffle(&mut rng());
        }

        tracing::debug!(
            domain = domain.map_or("all", Domain::as_str),
            count = questions.len(),
            "loaded questions"
        );
        Ok(questions)
    }

    /// Loads a batch and starts a quiz over it for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::ValidationFailed(QuizError::Empty)` when the
    /// store has no matching questions, plus the errors of
    /// [`Self::load_questions`].
    pub async fn start_quiz(
        &self,
        ctx: &SessionContext,
        filter: Option<&str>,
    ) -> Result<QuizSession, ServiceError> {
        let questions = self.load_questions(filter).await?;
        let session = QuizSession::new(ctx.user_id(), questions)?;
        tracing::info!(user = %ctx.user_id(), questions = session.len(), "quiz started");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mastery_core::model::{QuestionId, UserId};
    use mastery_core::quiz::QuizError;
    use storage::repository::InMemoryRepository;

    use super::*;

    fn question(domain: Domain) -> Question {
        Question::new(
            QuestionId::random(),
            "Q",
            ["a".into(), "b".into(), "c".into(), "d".into()],
            "A",
            "",
            domain,
            "",
        )
        .unwrap()
    }

    async fn loader_with(counts: &[(Domain, usize)]) -> SessionLoader {
        let repo = InMemoryRepository::new();
        for (domain, n) in counts {
            for _ in 0..*n {
                repo.upsert_question(&question(*domain)).await.unwrap();
            }
        }
        SessionLoader::new(Arc::new(repo), CallGuard::new(Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn batch_is_capped_at_ten() {
        let loader = loader_with(&[(Domain::Aptitude, 14)]).await;
        let batch = loader.load_questions(None).await.unwrap();
        assert_eq!(batch.len(), 10);
    }

    #[tokio::test]
    async fn oversized_batch_setting_is_clamped() {
        let loader = loader_with(&[(Domain::GeneralKnowledge, 30)])
            .await
            .with_batch_size(25);
        assert_eq!(loader.batch_size(), 10);
        assert_eq!(loader.load_questions(None).await.unwrap().len(), 10);

        let loader = loader.with_batch_size(0);
        assert_eq!(loader.batch_size(), 1);
    }

    #[tokio::test]
    async fn known_filter_narrows_domain() {
        let loader = loader_with(&[(Domain::Aptitude, 3), (Domain::Verbal, 2)]).await;
        let batch = loader.load_questions(Some("verbal")).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|q| q.domain() == Domain::Verbal));
    }

    #[tokio::test]
    async fn unknown_filter_loads_everything() {
        let loader = loader_with(&[(Domain::Aptitude, 3), (Domain::Verbal, 2)]).await;
        let batch = loader.load_questions(Some("astrology")).await.unwrap();
        assert_eq!(batch.len(), 5);
    }

    #[tokio::test]
    async fn shuffle_keeps_the_same_questions() {
        let loader = loader_with(&[(Domain::Technical, 6)])
            .await
            .with_shuffle(true);
        let mut ids: Vec<_> = loader
            .load_questions(None)
            .await
            .unwrap()
            .iter()
            .map(Question::id)
            .collect();
        ids.sort_by_key(|id| id.value());
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }

    #[tokio::test]
    async fn empty_store_cannot_start_a_quiz() {
        let loader = loader_with(&[]).await;
        assert!(loader.load_questions(None).await.unwrap().is_empty());

        let ctx = SessionContext::for_user(UserId::random());
        let err = loader.start_quiz(&ctx, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationFailed(QuizError::Empty)));
    }
}
