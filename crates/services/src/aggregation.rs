use std::sync::Arc;

use mastery_core::model::{
    ACHIEVEMENT_THRESHOLD, DAILY_GOAL, DomainMastery, LeaderboardEntry, Profile, rank_by_points,
};
use storage::repository::{
    MasteryRepository, ProfileRepository, ProgressRepository, StorageError,
};

use crate::config::DEFAULT_LEADERBOARD_LIMIT;
use crate::context::SessionContext;
use crate::error::ServiceError;
use crate::guard::CallGuard;

/// Profile summary shown on the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub profile: Profile,
    pub answered_count: u64,
    /// Unlocked at [`ACHIEVEMENT_THRESHOLD`] answered questions.
    pub achievement_unlocked: bool,
    pub daily_goal: u32,
    pub mastery: Vec<DomainMastery>,
}

impl Dashboard {
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.profile.display_name_or_default()
    }
}

/// Read-only views over the aggregates the store maintains.
#[derive(Clone)]
pub struct AggregationView {
    mastery: Arc<dyn MasteryRepository>,
    profiles: Arc<dyn ProfileRepository>,
    progress: Arc<dyn ProgressRepository>,
    guard: CallGuard,
    leaderboard_limit: u32,
}

impl AggregationView {
    #[must_use]
    pub fn new(
        mastery: Arc<dyn MasteryRepository>,
        profiles: Arc<dyn ProfileRepository>,
        progress: Arc<dyn ProgressRepository>,
        guard: CallGuard,
    ) -> Self {
        Self {
            mastery,
            profiles,
            progress,
            guard,
            leaderboard_limit: DEFAULT_LEADERBOARD_LIMIT,
        }
    }

    #[must_use]
    pub fn with_leaderboard_limit(mut self, limit: u32) -> Self {
        self.leaderboard_limit = limit;
        self
    }

    /// Per-domain mastery for the signed-in user; empty before any attempt.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::FetchFailed`, `Timeout` or `Cancelled`.
    pub async fn load_mastery(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<DomainMastery>, ServiceError> {
        let rows = self
            .guard
            .run(self.mastery.mastery_for_user(ctx.user_id()))
            .await
            .map_err(|e| e.into_fetch())?;
        tracing::debug!(user = %ctx.user_id(), domains = rows.len(), "loaded mastery");
        Ok(rows)
    }

    /// Top learners by points, highest first. `None` uses the configured
    /// limit (50 by default).
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::FetchFailed`, `Timeout` or `Cancelled`.
    pub async fn load_leaderboard(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        let limit = limit.unwrap_or(self.leaderboard_limit);
        let mut entries = self
            .guard
            .run(self.profiles.leaderboard(limit))
            .await
            .map_err(|e| e.into_fetch())?;
        // Adapters sort already; re-rank so the order holds for any backend.
        rank_by_points(&mut entries);
        entries.truncate(limit as usize);
        Ok(entries)
    }

    /// Profile, answered count and achievement state for the dashboard.
    ///
    /// A user without a profile row yet gets an empty one.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::FetchFailed`, `Timeout` or `Cancelled`.
    pub async fn load_dashboard(&self, ctx: &SessionContext) -> Result<Dashboard, ServiceError> {
        let user_id = ctx.user_id();
        let profile = match self.guard.run(self.profiles.get_profile(user_id)).await {
            Ok(profile) => profile,
            Err(crate::guard::CallError::Store(StorageError::NotFound)) => {
                Profile::new(user_id, None)
            }
            Err(e) => return Err(e.into_fetch()),
        };
        let answered_count = self
            .guard
            .run(self.progress.count_attempts(user_id))
            .await
            .map_err(|e| e.into_fetch())?;
        let mastery = self.load_mastery(ctx).await?;

        Ok(Dashboard {
            profile,
            answered_count,
            achievement_unlocked: answered_count >= ACHIEVEMENT_THRESHOLD,
            daily_goal: DAILY_GOAL,
            mastery,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mastery_core::model::{AttemptRecord, Domain, Question, QuestionId, UserId};
    use mastery_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, QuestionRepository};

    use super::*;

    fn view(repo: &InMemoryRepository) -> AggregationView {
        AggregationView::new(
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            CallGuard::new(Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn new_user_gets_an_empty_dashboard() {
        let repo = InMemoryRepository::new();
        let ctx = SessionContext::for_user(UserId::random());
        let dash = view(&repo).load_dashboard(&ctx).await.unwrap();
        assert_eq!(dash.answered_count, 0);
        assert!(!dash.achievement_unlocked);
        assert_eq!(dash.daily_goal, 10);
        assert_eq!(dash.display_name(), "Learner");
        assert!(dash.mastery.is_empty());
    }

    #[tokio::test]
    async fn achievement_unlocks_at_one_hundred_answers() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        let q = Question::new(
            QuestionId::random(),
            "Q",
            ["a".into(), "b".into(), "c".into(), "d".into()],
            "A",
            "",
            Domain::GeneralKnowledge,
            "",
        )
        .unwrap();
        repo.upsert_question(&q).await.unwrap();
        for i in 0..100 {
            let rec = AttemptRecord::new(user, q.id(), i % 2 == 0, fixed_now());
            repo.append_attempt(&rec).await.unwrap();
        }

        let ctx = SessionContext::for_user(user);
        let dash = view(&repo).load_dashboard(&ctx).await.unwrap();
        assert_eq!(dash.answered_count, 100);
        assert!(dash.achievement_unlocked);
        assert_eq!(dash.profile.total_points, 50 * 10 + 50 * 2);
        assert_eq!(dash.mastery[0].accuracy_rounded(), 50);
    }

    #[tokio::test]
    async fn leaderboard_respects_explicit_limit() {
        let repo = InMemoryRepository::new();
        for points in [3_u64, 30, 300] {
            let mut p = Profile::new(UserId::random(), None);
            p.total_points = points;
            repo.upsert_profile(&p).await.unwrap();
        }
        let board = view(&repo).load_leaderboard(Some(2)).await.unwrap();
        let points: Vec<_> = board.iter().map(|e| e.total_points).collect();
        assert_eq!(points, [300, 30]);
    }
}
