use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{QuestionId, UserId};

/// Points awarded for a correct answer.
pub const CORRECT_POINTS: u32 = 10;

/// Points awarded for trying, even when the answer is wrong.
pub const INCORRECT_POINTS: u32 = 2;

/// Points an answer is worth under the fixed award policy.
#[must_use]
pub fn award_points(is_correct: bool) -> u32 {
    if is_correct {
        CORRECT_POINTS
    } else {
        INCORRECT_POINTS
    }
}

/// One user response to one question.
///
/// Append-only: created once per submitted answer and never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub attempted_at: DateTime<Utc>,
}

impl AttemptRecord {
    #[must_use]
    pub fn new(
        user_id: UserId,
        question_id: QuestionId,
        is_correct: bool,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            question_id,
            is_correct,
            attempted_at,
        }
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        award_points(self.is_correct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn award_policy() {
        assert_eq!(award_points(true), 10);
        assert_eq!(award_points(false), 2);
    }

    #[test]
    fn record_points_follow_correctness() {
        let rec = AttemptRecord::new(UserId::random(), QuestionId::random(), false, fixed_now());
        assert_eq!(rec.points(), INCORRECT_POINTS);
    }
}
