mod attempt;
mod domain;
mod ids;
mod mastery;
mod profile;
mod question;

pub use ids::{ParseIdError, QuestionId, UserId};

pub use attempt::{AttemptRecord, CORRECT_POINTS, INCORRECT_POINTS, award_points};
pub use domain::{Domain, DomainParseError};
pub use mastery::{DomainMastery, DomainMasteryRow, MasteryError, accuracy_percentage};
pub use profile::{
    ACHIEVEMENT_THRESHOLD, DAILY_GOAL, FALLBACK_DISPLAY_NAME, LeaderboardEntry, Profile,
    rank_by_points,
};
pub use question::{OptionLabel, OptionLabelError, Question, QuestionError};
