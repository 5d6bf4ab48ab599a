//! Quiz session state machine and its errors.

mod session;

use thiserror::Error;

use crate::model::OptionLabelError;

pub use session::{AnswerFeedback, Advance, QuizProgress, QuizSession, QuizState, Tally};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("no questions available for this quiz")]
    Empty,

    #[error("no answer selected")]
    NoAnswerSelected,

    #[error(transparent)]
    InvalidOption(#[from] OptionLabelError),

    #[error("cannot {action} while quiz is {state}")]
    InvalidTransition {
        action: &'static str,
        state: QuizState,
    },
}
