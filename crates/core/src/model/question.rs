use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::domain::Domain;
use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("option {0} cannot be empty")]
    EmptyOption(OptionLabel),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("not a selectable option: {0:?} (expected A, B, C or D)")]
pub struct OptionLabelError(pub String);

//
// ─── OPTION LABEL ──────────────────────────────────────────────────────────────
//

/// One of the four answer slots of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionLabel {
    A,
    B,
    C,
    D,
}

impl OptionLabel {
    pub const ALL: [OptionLabel; 4] = [OptionLabel::A, OptionLabel::B, OptionLabel::C, OptionLabel::D];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OptionLabel::A => "A",
            OptionLabel::B => "B",
            OptionLabel::C => "C",
            OptionLabel::D => "D",
        }
    }

    fn index(self) -> usize {
        match self {
            OptionLabel::A => 0,
            OptionLabel::B => 1,
            OptionLabel::C => 2,
            OptionLabel::D => 3,
        }
    }
}

impl fmt::Display for OptionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-sensitive: only the single uppercase letters are selectable.
impl FromStr for OptionLabel {
    type Err = OptionLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(OptionLabel::A),
            "B" => Ok(OptionLabel::B),
            "C" => Ok(OptionLabel::C),
            "D" => Ok(OptionLabel::D),
            other => Err(OptionLabelError(other.to_owned())),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A multiple-choice question as served by the backing store.
///
/// The correct answer is kept as the raw stored label. A label outside A–D is
/// not rejected here: such a question can still be shown, it just never scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    options: [String; 4],
    correct_answer: String,
    explanation: String,
    domain: Domain,
    sub_topic: String,
}

impl Question {
    /// Builds a question, rejecting blank prompt or option text.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyPrompt` or `QuestionError::EmptyOption`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        options: [String; 4],
        correct_answer: impl Into<String>,
        explanation: impl Into<String>,
        domain: Domain,
        sub_topic: impl Into<String>,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        for label in OptionLabel::ALL {
            if options[label.index()].trim().is_empty() {
                return Err(QuestionError::EmptyOption(label));
            }
        }

        Ok(Self {
            id,
            prompt,
            options,
            correct_answer: correct_answer.into(),
            explanation: explanation.into(),
            domain,
            sub_topic: sub_topic.into(),
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn option(&self, label: OptionLabel) -> &str {
        &self.options[label.index()]
    }

    /// Options in A–D order.
    pub fn options(&self) -> impl Iterator<Item = (OptionLabel, &str)> {
        OptionLabel::ALL
            .into_iter()
            .map(|label| (label, self.option(label)))
    }

    /// Raw stored label of the correct option.
    #[must_use]
    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    /// The correct option, if the stored label names one.
    #[must_use]
    pub fn correct_label(&self) -> Option<OptionLabel> {
        self.correct_answer.parse().ok()
    }

    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    #[must_use]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    #[must_use]
    pub fn sub_topic(&self) -> &str {
        &self.sub_topic
    }

    /// Exact, case-sensitive comparison against the stored label.
    #[must_use]
    pub fn is_correct(&self, selection: OptionLabel) -> bool {
        selection.as_str() == self.correct_answer
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
