use chrono::{DateTime, Utc};
use std::fmt;

use crate::model::{AttemptRecord, OptionLabel, Question, UserId, award_points};

use super::QuizError;

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizState {
    /// Waiting for the user to pick and submit an option.
    Answering,
    /// Answer submitted; correctness and explanation are visible.
    Feedback,
    /// Every question has been answered. Terminal.
    Complete,
}

impl fmt::Display for QuizState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuizState::Answering => "answering",
            QuizState::Feedback => "feedback",
            QuizState::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Running score of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub correct: u32,
    pub total: u32,
}

impl Tally {
    fn record(&mut self, is_correct: bool) {
        self.total += 1;
        if is_correct {
            self.correct += 1;
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.correct, self.total)
    }
}

/// What the user sees after submitting, plus the attempt to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub attempt: AttemptRecord,
    pub selected: OptionLabel,
    /// `None` when the stored correct label is not one of A–D.
    pub correct_option: Option<OptionLabel>,
    pub points: u32,
    pub explanation: String,
}

impl AnswerFeedback {
    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.attempt.is_correct
    }
}

/// Result of leaving the feedback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved on to the question at `index`.
    Next { index: usize },
    /// The last question was answered.
    Complete(Tally),
}

/// Snapshot for progress indicators ("Question 3 of 10", "2/3").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizProgress {
    /// 1-based position of the current question.
    pub position: usize,
    pub total_questions: usize,
    pub tally: Tally,
    pub state: QuizState,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// In-memory quiz over a fixed batch of questions.
///
/// Answering → (submit) → Feedback → (advance) → Answering … → Complete.
/// The question list is fixed at construction and never refetched.
pub struct QuizSession {
    user_id: UserId,
    questions: Vec<Question>,
    index: usize,
    selection: Option<OptionLabel>,
    state: QuizState,
    tally: Tally,
    last_feedback: Option<AnswerFeedback>,
}

impl QuizSession {
    /// Starts a session for `user_id` over `questions`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Empty` if there is nothing to ask.
    pub fn new(user_id: UserId, questions: Vec<Question>) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::Empty);
        }
        Ok(Self {
            user_id,
            questions,
            index: 0,
            selection: None,
            state: QuizState::Answering,
            tally: Tally::default(),
            last_feedback: None,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn state(&self) -> QuizState {
        self.state
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Always false: an empty session cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// The question being answered or reviewed; `None` once complete.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        match self.state {
            QuizState::Complete => None,
            _ => self.questions.get(self.index),
        }
    }

    #[must_use]
    pub fn selection(&self) -> Option<OptionLabel> {
        self.selection
    }

    #[must_use]
    pub fn feedback_shown(&self) -> bool {
        self.state == QuizState::Feedback
    }

    /// Feedback for the current question while in `Feedback`.
    #[must_use]
    pub fn feedback(&self) -> Option<&AnswerFeedback> {
        if self.feedback_shown() {
            self.last_feedback.as_ref()
        } else {
            None
        }
    }

    #[must_use]
    pub fn tally(&self) -> Tally {
        self.tally
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == QuizState::Complete
    }

    #[must_use]
    pub fn progress(&self) -> QuizProgress {
        QuizProgress {
            position: self.index + 1,
            total_questions: self.questions.len(),
            tally: self.tally,
            state: self.state,
        }
    }

    /// Records a tentative choice. May be called repeatedly before submitting.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::InvalidTransition` outside `Answering`.
    pub fn select_option(&mut self, label: OptionLabel) -> Result<(), QuizError> {
        self.expect_state("select", QuizState::Answering)?;
        self.selection = Some(label);
        Ok(())
    }

    /// Parses and records a choice given as text ("A".."D", case-sensitive).
    ///
    /// # Errors
    ///
    /// Returns `QuizError::InvalidOption` for anything that is not a label, and
    /// leaves the previous selection untouched.
    pub fn select_option_str(&mut self, raw: &str) -> Result<(), QuizError> {
        self.expect_state("select", QuizState::Answering)?;
        let label = raw.parse::<OptionLabel>()?;
        self.selection = Some(label);
        Ok(())
    }

    /// Scores the current selection and moves to `Feedback`.
    ///
    /// The returned feedback carries the single `AttemptRecord` for this
    /// question; the caller hands it to the progress recorder.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoAnswerSelected` without a selection, or
    /// `QuizError::InvalidTransition` outside `Answering`. State is unchanged
    /// on error.
    pub fn submit_answer(&mut self, attempted_at: DateTime<Utc>) -> Result<&AnswerFeedback, QuizError> {
        self.expect_state("submit", QuizState::Answering)?;
        let selected = self.selection.ok_or(QuizError::NoAnswerSelected)?;
        let question = self
            .questions
            .get(self.index)
            .ok_or(QuizError::InvalidTransition {
                action: "submit",
                state: self.state,
            })?;

        let is_correct = question.is_correct(selected);
        let feedback = AnswerFeedback {
            attempt: AttemptRecord::new(self.user_id, question.id(), is_correct, attempted_at),
            selected,
            correct_option: question.correct_label(),
            points: award_points(is_correct),
            explanation: question.explanation().to_owned(),
        };

        self.tally.record(is_correct);
        self.state = QuizState::Feedback;
        let feedback = self.last_feedback.insert(feedback);
        Ok(&*feedback)
    }

    /// Leaves `Feedback`, either to the next question or to `Complete`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::InvalidTransition` outside `Feedback`.
    pub fn advance(&mut self) -> Result<Advance, QuizError> {
        self.expect_state("advance", QuizState::Feedback)?;

        if self.index + 1 < self.questions.len() {
            self.index += 1;
            self.selection = None;
            self.state = QuizState::Answering;
            Ok(Advance::Next { index: self.index })
        } else {
            self.state = QuizState::Complete;
            Ok(Advance::Complete(self.tally))
        }
    }

    fn expect_state(&self, action: &'static str, expected: QuizState) -> Result<(), QuizError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(QuizError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }
}

impl fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("user_id", &self.user_id)
            .field("questions_len", &self.questions.len())
            .field("index", &self.index)
            .field("selection", &self.selection)
            .field("state", &self.state)
            .field("tally", &self.tally)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Domain, QuestionId};
    use crate::time::fixed_now;

    fn question(correct: &str) -> Question {
        Question::new(
            QuestionId::random(),
            "Which is largest?",
            ["1".into(), "2".into(), "3".into(), "4".into()],
            correct,
            "4 is largest",
            Domain::Aptitude,
            "comparison",
        )
        .unwrap()
    }

    fn session(corrects: &[&str]) -> QuizSession {
        let qs = corrects.iter().map(|c| question(c)).collect();
        QuizSession::new(UserId::random(), qs).unwrap()
    }

    fn answer(s: &mut QuizSession, label: OptionLabel) -> bool {
        s.select_option(label).unwrap();
        s.submit_answer(fixed_now()).unwrap().is_correct()
    }

    #[test]
    fn empty_session_is_rejected() {
        let err = QuizSession::new(UserId::random(), Vec::new()).unwrap_err();
        assert!(matches!(err, QuizError::Empty));
    }

    #[test]
    fn scores_and_completes_three_questions() {
        let mut s = session(&["D", "A", "C"]);

        assert!(answer(&mut s, OptionLabel::D));
        assert_eq!(s.advance().unwrap(), Advance::Next { index: 1 });
        assert!(!answer(&mut s, OptionLabel::B));
        assert_eq!(s.advance().unwrap(), Advance::Next { index: 2 });
        assert!(answer(&mut s, OptionLabel::C));

        let done = s.advance().unwrap();
        assert_eq!(done, Advance::Complete(Tally { correct: 2, total: 3 }));
        assert!(s.is_complete());
        assert!(s.current_question().is_none());
        assert_eq!(s.current_index(), 2);
    }

    #[test]
    fn submit_without_selection_keeps_answering() {
        let mut s = session(&["A"]);
        let err = s.submit_answer(fixed_now()).unwrap_err();
        assert!(matches!(err, QuizError::NoAnswerSelected));
        assert_eq!(s.state(), QuizState::Answering);
        assert_eq!(s.tally(), Tally::default());
    }

    #[test]
    fn cannot_resubmit_during_feedback() {
        let mut s = session(&["A", "B"]);
        answer(&mut s, OptionLabel::A);
        let err = s.submit_answer(fixed_now()).unwrap_err();
        assert!(matches!(
            err,
            QuizError::InvalidTransition {
                action: "submit",
                state: QuizState::Feedback
            }
        ));
        assert!(s.select_option(OptionLabel::B).is_err());
        assert_eq!(s.tally().total, 1);
    }

    #[test]
    fn advance_requires_feedback() {
        let mut s = session(&["A"]);
        assert!(s.advance().is_err());
        answer(&mut s, OptionLabel::A);
        s.advance().unwrap();
        assert!(s.advance().is_err());
        assert!(s.select_option(OptionLabel::A).is_err());
    }

    #[test]
    fn advance_clears_selection() {
        let mut s = session(&["A", "B"]);
        answer(&mut s, OptionLabel::C);
        assert_eq!(s.selection(), Some(OptionLabel::C));
        assert!(s.feedback().is_some());
        s.advance().unwrap();
        assert_eq!(s.selection(), None);
        assert!(!s.feedback_shown());
        assert!(s.feedback().is_none());
    }

    #[test]
    fn unrecognized_correct_label_always_scores_wrong() {
        for label in OptionLabel::ALL {
            let mut s = session(&["E"]);
            assert!(!answer(&mut s, label));
            assert_eq!(s.feedback().unwrap().correct_option, None);
        }
    }

    #[test]
    fn text_selection_is_case_sensitive() {
        let mut s = session(&["B"]);
        s.select_option_str("A").unwrap();
        assert!(matches!(
            s.select_option_str("b"),
            Err(QuizError::InvalidOption(_))
        ));
        assert_eq!(s.selection(), Some(OptionLabel::A));
    }

    #[test]
    fn feedback_awards_points_and_carries_attempt() {
        let mut s = session(&["B", "B"]);
        s.select_option(OptionLabel::B).unwrap();
        let fb = s.submit_answer(fixed_now()).unwrap().clone();
        assert_eq!(fb.points, 10);
        assert_eq!(fb.attempt.question_id, s.questions()[0].id());
        assert_eq!(fb.attempt.user_id, s.user_id());
        assert_eq!(fb.attempt.attempted_at, fixed_now());

        s.advance().unwrap();
        s.select_option(OptionLabel::A).unwrap();
        assert_eq!(s.submit_answer(fixed_now()).unwrap().points, 2);
    }

    #[test]
    fn total_never_exceeds_questions_presented() {
        let mut s = session(&["A", "A", "A", "A"]);
        while !s.is_complete() {
            let presented = u32::try_from(s.current_index() + 1).unwrap();
            assert!(s.tally().total < presented);
            answer(&mut s, OptionLabel::A);
            assert_eq!(s.tally().total, presented);
            s.advance().unwrap();
        }
        assert_eq!(s.tally().total as usize, s.len());
        assert_eq!(s.progress().tally, Tally { correct: 4, total: 4 });
    }
}
