use mastery_core::Clock;
use mastery_core::model::{OptionLabel, Question};
use mastery_core::quiz::{AnswerFeedback, Advance, QuizProgress, QuizSession, QuizState, Tally};

use crate::error::ServiceError;
use crate::recorder::{FlushReport, RecorderHandle};

/// Result of finishing a quiz run.
#[derive(Debug)]
pub struct QuizOutcome {
    pub tally: Tally,
    pub report: FlushReport,
}

/// Drives one quiz session and hands each attempt to the recorder.
///
/// Submitting never waits on the store: the attempt is queued and the user
/// can move on while it is written.
pub struct QuizRunner {
    session: QuizSession,
    recorder: RecorderHandle,
    clock: Clock,
}

impl QuizRunner {
    #[must_use]
    pub fn new(session: QuizSession, recorder: RecorderHandle, clock: Clock) -> Self {
        Self {
            session,
            recorder,
            clock,
        }
    }

    #[must_use]
    pub fn session(&self) -> &QuizSession {
        &self.session
    }

    #[must_use]
    pub fn state(&self) -> QuizState {
        self.session.state()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.session.current_question()
    }

    #[must_use]
    pub fn progress(&self) -> QuizProgress {
        self.session.progress()
    }

    #[must_use]
    pub fn tally(&self) -> Tally {
        self.session.tally()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.session.is_complete()
    }

    /// Attempts queued but not yet written.
    #[must_use]
    pub fn pending_records(&self) -> usize {
        self.recorder.in_flight()
    }

    /// # Errors
    ///
    /// Returns `ServiceError::ValidationFailed` outside `Answering`.
    pub fn select_option(&mut self, label: OptionLabel) -> Result<(), ServiceError> {
        Ok(self.session.select_option(label)?)
    }

    /// Selects from text input ("A".."D", case-sensitive).
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::ValidationFailed` for anything else; the
    /// previous selection is kept.
    pub fn select_option_str(&mut self, raw: &str) -> Result<(), ServiceError> {
        Ok(self.session.select_option_str(raw)?)
    }

    /// Scores the selection and queues its attempt record.
    ///
    /// A recorder that is no longer running is logged, not returned: the
    /// answer still counts locally.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::ValidationFailed` without a selection or
    /// outside `Answering`; nothing is recorded in that case.
    pub fn submit_answer(&mut self) -> Result<AnswerFeedback, ServiceError> {
        let feedback = self.session.submit_answer(self.clock.now())?.clone();
        if let Err(error) = self.recorder.enqueue(feedback.attempt.clone()) {
            tracing::warn!(
                question = %feedback.attempt.question_id,
                error = %error,
                "attempt not queued"
            );
        }
        Ok(feedback)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::ValidationFailed` outside `Feedback`.
    pub fn advance(&mut self) -> Result<Advance, ServiceError> {
        let step = self.session.advance()?;
        if let Advance::Complete(tally) = step {
            tracing::info!(
                user = %self.session.user_id(),
                correct = tally.correct,
                total = tally.total,
                "quiz complete"
            );
        }
        Ok(step)
    }

    /// Waits for every queued attempt and returns the final score.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::RecorderStopped` if the recorder exited before
    /// reporting.
    pub async fn finish(self) -> Result<QuizOutcome, ServiceError> {
        let tally = self.session.tally();
        let report = self.recorder.close().await?;
        if !report.is_clean() {
            tracing::warn!(
                failed = report.failed.len(),
                persisted = report.persisted,
                "some attempts were not saved"
            );
        }
        Ok(QuizOutcome { tally, report })
    }
}
