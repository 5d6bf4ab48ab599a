use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::domain::Domain;
use crate::model::ids::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MasteryError {
    #[error("total correct ({correct}) exceeds total attempted ({attempted})")]
    CorrectExceedsAttempted { attempted: u32, correct: u32 },
}

/// Per-user, per-domain aggregate of attempts.
///
/// Accuracy is always derived from the two counters so it can never disagree
/// with them; a store-provided percentage is ignored on load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMastery {
    user_id: UserId,
    domain: Domain,
    total_attempted: u32,
    total_correct: u32,
}

impl DomainMastery {
    /// Empty aggregate for a user and domain.
    #[must_use]
    pub fn empty(user_id: UserId, domain: Domain) -> Self {
        Self {
            user_id,
            domain,
            total_attempted: 0,
            total_correct: 0,
        }
    }

    /// Rehydrate from persisted counters.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::CorrectExceedsAttempted` for inconsistent counters.
    pub fn from_persisted(
        user_id: UserId,
        domain: Domain,
        total_attempted: u32,
        total_correct: u32,
    ) -> Result<Self, MasteryError> {
        if total_correct > total_attempted {
            return Err(MasteryError::CorrectExceedsAttempted {
                attempted: total_attempted,
                correct: total_correct,
            });
        }
        Ok(Self {
            user_id,
            domain,
            total_attempted,
            total_correct,
        })
    }

    /// Folds one attempt into the aggregate.
    pub fn record(&mut self, is_correct: bool) {
        self.total_attempted = self.total_attempted.saturating_add(1);
        if is_correct {
            self.total_correct = self.total_correct.saturating_add(1);
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    #[must_use]
    pub fn total_attempted(&self) -> u32 {
        self.total_attempted
    }

    #[must_use]
    pub fn total_correct(&self) -> u32 {
        self.total_correct
    }

    /// `100 * correct / attempted`, or 0 when nothing was attempted.
    #[must_use]
    pub fn accuracy_percentage(&self) -> f64 {
        accuracy_percentage(self.total_attempted, self.total_correct)
    }

    /// Accuracy rounded to a whole percent for display.
    #[must_use]
    pub fn accuracy_rounded(&self) -> u32 {
        // Bounded to 0..=100 by construction.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = self.accuracy_percentage().round() as u32;
        rounded
    }
}

#[must_use]
pub fn accuracy_percentage(total_attempted: u32, total_correct: u32) -> f64 {
    if total_attempted == 0 {
        return 0.0;
    }
    100.0 * f64::from(total_correct) / f64::from(total_attempted)
}

/// Wire shape shared by the storage adapters and any JSON consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMasteryRow {
    pub user_id: UserId,
    pub domain: Domain,
    pub total_attempted: u32,
    pub total_correct: u32,
    #[serde(default)]
    pub accuracy_percentage: f64,
}

impl From<&DomainMastery> for DomainMasteryRow {
    fn from(m: &DomainMastery) -> Self {
        Self {
            user_id: m.user_id,
            domain: m.domain,
            total_attempted: m.total_attempted,
            total_correct: m.total_correct,
            accuracy_percentage: m.accuracy_percentage(),
        }
    }
}

impl TryFrom<DomainMasteryRow> for DomainMastery {
    type Error = MasteryError;

    fn try_from(row: DomainMasteryRow) -> Result<Self, Self::Error> {
        DomainMastery::from_persisted(row.user_id, row.domain, row.total_attempted, row.total_correct)
    }
}
