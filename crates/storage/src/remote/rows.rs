//! Row shapes exchanged with the hosted REST API.

use mastery_core::model::{AttemptRecord, Domain, OptionLabel, Question, QuestionId, UserId};
use serde::{Deserialize, Serialize};

use crate::repository::StorageError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct QuestionRow {
    pub id: QuestionId,
    pub question_text: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
    pub domain: String,
    #[serde(default)]
    pub sub_topic: Option<String>,
}

impl QuestionRow {
    pub(crate) fn from_question(q: &Question) -> Self {
        Self {
            id: q.id(),
            question_text: q.prompt().to_owned(),
            option_a: q.option(OptionLabel::A).to_owned(),
            option_b: q.option(OptionLabel::B).to_owned(),
            option_c: q.option(OptionLabel::C).to_owned(),
            option_d: q.option(OptionLabel::D).to_owned(),
            correct_answer: q.correct_answer().to_owned(),
            explanation: Some(q.explanation().to_owned()),
            domain: q.domain().as_str().to_owned(),
            sub_topic: Some(q.sub_topic().to_owned()),
        }
    }

    /// Validates the row into a domain `Question`.
    pub(crate) fn into_question(self) -> Result<Question, StorageError> {
        let id = self.id;
        let domain = self
            .domain
            .parse::<Domain>()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Question::new(
            id,
            self.question_text,
            [self.option_a, self.option_b, self.option_c, self.option_d],
            self.correct_answer,
            self.explanation.unwrap_or_default(),
            domain,
            self.sub_topic.unwrap_or_default(),
        )
        .map_err(|e| StorageError::Serialization(format!("question {id}: {e}")))
    }
}

/// Insert payload for `user_progress`. The store stamps `created_at`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewAttemptRow {
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub is_correct: bool,
}

impl From<&AttemptRecord> for NewAttemptRow {
    fn from(a: &AttemptRecord) -> Self {
        Self {
            user_id: a.user_id,
            question_id: a.question_id,
            is_correct: a.is_correct,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AuthUserRow {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
pub(crate) fn content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_row_validates_into_question() {
        let json = r#"{
            "id": "0d8f5a63-3c9d-4a57-8d7e-2f1f6a0b9c11",
            "question_text": "If 3x = 12, x = ?",
            "option_a": "3", "option_b": "4", "option_c": "5", "option_d": "6",
            "correct_answer": "B",
            "explanation": null,
            "domain": "aptitude",
            "sub_topic": "algebra",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let row: QuestionRow = serde_json::from_str(json).unwrap();
        let q = row.into_question().unwrap();
        assert_eq!(q.domain(), Domain::Aptitude);
        assert_eq!(q.correct_label(), Some(OptionLabel::B));
        assert_eq!(q.explanation(), "");
    }

    #[test]
    fn unknown_domain_is_a_serialization_error() {
        let json = r#"{
            "id": "0d8f5a63-3c9d-4a57-8d7e-2f1f6a0b9c11",
            "question_text": "?",
            "option_a": "1", "option_b": "2", "option_c": "3", "option_d": "4",
            "correct_answer": "A",
            "domain": "astrology"
        }"#;
        let row: QuestionRow = serde_json::from_str(json).unwrap();
        assert!(matches!(
            row.into_question(),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn parses_content_range_totals() {
        assert_eq!(content_range_total("0-24/3573"), Some(3573));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("0-9/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn attempt_payload_uses_column_names() {
        let rec = AttemptRecord::new(
            UserId::random(),
            QuestionId::random(),
            true,
            mastery_core::time::fixed_now(),
        );
        let value = serde_json::to_value(NewAttemptRow::from(&rec)).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["is_correct", "question_id", "user_id"]);
        assert_eq!(value["is_correct"], serde_json::Value::Bool(true));
        assert_eq!(value["user_id"], serde_json::Value::String(rec.user_id.to_string()));
    }
}
