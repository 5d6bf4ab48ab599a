use mastery_core::model::{Domain, OptionLabel, Question};

use super::{
    SqliteRepository,
    mapping::{conn, map_question_row},
};
use crate::repository::{QuestionRepository, StorageError};

const SELECT_ALL: &str = r"
    SELECT
        id, question_text, option_a, option_b, option_c, option_d,
        correct_answer, explanation, domain, sub_topic
    FROM questions
    ORDER BY rowid
    LIMIT ?1
";

const SELECT_BY_DOMAIN: &str = r"
    SELECT
        id, question_text, option_a, option_b, option_c, option_d,
        correct_answer, explanation, domain, sub_topic
    FROM questions
    WHERE domain = ?2
    ORDER BY rowid
    LIMIT ?1
";

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn fetch_questions(
        &self,
        domain: Option<Domain>,
        limit: u32,
    ) -> Result<Vec<Question>, StorageError> {
        let rows = match domain {
            Some(domain) => {
                sqlx::query(SELECT_BY_DOMAIN)
                    .bind(i64::from(limit))
                    .bind(domain.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query(SELECT_ALL)
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_question_row(&row)?);
        }
        Ok(out)
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO questions (
                id, question_text, option_a, option_b, option_c, option_d,
                correct_answer, explanation, domain, sub_topic
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                question_text = excluded.question_text,
                option_a = excluded.option_a,
                option_b = excluded.option_b,
                option_c = excluded.option_c,
                option_d = excluded.option_d,
                correct_answer = excluded.correct_answer,
                explanation = excluded.explanation,
                domain = excluded.domain,
                sub_topic = excluded.sub_topic
            ",
        )
        .bind(question.id().to_string())
        .bind(question.prompt())
        .bind(question.option(OptionLabel::A))
        .bind(question.option(OptionLabel::B))
        .bind(question.option(OptionLabel::C))
        .bind(question.option(OptionLabel::D))
        .bind(question.correct_answer())
        .bind(question.explanation())
        .bind(question.domain().as_str())
        .bind(question.sub_topic())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
