use mastery_core::model::{AttemptRecord, UserId};

use super::{SqliteRepository, mapping::conn};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn append_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO user_progress (user_id, question_id, is_correct, attempted_at)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(attempt.user_id.to_string())
        .bind(attempt.question_id.to_string())
        .bind(attempt.is_correct)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            // Unknown question id trips the foreign key.
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(StorageError::NotFound)
            }
            Err(e) => Err(conn(e)),
        }
    }

    async fn count_attempts(&self, user_id: UserId) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_progress WHERE user_id = ?1")
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;
        u64::try_from(count).map_err(|_| StorageError::Serialization(format!("invalid count: {count}")))
    }
}
