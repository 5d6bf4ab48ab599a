use mastery_core::model::{DomainMastery, UserId};

use super::{
    SqliteRepository,
    mapping::{conn, map_mastery_row},
};
use crate::repository::{MasteryRepository, StorageError};

#[async_trait::async_trait]
impl MasteryRepository for SqliteRepository {
    async fn mastery_for_user(&self, user_id: UserId) -> Result<Vec<DomainMastery>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT user_id, domain, total_attempted, total_correct
                FROM domain_mastery
                WHERE user_id = ?1
                ORDER BY domain ASC
            ",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_mastery_row(&row)?);
        }
        Ok(out)
    }
}
