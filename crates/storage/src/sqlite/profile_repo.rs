use mastery_core::model::{LeaderboardEntry, Profile, UserId};

use super::{
    SqliteRepository,
    mapping::{conn, i64_from_u64, map_leaderboard_row, map_profile_row},
};
use crate::repository::{ProfileRepository, StorageError};

#[async_trait::async_trait]
impl ProfileRepository for SqliteRepository {
    async fn get_profile(&self, user_id: UserId) -> Result<Profile, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, full_name, current_streak, total_points
                FROM profiles
                WHERE id = ?1
            ",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => map_profile_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO profiles (id, full_name, current_streak, total_points)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                full_name = excluded.full_name,
                current_streak = excluded.current_streak,
                total_points = excluded.total_points
            ",
        )
        .bind(profile.id.to_string())
        .bind(profile.display_name.as_deref())
        .bind(i64::from(profile.current_streak))
        .bind(i64_from_u64("total_points", profile.total_points)?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, full_name, total_points
                FROM profiles
                ORDER BY total_points DESC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_leaderboard_row(&row)?);
        }
        Ok(out)
    }
}
