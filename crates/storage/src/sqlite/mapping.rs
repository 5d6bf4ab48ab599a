use mastery_core::model::{
    Domain, DomainMastery, LeaderboardEntry, Profile, Question, QuestionId, UserId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn u64_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn i64_from_u64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn user_id_from_str(raw: &str) -> Result<UserId, StorageError> {
    raw.parse().map_err(ser)
}

pub(crate) fn question_id_from_str(raw: &str) -> Result<QuestionId, StorageError> {
    raw.parse().map_err(ser)
}

pub(crate) fn parse_domain(raw: &str) -> Result<Domain, StorageError> {
    raw.parse().map_err(ser)
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let id = question_id_from_str(&row.try_get::<String, _>("id").map_err(ser)?)?;
    let domain = parse_domain(&row.try_get::<String, _>("domain").map_err(ser)?)?;
    let options = [
        row.try_get::<String, _>("option_a").map_err(ser)?,
        row.try_get::<String, _>("option_b").map_err(ser)?,
        row.try_get::<String, _>("option_c").map_err(ser)?,
        row.try_get::<String, _>("option_d").map_err(ser)?,
    ];

    Question::new(
        id,
        row.try_get::<String, _>("question_text").map_err(ser)?,
        options,
        row.try_get::<String, _>("correct_answer").map_err(ser)?,
        row.try_get::<String, _>("explanation").map_err(ser)?,
        domain,
        row.try_get::<String, _>("sub_topic").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_mastery_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<DomainMastery, StorageError> {
    let user_id = user_id_from_str(&row.try_get::<String, _>("user_id").map_err(ser)?)?;
    let domain = parse_domain(&row.try_get::<String, _>("domain").map_err(ser)?)?;
    let attempted = u32_from_i64(
        "total_attempted",
        row.try_get::<i64, _>("total_attempted").map_err(ser)?,
    )?;
    let correct = u32_from_i64(
        "total_correct",
        row.try_get::<i64, _>("total_correct").map_err(ser)?,
    )?;

    DomainMastery::from_persisted(user_id, domain, attempted, correct).map_err(ser)
}

pub(crate) fn map_profile_row(row: &sqlx::sqlite::SqliteRow) -> Result<Profile, StorageError> {
    let id = user_id_from_str(&row.try_get::<String, _>("id").map_err(ser)?)?;
    Ok(Profile {
        id,
        display_name: row.try_get("full_name").map_err(ser)?,
        current_streak: u32_from_i64(
            "current_streak",
            row.try_get::<i64, _>("current_streak").map_err(ser)?,
        )?,
        total_points: u64_from_i64(
            "total_points",
            row.try_get::<i64, _>("total_points").map_err(ser)?,
        )?,
    })
}

pub(crate) fn map_leaderboard_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LeaderboardEntry, StorageError> {
    Ok(LeaderboardEntry {
        user_id: user_id_from_str(&row.try_get::<String, _>("id").map_err(ser)?)?,
        display_name: row.try_get("full_name").map_err(ser)?,
        total_points: u64_from_i64(
            "total_points",
            row.try_get::<i64, _>("total_points").map_err(ser)?,
        )?,
    })
}
