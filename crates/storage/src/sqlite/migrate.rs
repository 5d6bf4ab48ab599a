use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS questions (
            id TEXT PRIMARY KEY,
            question_text TEXT NOT NULL,
            option_a TEXT NOT NULL,
            option_b TEXT NOT NULL,
            option_c TEXT NOT NULL,
            option_d TEXT NOT NULL,
            correct_answer TEXT NOT NULL,
            explanation TEXT NOT NULL DEFAULT '',
            domain TEXT NOT NULL CHECK (domain IN (
                'aptitude', 'reasoning', 'verbal', 'technical', 'general_knowledge'
            )),
            sub_topic TEXT NOT NULL DEFAULT ''
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            full_name TEXT,
            current_streak INTEGER NOT NULL DEFAULT 0 CHECK (current_streak >= 0),
            total_points INTEGER NOT NULL DEFAULT 0 CHECK (total_points >= 0)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_progress (
            id INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
            attempted_at TEXT NOT NULL,
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS domain_mastery (
            user_id TEXT NOT NULL,
            domain TEXT NOT NULL,
            total_attempted INTEGER NOT NULL CHECK (total_attempted >= 0),
            total_correct INTEGER NOT NULL CHECK (total_correct >= 0),
            accuracy_percentage REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, domain)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_questions_domain
            ON questions(domain);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_user_progress_user
            ON user_progress(user_id, attempted_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_profiles_points
            ON profiles(total_points DESC);
    ",
    // Mastery and points are owned by the store, not by callers.
    r"
        CREATE TRIGGER IF NOT EXISTS trg_user_progress_mastery
        AFTER INSERT ON user_progress
        BEGIN
            INSERT INTO domain_mastery (
                user_id, domain, total_attempted, total_correct, accuracy_percentage
            )
            SELECT NEW.user_id, q.domain, 1, NEW.is_correct, 100.0 * NEW.is_correct
            FROM questions q
            WHERE q.id = NEW.question_id
            ON CONFLICT(user_id, domain) DO UPDATE SET
                total_attempted = total_attempted + 1,
                total_correct = total_correct + excluded.total_correct,
                accuracy_percentage =
                    100.0 * (total_correct + excluded.total_correct) / (total_attempted + 1);
        END;
    ",
    r"
        CREATE TRIGGER IF NOT EXISTS trg_user_progress_points
        AFTER INSERT ON user_progress
        BEGIN
            INSERT INTO profiles (id, full_name, current_streak, total_points)
            VALUES (NEW.user_id, NULL, 0, CASE WHEN NEW.is_correct = 1 THEN 10 ELSE 2 END)
            ON CONFLICT(id) DO UPDATE SET
                total_points = total_points + excluded.total_points;
        END;
    ",
];

/// Runs versioned migrations for the quiz schema.
///
/// Version 1 creates questions, profiles, the append-only attempt log, the
/// per-domain mastery table, and the triggers that keep mastery and points
/// in step with the attempt log.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied sqlite migration");
    }

    Ok(())
}
