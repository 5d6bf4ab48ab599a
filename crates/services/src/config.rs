//! Environment-driven settings for the quiz services.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use mastery_core::model::UserId;
use storage::remote::RemoteConfig;

use crate::error::AppServicesError;

pub const DEFAULT_BATCH_SIZE: u32 = 10;
pub const DEFAULT_LEADERBOARD_LIMIT: u32 = 50;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RECORD_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RECORD_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Questions fetched per quiz, at most ten.
    pub batch_size: u32,
    pub leaderboard_limit: u32,
    /// Upper bound for any single backing-store call.
    pub call_timeout: Duration,
    /// Tries per attempt record before it is reported as failed.
    pub record_max_attempts: u32,
    /// Base delay between record retries; grows linearly per try.
    pub record_backoff: Duration,
    /// Shuffle the fetched batch before starting a quiz.
    pub shuffle: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            leaderboard_limit: DEFAULT_LEADERBOARD_LIMIT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            record_max_attempts: DEFAULT_RECORD_MAX_ATTEMPTS,
            record_backoff: DEFAULT_RECORD_BACKOFF,
            shuffle: false,
        }
    }
}

impl ServiceConfig {
    /// Reads `QUIZ_*` overrides; unset or malformed values keep the default.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: bounded_batch(env_or("QUIZ_BATCH_SIZE", defaults.batch_size)),
            leaderboard_limit: env_or("QUIZ_LEADERBOARD_LIMIT", defaults.leaderboard_limit),
            call_timeout: Duration::from_secs(env_or(
                "QUIZ_CALL_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )),
            record_max_attempts: env_or("QUIZ_RECORD_MAX_ATTEMPTS", defaults.record_max_attempts)
                .max(1),
            record_backoff: Duration::from_millis(env_or(
                "QUIZ_RECORD_BACKOFF_MS",
                u64::try_from(defaults.record_backoff.as_millis()).unwrap_or(200),
            )),
            shuffle: env_flag("QUIZ_SHUFFLE"),
        }
    }
}

fn bounded_batch(size: u32) -> u32 {
    size.clamp(1, DEFAULT_BATCH_SIZE)
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring malformed setting");
            default
        }),
        Err(_) => default,
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Which backing store the app talks to.
#[derive(Debug, Clone)]
pub enum Backend {
    Sqlite {
        db_url: String,
        /// Local stand-in for a signed-in user.
        user_id: Option<UserId>,
    },
    Remote(RemoteConfig),
}

impl Backend {
    /// Reads `QUIZ_BACKEND` (`sqlite` by default) and the matching settings.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::UnknownBackend` for an unrecognized name and
    /// `AppServicesError::RemoteNotConfigured` when the remote URL or key is
    /// missing.
    pub fn from_env() -> Result<Self, AppServicesError> {
        let name = env::var("QUIZ_BACKEND").unwrap_or_else(|_| "sqlite".into());
        match name.trim() {
            "" | "sqlite" => Ok(Self::sqlite_from_env()),
            "remote" => Self::remote_from_env(),
            other => Err(AppServicesError::UnknownBackend(other.to_owned())),
        }
    }

    /// `QUIZ_DB_URL` (default `sqlite:dev.sqlite3`) and `QUIZ_USER_ID`.
    #[must_use]
    pub fn sqlite_from_env() -> Self {
        Backend::Sqlite {
            db_url: env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into()),
            user_id: env::var("QUIZ_USER_ID")
                .ok()
                .and_then(|raw| raw.parse().ok()),
        }
    }

    /// # Errors
    ///
    /// Returns `AppServicesError::RemoteNotConfigured` when the remote URL or
    /// key is missing.
    pub fn remote_from_env() -> Result<Self, AppServicesError> {
        RemoteConfig::from_env()
            .map(Backend::Remote)
            .ok_or(AppServicesError::RemoteNotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.leaderboard_limit, 50);
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.record_max_attempts, 3);
        assert_eq!(config.record_backoff, Duration::from_millis(200));
        assert!(!config.shuffle);
    }

    #[test]
    fn batch_setting_never_exceeds_ten() {
        assert_eq!(bounded_batch(25), 10);
        assert_eq!(bounded_batch(0), 1);
        assert_eq!(bounded_batch(7), 7);
    }

    #[test]
    fn env_or_falls_back_on_missing_key() {
        assert_eq!(env_or("QUIZ_TEST_KEY_THAT_IS_NEVER_SET", 7_u32), 7);
        assert!(!env_flag("QUIZ_TEST_FLAG_THAT_IS_NEVER_SET"));
    }
}
