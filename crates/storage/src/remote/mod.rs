//! Adapter for a hosted PostgREST-style backend (tables under `/rest/v1`,
//! auth under `/auth/v1`).

use std::env;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use mastery_core::model::{
    AttemptRecord, Domain, DomainMastery, DomainMasteryRow, LeaderboardEntry, Profile, Question,
    UserId,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::repository::{
    AuthSession, MasteryRepository, ProfileRepository, ProgressRepository, QuestionRepository,
    SessionProvider, Storage, StorageError,
};

mod rows;

use rows::{AuthUserRow, NewAttemptRow, QuestionRow, content_range_total};

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    /// Bearer token of the signed-in user, if any.
    pub access_token: Option<String>,
}

impl RemoteConfig {
    /// Reads `QUIZ_REMOTE_URL`, `QUIZ_REMOTE_API_KEY` and the optional
    /// `QUIZ_ACCESS_TOKEN`. Returns `None` unless URL and key are both set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("QUIZ_REMOTE_URL").ok()?;
        let api_key = env::var("QUIZ_REMOTE_API_KEY").ok()?;
        if base_url.trim().is_empty() || api_key.trim().is_empty() {
            return None;
        }
        let access_token = env::var("QUIZ_ACCESS_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        Some(Self {
            base_url,
            api_key,
            access_token,
        })
    }
}

#[derive(Clone)]
pub struct RemoteRepository {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl RemoteRepository {
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the HTTP client cannot be built.
    pub fn new(config: RemoteConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key,
            access_token: Arc::new(RwLock::new(config.access_token)),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn token(&self) -> Result<Option<String>, StorageError> {
        self.access_token
            .read()
            .map(|guard| guard.clone())
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Attaches the project key and the user's bearer token (or the key
    /// itself for anonymous reads).
    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, StorageError> {
        let bearer = self.token()?.unwrap_or_else(|| self.api_key.clone());
        Ok(request.header("apikey", &self.api_key).bearer_auth(bearer))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        let response = self
            .authorized(request)?
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        check_status(response).await
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StorageError> {
        let response = self
            .send(self.client.get(self.table_url(table)).query(query))
            .await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        table: &str,
        body: &T,
        prefer: &str,
    ) -> Result<(), StorageError> {
        self.send(
            self.client
                .post(self.table_url(table))
                .header("Prefer", prefer)
                .json(body),
        )
        .await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StorageError::Unauthorized),
        StatusCode::NOT_FOUND => Err(StorageError::NotFound),
        StatusCode::CONFLICT => Err(StorageError::Conflict),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl SessionProvider for RemoteRepository {
    async fn current_session(&self) -> Result<Option<AuthSession>, StorageError> {
        if self.token()?.is_none() {
            return Ok(None);
        }
        let response = self.send(self.client.get(self.auth_url("user"))).await;
        match response {
            Ok(response) => {
                let user: AuthUserRow = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(AuthSession {
                    user_id: user.id,
                    email: user.email,
                }))
            }
            // Expired or revoked token: treat as signed out.
            Err(StorageError::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn sign_out(&self) -> Result<(), StorageError> {
        if self.token()?.is_none() {
            return Ok(());
        }
        match self.send(self.client.post(self.auth_url("logout"))).await {
            Ok(_) | Err(StorageError::Unauthorized) => {}
            Err(e) => return Err(e),
        }
        let mut guard = self
            .access_token
            .write()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

#[async_trait]
impl QuestionRepository for RemoteRepository {
    async fn fetch_questions(
        &self,
        domain: Option<Domain>,
        limit: u32,
    ) -> Result<Vec<Question>, StorageError> {
        let mut query = vec![("select", "*".to_owned()), ("limit", limit.to_string())];
        if let Some(domain) = domain {
            query.push(("domain", eq(domain)));
        }
        let rows: Vec<QuestionRow> = self.get_rows("questions", &query).await?;
        rows.into_iter().map(QuestionRow::into_question).collect()
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        self.post_json(
            "questions",
            &QuestionRow::from_question(question),
            "resolution=merge-duplicates,return=minimal",
        )
        .await
    }
}

#[async_trait]
impl ProgressRepository for RemoteRepository {
    async fn append_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError> {
        self.post_json(
            "user_progress",
            &NewAttemptRow::from(attempt),
            "return=minimal",
        )
        .await
    }

    async fn count_attempts(&self, user_id: UserId) -> Result<u64, StorageError> {
        let request = self
            .client
            .head(self.table_url("user_progress"))
            .query(&[("select", "*".to_owned()), ("user_id", eq(user_id))])
            .header("Prefer", "count=exact");
        let response = self.send(request).await?;
        response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(content_range_total)
            .ok_or_else(|| StorageError::Serialization("missing exact count".into()))
    }
}

#[async_trait]
impl MasteryRepository for RemoteRepository {
    async fn mastery_for_user(&self, user_id: UserId) -> Result<Vec<DomainMastery>, StorageError> {
        let rows: Vec<DomainMasteryRow> = self
            .get_rows(
                "domain_mastery",
                &[("select", "*".to_owned()), ("user_id", eq(user_id))],
            )
            .await?;
        rows.into_iter()
            .map(|row| {
                DomainMastery::try_from(row).map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl ProfileRepository for RemoteRepository {
    async fn get_profile(&self, user_id: UserId) -> Result<Profile, StorageError> {
        let rows: Vec<Profile> = self
            .get_rows(
                "profiles",
                &[
                    ("select", "id,full_name,current_streak,total_points".to_owned()),
                    ("id", eq(user_id)),
                ],
            )
            .await?;
        rows.into_iter().next().ok_or(StorageError::NotFound)
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        self.post_json(
            "profiles",
            profile,
            "resolution=merge-duplicates,return=minimal",
        )
        .await
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, StorageError> {
        self.get_rows(
            "profiles",
            &[
                ("select", "id,full_name,total_points".to_owned()),
                ("order", "total_points.desc".to_owned()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }
}

impl Storage {
    /// Build a `Storage` backed by the hosted REST API.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the HTTP client cannot be built.
    pub fn remote(config: RemoteConfig) -> Result<Self, StorageError> {
        let repo = RemoteRepository::new(config)?;
        tracing::debug!(base_url = %repo.base_url, "remote storage ready");
        Ok(Self {
            sessions: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            mastery: Arc::new(repo.clone()),
            profiles: Arc::new(repo),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(base: &str) -> RemoteRepository {
        RemoteRepository::new(RemoteConfig {
            base_url: base.into(),
            api_key: "anon".into(),
            access_token: None,
        })
        .unwrap()
    }

    #[test]
    fn urls_ignore_trailing_slash() {
        let r = repo("https://example.test/");
        assert_eq!(r.table_url("questions"), "https://example.test/rest/v1/questions");
        assert_eq!(r.auth_url("user"), "https://example.test/auth/v1/user");
    }

    #[test]
    fn filters_use_eq_operator() {
        assert_eq!(eq(Domain::GeneralKnowledge), "eq.general_knowledge");
    }

    #[tokio::test]
    async fn no_token_means_no_session() {
        let r = repo("http://127.0.0.1:9");
        assert!(r.current_session().await.unwrap().is_none());
        r.sign_out().await.unwrap();
    }
}
