//! REST record store using `reqwest`.
//!
//! Talks to the status endpoint the mobile app uses:
//!
//! | Operation | Request                                  |
//! |-----------|------------------------------------------|
//! | fetch     | `GET  {base}/games/{user_id}/{game_id}`  |
//! | upsert    | `POST {base}/games`                      |
//! | delete    | `POST {base}/games/delete`               |
//!
//! A fetch answers with a JSON array of matching records; an empty array
//! means the pair is untracked.
//!
//! # Feature gate
//!
//! This module is only available when the `store-http` feature is enabled
//! (it is enabled by default).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use tracing::{debug, warn};

use crate::error::{GameStatusError, Result, StoreError};
use crate::protocol::{GameId, GameStatus, RecordKey, StatusRecord, UserId};
use crate::store::StatusRecordStore;

/// Environment variable holding the endpoint base URL.
pub const ENV_BASE_URL: &str = "STATUS_API_URL";
/// Environment variable holding an optional bearer token.
pub const ENV_TOKEN: &str = "STATUS_API_TOKEN";
/// Environment variable holding the request timeout in whole seconds.
pub const ENV_TIMEOUT_SECS: &str = "STATUS_API_TIMEOUT_SECS";

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for an [`HttpStatusStore`].
///
/// # Example
///
/// ```
/// use game_status_client::HttpStoreConfig;
/// use std::time::Duration;
///
/// let config = HttpStoreConfig::new("https://api.example.com/")
///     .with_request_timeout(Duration::from_secs(3))
///     .with_bearer_token("secret");
/// assert_eq!(config.base_url, "https://api.example.com");
/// ```
#[derive(Clone)]
pub struct HttpStoreConfig {
    /// Endpoint base URL, without a trailing slash.
    pub base_url: String,
    /// Timeout applied to each request.
    ///
    /// Defaults to **10 seconds**.
    pub request_timeout: Duration,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub bearer_token: Option<String>,
}

impl HttpStoreConfig {
    /// Create a configuration for `base_url` with default values.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            bearer_token: None,
        }
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Attach a bearer token to every request.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Load the configuration from `STATUS_API_URL`, `STATUS_API_TOKEN`
    /// and `STATUS_API_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`GameStatusError::Config`] if the URL is missing or the
    /// timeout is not a whole number of seconds.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup(ENV_BASE_URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| GameStatusError::Config(format!("{ENV_BASE_URL} is not set")))?;
        let mut config = Self::new(base_url);

        if let Some(token) = lookup(ENV_TOKEN).filter(|token| !token.is_empty()) {
            config.bearer_token = Some(token);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                GameStatusError::Config(format!("{ENV_TIMEOUT_SECS} must be whole seconds, got {raw:?}"))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

impl fmt::Debug for HttpStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStoreConfig")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// A [`StatusRecordStore`] backed by the REST status endpoint.
#[derive(Debug, Clone)]
pub struct HttpStatusStore {
    client: Client,
    base_url: Url,
    config: HttpStoreConfig,
}

impl HttpStatusStore {
    /// Build a store for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GameStatusError::Config`] if the base URL cannot carry a
    /// path or the HTTP client cannot be built (e.g. TLS backend
    /// initialization failed).
    pub fn new(config: HttpStoreConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| GameStatusError::Config(format!("invalid base URL {:?}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(GameStatusError::Config(format!(
                "base URL {:?} cannot carry a path",
                config.base_url
            )));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GameStatusError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &HttpStoreConfig {
        &self.config
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.endpoint(segments));
        match self.config.bearer_token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        path: &str,
        builder: reqwest::RequestBuilder,
    ) -> std::result::Result<reqwest::Response, StoreError> {
        builder.send().await.map_err(|e| {
            warn!(path, error = %e, "status request failed to send");
            StoreError::PersistenceUnavailable(format!("request to {path} failed: {e}"))
        })
    }
}

/// Map a non-success status to the store error taxonomy.
fn check_status(path: &str, status: StatusCode) -> std::result::Result<(), StoreError> {
    if status.is_success() {
        return Ok(());
    }
    let message = format!("{path} returned {status}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::Unauthorized(message)),
        _ => Err(StoreError::PersistenceUnavailable(message)),
    }
}

#[async_trait]
impl StatusRecordStore for HttpStatusStore {
    async fn fetch_status(
        &self,
        user_id: &UserId,
        game_id: GameId,
    ) -> std::result::Result<Option<StatusRecord>, StoreError> {
        let path = format!("games/{user_id}/{game_id}");
        let user = user_id.to_string();
        let game = game_id.to_string();
        let builder = self.request(Method::GET, &["games", &user, &game]);
        let response = self.send(&path, builder).await?;
        check_status(&path, response.status())?;

        let records: Vec<StatusRecord> = response.json().await.map_err(|e| {
            StoreError::PersistenceUnavailable(format!("invalid response body from {path}: {e}"))
        })?;
        debug!(%user_id, game_id, found = records.len(), "fetched status records");
        Ok(records.into_iter().next())
    }

    async fn upsert_status(
        &self,
        user_id: &UserId,
        game_id: GameId,
        status: GameStatus,
    ) -> std::result::Result<StatusRecord, StoreError> {
        let path = "games";
        let record = StatusRecord {
            game_id,
            user_id: user_id.clone(),
            current_status: status,
        };
        let response = self
            .send(path, self.request(Method::POST, &["games"]).json(&record))
            .await?;
        check_status(path, response.status())?;
        debug!(%user_id, game_id, %status, "upserted status record");
        Ok(record)
    }

    async fn delete_status(
        &self,
        user_id: &UserId,
        game_id: GameId,
    ) -> std::result::Result<(), StoreError> {
        let path = "games/delete";
        let key = RecordKey {
            game_id,
            user_id: user_id.clone(),
        };
        let response = self
            .send(path, self.request(Method::POST, &["games", "delete"]).json(&key))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(%user_id, game_id, "status record already absent");
            return Ok(());
        }
        check_status(path, response.status())?;
        debug!(%user_id, game_id, "deleted status record");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let config = HttpStoreConfig::new("http://localhost:3000//");
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.bearer_token.is_none());
    }

    #[test]
    fn from_lookup_reads_all_values() {
        let config = HttpStoreConfig::from_lookup(lookup_from(&[
            (ENV_BASE_URL, "https://api.example.com/"),
            (ENV_TOKEN, "tok"),
            (ENV_TIMEOUT_SECS, " 3 "),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.bearer_token.as_deref(), Some("tok"));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn from_lookup_requires_base_url() {
        let err = HttpStoreConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, GameStatusError::Config(ref msg) if msg.contains(ENV_BASE_URL)));
    }

    #[test]
    fn from_lookup_rejects_bad_timeout() {
        let err = HttpStoreConfig::from_lookup(lookup_from(&[
            (ENV_BASE_URL, "http://x"),
            (ENV_TIMEOUT_SECS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, GameStatusError::Config(_)));
    }

    #[test]
    fn debug_redacts_token() {
        let config = HttpStoreConfig::new("http://x").with_bearer_token("hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn status_classification() {
        assert!(check_status("games", StatusCode::OK).is_ok());
        assert!(matches!(
            check_status("games", StatusCode::UNAUTHORIZED),
            Err(StoreError::Unauthorized(_))
        ));
        assert!(matches!(
            check_status("games", StatusCode::FORBIDDEN),
            Err(StoreError::Unauthorized(_))
        ));
        assert!(matches!(
            check_status("games", StatusCode::BAD_GATEWAY),
            Err(StoreError::PersistenceUnavailable(_))
        ));
    }

    #[test]
    fn endpoint_encodes_each_segment() {
        let store = HttpStatusStore::new(HttpStoreConfig::new("http://localhost:3000/api/")).unwrap();
        assert_eq!(
            store.endpoint(&["games", "a/../b?c#d", "7"]).as_str(),
            "http://localhost:3000/api/games/a%2F..%2Fb%3Fc%23d/7"
        );
        let bare = HttpStatusStore::new(HttpStoreConfig::new("http://localhost:3000")).unwrap();
        assert_eq!(
            bare.endpoint(&["games", "delete"]).as_str(),
            "http://localhost:3000/games/delete"
        );
    }

    #[test]
    fn unusable_base_url_is_a_config_error() {
        for base in ["not a url", "mailto:someone@example.com"] {
            let err = HttpStatusStore::new(HttpStoreConfig::new(base)).unwrap_err();
            assert!(matches!(err, GameStatusError::Config(_)), "{base}: {err:?}");
        }
    }

    #[test]
    fn http_store_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpStatusStore>();
    }
}
