//! Remote API gateway
//!
//! The coordinator talks to the backend exclusively through the [`Remote`]
//! trait so tests can substitute a scripted implementation. The reqwest
//! implementation carries a fixed timeout and classifies every failure
//! into the shared error taxonomy: the coordinator only degrades on
//! connectivity-class errors.

use async_trait::async_trait;
use raid_common::{RaidError, Result};
use raid_config::RemoteConfig;
use serde_json::Value;

/// HTTP method subset used by the sync protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Authenticated request/response gateway to the backend
#[async_trait]
pub trait Remote: Send + Sync {
    /// Issue one request. `token` is injected per call; implementations
    /// must never cache it.
    async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value>;
}

/// Supplies the current auth token before every authenticated write
pub trait AuthProvider: Send + Sync {
    fn current_token(&self) -> Option<String>;
}

/// Fixed-token provider, suitable for tests and single-session callers
pub struct StaticToken(pub Option<String>);

impl AuthProvider for StaticToken {
    fn current_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// reqwest-backed [`Remote`]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RaidError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        tracing::debug!(method = method.as_str(), %url, "remote request");

        let mut request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status().as_u16();

        if (200..300).contains(&status) {
            if status == 204 {
                return Ok(Value::Null);
            }
            let value = response
                .json::<Value>()
                .await
                .map_err(|e| RaidError::Mapping(format!("malformed response body: {}", e)))?;
            return Ok(value);
        }

        let fields = response.json::<Value>().await.unwrap_or(Value::Null);
        Err(classify_status(status, fields))
    }
}

fn classify_transport(error: reqwest::Error) -> RaidError {
    if error.is_timeout() {
        RaidError::Connectivity("request timed out".to_string())
    } else {
        RaidError::Connectivity(error.to_string())
    }
}

/// Map an HTTP status to the shared taxonomy.
///
/// 5xx counts as connectivity-class so callers fall back to the cache;
/// the status is kept in the message for logging.
pub fn classify_status(status: u16, fields: Value) -> RaidError {
    match status {
        401 => RaidError::Auth(message_from(&fields, "token rejected")),
        403 => RaidError::Permission(message_from(&fields, "forbidden")),
        404 => RaidError::NotFound,
        422 => RaidError::Validation { fields },
        500..=599 => RaidError::Connectivity(format!("server error {}", status)),
        _ => RaidError::UnexpectedStatus { status },
    }
}

fn message_from(fields: &Value, fallback: &str) -> String {
    fields
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}
