//! Backend HTTP client
//!
//! Thin wrapper over `reqwest` that speaks the backend's JSON contract and
//! classifies every failure into a [`FetchError`].

use mentorlens_core::{BackendConfig, FetchError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Longest error body kept in a [`FetchError::Status`] message
const MAX_ERROR_BODY: usize = 200;

/// Client construction errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),

    #[error("failed to build http client: {0}")]
    Build(#[from] reqwest::Error),
}

/// JSON client bound to one backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl BackendClient {
    /// Build a client from configuration
    pub fn from_config(config: &BackendConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidBaseUrl(config.base_url.clone()));
        }

        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("mentorlens/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            bearer_token: config.bearer_token.clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of `path`
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` with `query` and decode the JSON body
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, FetchError> {
        let url = self.url(path);
        let mut request = self.http.get(&url).query(query);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        tracing::debug!(%url, params = query.len(), "GET");
        let response = request.send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(MAX_ERROR_BODY).collect();
            tracing::debug!(%url, status = status.as_u16(), "request failed");
            return Err(FetchError::from_status(status.as_u16(), message, retry_after));
        }

        response.json::<Value>().await.map_err(classify)
    }
}

/// Whether a status means "nothing there" rather than failure
#[must_use]
pub fn is_absent(err: &FetchError) -> bool {
    matches!(err, FetchError::Status { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
}

/// Map a transport-level `reqwest` error
pub(crate) fn classify(err: reqwest::Error) -> FetchError {
    if err.is_decode() {
        FetchError::Decode(err.to_string())
    } else {
        FetchError::Transport(err.to_string())
    }
}

/// `Retry-After` in delta-seconds form
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn config(base_url: &str) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn joins_paths() {
        let client = BackendClient::from_config(&config("https://dash.example.org/")).unwrap();
        assert_eq!(client.url("/api/rows"), "https://dash.example.org/api/rows");
        assert_eq!(client.url("api/rows"), "https://dash.example.org/api/rows");
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            BackendClient::from_config(&config("ftp://files")),
            Err(ClientError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn parses_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn not_found_is_absent() {
        assert!(is_absent(&FetchError::from_status(404, "", None)));
        assert!(!is_absent(&FetchError::from_status(500, "", None)));
    }
}
