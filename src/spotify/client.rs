use std::fmt;

use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::{config, management::TokenManager};

/// Failure of a single Spotify Web API request.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// HTTP 429, with the `Retry-After` hint in seconds when present.
    RateLimited { retry_after: Option<u64> },
    Status { status: u16, message: String },
    Auth(String),
    Transport(String),
    Decode(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::RateLimited {
                retry_after: Some(secs),
            } => write!(f, "rate limited (retry after {}s)", secs),
            ApiError::RateLimited { retry_after: None } => write!(f, "rate limited"),
            ApiError::Status { status, message } => write!(f, "HTTP {}: {}", status, message),
            ApiError::Auth(e) => write!(f, "authentication failed: {}", e),
            ApiError::Transport(e) => write!(f, "request failed: {}", e),
            ApiError::Decode(e) => write!(f, "unexpected response: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Parses a `Retry-After` value given in whole seconds.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

/// Thin authenticated JSON client for the Spotify Web API. Retry policy
/// lives in the gateway, not here.
pub struct SpotifyClient {
    http: Client,
    base_url: String,
    tokens: Mutex<TokenManager>,
}

impl SpotifyClient {
    pub fn new(tokens: TokenManager) -> Self {
        Self {
            http: Client::new(),
            base_url: config::spotify_apiurl(),
            tokens: Mutex::new(tokens),
        }
    }

    /// Absolute URL for an API path; pagination cursors are already absolute.
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let token = self
            .tokens
            .lock()
            .await
            .get_valid_token()
            .await
            .map_err(ApiError::Auth)?;

        let response = self
            .http
            .get(self.endpoint(path))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(ApiError::RateLimited { retry_after });
        }

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.lock().await.invalidate();
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(ApiError::from)
    }
}
