use std::path::PathBuf;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use reqwest::Client;

use crate::{config, types::Token};

/// Client-credentials token for the Spotify Web API, cached on disk and
/// refreshed shortly before it expires.
pub struct TokenManager {
    client_id: String,
    client_secret: String,
    token_url: String,
    cache_path: PathBuf,
    token: Option<Token>,
}

impl TokenManager {
    pub fn new(client_id: String, client_secret: String, cache_path: PathBuf) -> Self {
        TokenManager {
            client_id,
            client_secret,
            token_url: config::spotify_apitoken_url(),
            cache_path,
            token: None,
        }
    }

    /// Builds a manager from the environment and picks up a cached token.
    pub async fn load(cache_path: PathBuf) -> Result<Self, String> {
        let client_id = config::spotify_client_id()
            .ok_or("SPOTIFY_API_AUTH_CLIENT_ID is not set")?;
        let client_secret = config::spotify_client_secret()
            .ok_or("SPOTIFY_API_AUTH_CLIENT_SECRET is not set")?;

        let mut manager = Self::new(client_id, client_secret, cache_path);
        if let Ok(content) = async_fs::read_to_string(&manager.cache_path).await {
            manager.token = serde_json::from_str(&content).ok();
        }
        Ok(manager)
    }

    pub async fn persist(&self) -> Result<(), String> {
        let Some(token) = &self.token else {
            return Ok(());
        };
        if let Some(parent) = self.cache_path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(token).map_err(|e| e.to_string())?;
        async_fs::write(&self.cache_path, json)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn get_valid_token(&mut self) -> Result<String, String> {
        if let Some(token) = &self.token {
            if !Self::is_expired(token) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.request_token().await?;
        let access = token.access_token.clone();
        self.token = Some(token);
        let _ = self.persist().await;
        Ok(access)
    }

    /// Drops the current token so the next call fetches a fresh one.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    fn is_expired(token: &Token) -> bool {
        let now = Utc::now().timestamp() as u64;
        now + 240 >= token.obtained_at + token.expires_in
    }

    async fn request_token(&self) -> Result<Token, String> {
        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));

        let res = Client::new()
            .post(&self.token_url)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !res.status().is_success() {
            return Err(format!("token request rejected with {}", res.status()));
        }

        let json: serde_json::Value = res.json().await.map_err(|e| e.to_string())?;
        let access_token = json["access_token"]
            .as_str()
            .ok_or("token response carried no access_token")?
            .to_string();

        Ok(Token {
            access_token,
            expires_in: json["expires_in"].as_u64().unwrap_or(3600),
            obtained_at: Utc::now().timestamp() as u64,
        })
    }
}
