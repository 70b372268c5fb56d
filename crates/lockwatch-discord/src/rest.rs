//! Thin Discord REST client shared by the notifier and the gateway.

use std::time::Duration;

use lockwatch_core::NotifierError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Discord REST API root (v10).
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for Discord.
#[derive(Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
    pub channel_id: u64,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl DiscordConfig {
    pub fn new(bot_token: impl Into<String>, channel_id: u64) -> Self {
        Self {
            bot_token: bot_token.into(),
            channel_id,
            api_base: DISCORD_API_BASE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .field("api_base", &self.api_base)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Errors that can occur while building the client.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// Bot token contains characters not allowed in a header.
    #[error("bot token is not a valid header value")]
    InvalidToken,

    /// The underlying HTTP client could not be created.
    #[error("failed to build HTTP client: {0}")]
    Http(String),
}

/// Authenticated REST client.
///
/// Cheap to clone; the connection pool is shared.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    api_base: String,
}

impl RestClient {
    /// Creates a client with the bot token installed as a default header.
    pub fn new(config: &DiscordConfig) -> Result<Self, ClientBuildError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bot {}", config.bot_token))
            .map_err(|_| ClientBuildError::InvalidToken)?;
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .user_agent(concat!(
                "DiscordBot (https://github.com/damelLP/lockwatch, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|e| ClientBuildError::Http(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the API root requests are sent to.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// `GET {api_base}{path}` and decode the JSON body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, NotifierError> {
        let request = self.http.get(self.url(path));
        let response = self.send(request, "GET", path).await?;
        response
            .json()
            .await
            .map_err(|e| NotifierError::InvalidResponse(e.to_string()))
    }

    /// `POST {api_base}{path}` with a JSON body and decode the JSON reply.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, NotifierError> {
        let request = self.http.post(self.url(path)).json(body);
        let response = self.send(request, "POST", path).await?;
        response
            .json()
            .await
            .map_err(|e| NotifierError::InvalidResponse(e.to_string()))
    }

    /// `POST {api_base}{path}` with a JSON body, ignoring the reply body.
    pub async fn post_empty<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), NotifierError> {
        let request = self.http.post(self.url(path)).json(body);
        self.send(request, "POST", path).await.map(|_| ())
    }

    /// `PATCH {api_base}{path}` with a JSON body, ignoring the reply body.
    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), NotifierError> {
        let request = self.http.patch(self.url(path)).json(body);
        self.send(request, "PATCH", path).await.map(|_| ())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        method: &str,
        path: &str,
    ) -> Result<reqwest::Response, NotifierError> {
        debug!(method, path = %redact_path(path), "Discord request");

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::Unavailable(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(NotifierError::Unavailable(format!(
            "HTTP {} on {method} {}: {text}",
            status.as_u16(),
            redact_path(path)
        )))
    }
}

/// Strips interaction tokens from a path before it is logged.
fn redact_path(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').collect();
    let token_index = match segments.get(1) {
        Some(&"webhooks") => Some(3),
        Some(&"interactions") => Some(3),
        _ => None,
    };
    if let Some(slot) = token_index.and_then(|i| segments.get_mut(i)) {
        *slot = "<token>";
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_debug_redacts_token() {
        let config = DiscordConfig::new("super-secret-token", 42);
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("42"));
    }

    #[test]
    fn test_rest_client_trims_base() {
        let mut config = DiscordConfig::new("token", 1);
        config.api_base = "http://127.0.0.1:9/api/".to_string();
        let client = RestClient::new(&config).unwrap();
        assert_eq!(client.api_base(), "http://127.0.0.1:9/api");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let config = DiscordConfig::new("bad\ntoken", 1);
        assert!(matches!(
            RestClient::new(&config),
            Err(ClientBuildError::InvalidToken)
        ));
    }

    #[test]
    fn test_redact_path() {
        assert_eq!(
            redact_path("/webhooks/123/secret-token"),
            "/webhooks/123/<token>"
        );
        assert_eq!(
            redact_path("/interactions/999/secret-token/callback"),
            "/interactions/999/<token>/callback"
        );
        assert_eq!(redact_path("/channels/1/messages"), "/channels/1/messages");
    }
}
