//! THAID (national digital ID) OAuth 2.0 authorization code client.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How long an issued `state` stays redeemable
const STATE_TTL: Duration = Duration::from_secs(600);

/// Scopes requested from THAID
const SCOPE: &str = "pid";

#[derive(Debug, thiserror::Error)]
pub enum ThaidError {
    #[error("Unknown or expired OAuth state")]
    UnknownState,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Token endpoint rejected the code ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Token response carried no pid")]
    MissingPid,
}

#[derive(Debug, Clone)]
pub struct ThaidConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub authorize_url: String,
    pub token_url: String,
    pub frontend_redirect_url: String,
    pub request_timeout: Duration,
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct ThaidTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub pid: Option<String>,
}

/// A completed login: the citizen id and the provider's tokens
#[derive(Debug, Clone)]
pub struct ThaidLogin {
    pub pid: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl TryFrom<ThaidTokens> for ThaidLogin {
    type Error = ThaidError;

    fn try_from(tokens: ThaidTokens) -> Result<Self, Self::Error> {
        let pid = tokens
            .pid
            .filter(|pid| !pid.is_empty())
            .ok_or(ThaidError::MissingPid)?;
        Ok(Self {
            pid,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }
}

#[derive(Debug)]
pub struct ThaidClient {
    http: reqwest::Client,
    config: ThaidConfig,
    pending_states: RwLock<HashMap<String, Instant>>,
}

impl ThaidClient {
    pub fn new(config: ThaidConfig) -> Result<Self, ThaidError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            pending_states: RwLock::new(HashMap::new()),
        })
    }

    pub fn frontend_redirect_url(&self) -> &str {
        &self.config.frontend_redirect_url
    }

    /// Build the authorize URL for a fresh login and remember its `state`
    pub async fn authorize_url(&self) -> String {
        let state_bytes: [u8; 16] = rand::thread_rng().gen();
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        {
            let mut pending = self.pending_states.write().await;
            pending.retain(|_, issued| issued.elapsed() < STATE_TTL);
            pending.insert(state.clone(), Instant::now());
        }
        debug!("issued THAID authorization state");

        let separator = if self.config.authorize_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.config.authorize_url,
            separator,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.callback_url),
            urlencoding::encode(SCOPE),
            urlencoding::encode(&state)
        )
    }

    /// Consume `state`; false if it was never issued or has expired
    async fn take_state(&self, state: &str) -> bool {
        let mut pending = self.pending_states.write().await;
        matches!(pending.remove(state), Some(issued) if issued.elapsed() < STATE_TTL)
    }

    /// Exchange an authorization code, authenticating with HTTP Basic
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<ThaidLogin, ThaidError> {
        if !self.take_state(state).await {
            warn!("THAID redirect with unknown state");
            return Err(ThaidError::UnknownState);
        }

        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.callback_url.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ThaidError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let tokens: ThaidTokens = response.json().await?;
        let login = ThaidLogin::try_from(tokens)?;
        info!("THAID code exchanged");
        Ok(login)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ThaidClient {
        ThaidClient::new(ThaidConfig {
            client_id: "client id".to_string(),
            client_secret: "secret".to_string(),
            callback_url: "https://api.example.org/thaid-redirect".to_string(),
            authorize_url: "https://imauth.example.org/oauth2/auth/".to_string(),
            token_url: "http://127.0.0.1:1/token".to_string(),
            frontend_redirect_url: "https://app.example.org/login".to_string(),
            request_timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    fn state_of(url: &str) -> String {
        url.split("state=").nth(1).unwrap().to_string()
    }

    #[tokio::test]
    async fn test_authorize_url_shape() {
        let url = client().authorize_url().await;
        assert!(url.starts_with("https://imauth.example.org/oauth2/auth/?response_type=code"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapi.example.org%2Fthaid-redirect"));
        assert!(url.contains("scope=pid"));
    }

    #[tokio::test]
    async fn test_states_are_single_use() {
        let client = client();
        let state = state_of(&client.authorize_url().await);
        assert!(client.take_state(&state).await);
        assert!(!client.take_state(&state).await);
    }

    #[test]
    fn test_login_requires_non_empty_pid() {
        let tokens = |pid: Option<&str>| ThaidTokens {
            access_token: "at".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
            pid: pid.map(str::to_string),
        };
        assert!(matches!(
            ThaidLogin::try_from(tokens(None)),
            Err(ThaidError::MissingPid)
        ));
        assert!(matches!(
            ThaidLogin::try_from(tokens(Some(""))),
            Err(ThaidError::MissingPid)
        ));
        let login = ThaidLogin::try_from(tokens(Some("1100700000001"))).unwrap();
        assert_eq!(login.pid, "1100700000001");
        assert_eq!(login.access_token, "at");
    }

    #[tokio::test]
    async fn test_unknown_state_rejected_before_network() {
        let client = client();
        assert!(matches!(
            client.exchange_code("code", "forged").await,
            Err(ThaidError::UnknownState)
        ));
    }
}
