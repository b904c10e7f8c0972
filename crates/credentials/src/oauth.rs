//! OAuth token endpoint client (refresh grant and revocation).

use agentexec_config::GoogleConfig;
use agentexec_core::error::CredentialError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// The token endpoint's answer to a refresh grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Some providers rotate the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Space-delimited scopes actually granted.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Exchanges refresh tokens for new access tokens.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, CredentialError>;

    /// Invalidate a token at the provider.
    async fn revoke(&self, token: &str) -> Result<(), CredentialError>;
}

/// Google's OAuth 2.0 endpoints.
pub struct GoogleOAuthClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    revoke_url: String,
}

impl GoogleOAuthClient {
    /// Returns `None` when the client id or secret is not configured.
    pub fn from_config(config: &GoogleConfig) -> Option<Self> {
        let client_id = config.client_id.clone().filter(|s| !s.is_empty())?;
        let client_secret = config.client_secret.clone().filter(|s| !s.is_empty())?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Some(Self {
            client,
            client_id,
            client_secret,
            token_url: config.token_url.clone(),
            revoke_url: config.revoke_url.clone(),
        })
    }
}

#[async_trait]
impl TokenRefresher for GoogleOAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, CredentialError> {
        debug!(token_url = %self.token_url, "Requesting token refresh");

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Token refresh rejected");
            return Err(CredentialError::RefreshFailed(format!(
                "token endpoint returned HTTP {}: {body}",
                status.as_u16()
            )));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| CredentialError::RefreshFailed(format!("invalid token response: {e}")))
    }

    async fn revoke(&self, token: &str) -> Result<(), CredentialError> {
        let response = self
            .client
            .post(&self.revoke_url)
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CredentialError::RefreshFailed(format!(
                "revoke endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}
