//! OAuth-style credential bundles and the traits that read and renew them.

use crate::error::{CredentialError, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user, per-service token bundle. At most one per (user, service).
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub service: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("service", &self.service)
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Persistence for credential bundles.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credential(
        &self,
        user_id: &str,
        service: &str,
    ) -> std::result::Result<Option<Credential>, StoreError>;

    /// Insert or replace the bundle for (user, service).
    async fn put_credential(&self, credential: Credential) -> std::result::Result<(), StoreError>;

    async fn delete_credential(
        &self,
        user_id: &str,
        service: &str,
    ) -> std::result::Result<bool, StoreError>;
}

/// The read/renew contract tools rely on.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current bundle for the user, or `CredentialError::Missing`.
    async fn get_tokens(
        &self,
        user_id: &str,
        service: &str,
    ) -> std::result::Result<Credential, CredentialError>;

    /// Renew the access token. `Ok(None)` means there is nothing to refresh with.
    async fn refresh(
        &self,
        user_id: &str,
        service: &str,
    ) -> std::result::Result<Option<Credential>, CredentialError>;
}
