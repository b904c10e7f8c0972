//! Credential service: save, read, refresh and revoke token bundles.

use crate::oauth::TokenRefresher;
use crate::scopes::{merge_scopes, missing_scopes, parse_scope_string};
use agentexec_core::credential::{Credential, CredentialProvider, CredentialStore};
use agentexec_core::error::CredentialError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
/// Longest lifetime taken from a token endpoint (one year).
const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 3600;

/// A token bundle arriving from an OAuth callback.
#[derive(Debug, Clone, Default)]
pub struct NewToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

/// "google" → "Google", for user-facing messages.
pub fn display_name(service: &str) -> String {
    let mut chars = service.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn store_error(e: impl std::fmt::Display) -> CredentialError {
    CredentialError::Store(e.to_string())
}

impl CredentialService {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            refresher: None,
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Upsert the bundle for (user, service).
    ///
    /// An existing refresh token survives when the new grant carries none,
    /// and the scope set only ever grows.
    pub async fn save_token(
        &self,
        user_id: &str,
        service: &str,
        token: NewToken,
    ) -> Result<Credential, CredentialError> {
        let existing = self
            .store
            .get_credential(user_id, service)
            .await
            .map_err(store_error)?;

        let granted = crate::scopes::normalize_scopes(&token.scopes);
        let (refresh_token, scopes) = match existing {
            Some(old) => (
                token.refresh_token.or(old.refresh_token),
                merge_scopes(&old.scopes, &granted),
            ),
            None => (token.refresh_token, granted),
        };

        let credential = Credential {
            user_id: user_id.to_string(),
            service: service.to_string(),
            access_token: token.access_token,
            refresh_token,
            scopes,
            expires_at: token.expires_at,
            updated_at: Utc::now(),
        };
        self.store
            .put_credential(credential.clone())
            .await
            .map_err(store_error)?;

        info!(user_id, service, scopes = credential.scopes.len(), "Credential saved");
        Ok(credential)
    }

    /// A usable access token, refreshing first when the stored one expired.
    pub async fn access_token(
        &self,
        user_id: &str,
        service: &str,
    ) -> Result<String, CredentialError> {
        Ok(self.get_tokens(user_id, service).await?.access_token)
    }

    /// Required scopes the stored grant lacks. A missing bundle lacks all of them.
    pub async fn missing_scopes<S: AsRef<str> + Sync>(
        &self,
        user_id: &str,
        service: &str,
        required: &[S],
    ) -> Result<Vec<String>, CredentialError> {
        let granted = self
            .store
            .get_credential(user_id, service)
            .await
            .map_err(store_error)?
            .map(|c| c.scopes)
            .unwrap_or_default();
        Ok(missing_scopes(&granted, required))
    }

    pub async fn has_scopes<S: AsRef<str> + Sync>(
        &self,
        user_id: &str,
        service: &str,
        required: &[S],
    ) -> Result<bool, CredentialError> {
        Ok(self
            .missing_scopes(user_id, service, required)
            .await?
            .is_empty())
    }

    /// Revoke at the provider (best effort) and delete locally.
    ///
    /// Returns whether a bundle existed.
    pub async fn revoke(&self, user_id: &str, service: &str) -> Result<bool, CredentialError> {
        let Some(credential) = self
            .store
            .get_credential(user_id, service)
            .await
            .map_err(store_error)?
        else {
            return Ok(false);
        };

        if let Some(refresher) = &self.refresher {
            if let Err(e) = refresher.revoke(&credential.access_token).await {
                warn!(user_id, service, error = %e, "Remote token revocation failed, deleting locally");
            }
        }

        self.store
            .delete_credential(user_id, service)
            .await
            .map_err(store_error)
    }
}

#[async_trait]
impl CredentialProvider for CredentialService {
    async fn get_tokens(
        &self,
        user_id: &str,
        service: &str,
    ) -> Result<Credential, CredentialError> {
        let credential = self
            .store
            .get_credential(user_id, service)
            .await
            .map_err(store_error)?
            .ok_or_else(|| CredentialError::Missing {
                service: display_name(service),
            })?;

        if !credential.is_expired(Utc::now()) {
            return Ok(credential);
        }

        debug!(user_id, service, "Stored access token expired, refreshing");
        self.refresh(user_id, service)
            .await?
            .ok_or_else(|| CredentialError::Expired {
                service: display_name(service),
            })
    }

    async fn refresh(
        &self,
        user_id: &str,
        service: &str,
    ) -> Result<Option<Credential>, CredentialError> {
        let Some(refresher) = &self.refresher else {
            debug!(service, "No token refresher configured");
            return Ok(None);
        };

        let Some(mut credential) = self
            .store
            .get_credential(user_id, service)
            .await
            .map_err(store_error)?
        else {
            return Ok(None);
        };

        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Ok(None);
        };

        let grant = refresher.refresh(&refresh_token).await?;

        let now = Utc::now();
        credential.access_token = grant.access_token;
        credential.expires_at = Some(expiry_after(now, grant.expires_in));
        if let Some(rotated) = grant.refresh_token {
            credential.refresh_token = Some(rotated);
        }
        if let Some(scope) = grant.scope.as_deref() {
            credential.scopes = merge_scopes(&credential.scopes, &parse_scope_string(scope));
        }
        credential.updated_at = now;

        self.store
            .put_credential(credential.clone())
            .await
            .map_err(store_error)?;

        info!(user_id, service, "Access token refreshed");
        Ok(Some(credential))
    }
}

/// When a freshly granted token expires, with `expires_in` clamped to
/// `0..=MAX_EXPIRES_IN_SECS`.
fn expiry_after(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let secs = expires_in
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
        .clamp(0, MAX_EXPIRES_IN_SECS);
    Duration::try_seconds(secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::TokenGrant;
    use agentexec_store::InMemoryStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRefresher {
        calls: AtomicUsize,
        revoked: Mutex<Vec<String>>,
        fail: bool,
        expires_in: Option<i64>,
    }

    impl FakeRefresher {
        fn new(fail: bool) -> Arc<Self> {
            Self::granting(fail, Some(120))
        }

        fn granting(fail: bool, expires_in: Option<i64>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                revoked: Mutex::new(Vec::new()),
                fail,
                expires_in,
            })
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(CredentialError::RefreshFailed("invalid_grant".into()));
            }
            Ok(TokenGrant {
                access_token: format!("fresh-{n}-{refresh_token}"),
                expires_in: self.expires_in,
                refresh_token: None,
                scope: Some("extra".into()),
            })
        }

        async fn revoke(&self, token: &str) -> Result<(), CredentialError> {
            self.revoked.lock().unwrap().push(token.to_string());
            Err(CredentialError::RefreshFailed("offline".into()))
        }
    }

    fn token(access: &str, refresh: Option<&str>, scopes: &[&str], expires_in: i64) -> NewToken {
        NewToken {
            access_token: access.into(),
            refresh_token: refresh.map(String::from),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            expires_at: Some(Utc::now() + Duration::seconds(expires_in)),
        }
    }

    #[tokio::test]
    async fn missing_bundle_is_classified() {
        let svc = CredentialService::new(Arc::new(InMemoryStore::new()));
        let err = svc.get_tokens("u1", "google").await.unwrap_err();
        assert!(matches!(err, CredentialError::Missing { .. }));
        assert!(err.to_string().contains("Google"));
    }

    #[tokio::test]
    async fn save_keeps_refresh_token_and_widens_scopes() {
        let svc = CredentialService::new(Arc::new(InMemoryStore::new()));
        svc.save_token("u1", "google", token("a1", Some("r1"), &["x", "y"], 600))
            .await
            .unwrap();
        let saved = svc
            .save_token("u1", "google", token("a2", None, &["z", "x"], 600))
            .await
            .unwrap();

        assert_eq!(saved.access_token, "a2");
        assert_eq!(saved.refresh_token.as_deref(), Some("r1"));
        assert_eq!(saved.scopes, vec!["x", "y", "z"]);
        assert!(svc.has_scopes("u1", "google", &["y", "z"]).await.unwrap());
        assert_eq!(
            svc.missing_scopes("u1", "google", &["w", "x"]).await.unwrap(),
            vec!["w"]
        );
    }

    #[tokio::test]
    async fn expired_without_refresh_token_is_expired_error() {
        let svc = CredentialService::new(Arc::new(InMemoryStore::new()))
            .with_refresher(FakeRefresher::new(false));
        svc.save_token("u1", "google", token("old", None, &[], -10))
            .await
            .unwrap();

        let err = svc.get_tokens("u1", "google").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Google authentication expired. Reconnect your Google account to restore access."
        );
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_transparently() {
        let refresher = FakeRefresher::new(false);
        let svc = CredentialService::new(Arc::new(InMemoryStore::new()))
            .with_refresher(refresher.clone());
        svc.save_token("u1", "google", token("old", Some("r1"), &["x"], -10))
            .await
            .unwrap();

        let access = svc.access_token("u1", "google").await.unwrap();
        assert_eq!(access, "fresh-1-r1");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        let stored = svc.get_tokens("u1", "google").await.unwrap();
        assert_eq!(stored.scopes, vec!["x", "extra"]);
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
        // Still valid, no second refresh
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_without_refresher_or_bundle_is_none() {
        let svc = CredentialService::new(Arc::new(InMemoryStore::new()));
        assert!(svc.refresh("u1", "google").await.unwrap().is_none());

        let svc = svc.with_refresher(FakeRefresher::new(false));
        assert!(svc.refresh("u1", "google").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_failure_propagates() {
        let svc = CredentialService::new(Arc::new(InMemoryStore::new()))
            .with_refresher(FakeRefresher::new(true));
        svc.save_token("u1", "google", token("old", Some("r1"), &[], 600))
            .await
            .unwrap();
        assert!(matches!(
            svc.refresh("u1", "google").await,
            Err(CredentialError::RefreshFailed(_))
        ));
    }

    #[tokio::test]
    async fn revoke_deletes_even_when_remote_fails() {
        let refresher = FakeRefresher::new(false);
        let svc = CredentialService::new(Arc::new(InMemoryStore::new()))
            .with_refresher(refresher.clone());
        svc.save_token("u1", "google", token("at", None, &[], 600))
            .await
            .unwrap();

        assert!(svc.revoke("u1", "google").await.unwrap());
        assert_eq!(refresher.revoked.lock().unwrap().as_slice(), ["at"]);
        assert!(!svc.revoke("u1", "google").await.unwrap());
    }

    #[test]
    fn granted_lifetimes_are_clamped() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, None), now + Duration::seconds(3600));
        assert_eq!(expiry_after(now, Some(-50)), now);
        assert_eq!(
            expiry_after(now, Some(i64::MAX)),
            now + Duration::seconds(MAX_EXPIRES_IN_SECS)
        );
    }

    #[tokio::test]
    async fn absurd_expires_in_from_the_endpoint_is_stored_clamped() {
        let svc = CredentialService::new(Arc::new(InMemoryStore::new()))
            .with_refresher(FakeRefresher::granting(false, Some(i64::MAX)));
        svc.save_token("u1", "google", token("old", Some("r1"), &[], -10))
            .await
            .unwrap();

        let refreshed = svc.refresh("u1", "google").await.unwrap().unwrap();
        let expires_at = refreshed.expires_at.unwrap();
        assert!(expires_at <= Utc::now() + Duration::seconds(MAX_EXPIRES_IN_SECS));
        assert!(expires_at > Utc::now() + Duration::days(364));
    }
}
