//! Google Workspace tools: Gmail, Sheets and Calendar.
//!
//! Each tool is a single name with an `action` field. Arguments are decoded
//! into a per-tool action enum (explicit tag, or inferred from which fields
//! are present) before any network call, so argument mistakes come back as
//! validation errors without touching the API.
//!
//! Every action runs under [`call_with_refresh`]: a 401 from Google triggers
//! exactly one token refresh and one retry of the whole action.

pub mod calendar;
pub mod gmail;
pub mod sheets;

pub use calendar::GoogleCalendarTool;
pub use gmail::GmailTool;
pub use sheets::GoogleSheetsTool;

use agentexec_core::credential::{Credential, CredentialProvider};
use agentexec_core::error::{CredentialError, ToolError};
use agentexec_credentials::{GOOGLE_SERVICE, display_name};
use reqwest::{Method, Url};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A failed Google API call.
#[derive(Debug, Clone, Error)]
pub enum GoogleApiError {
    /// HTTP 401. Consumed by [`call_with_refresh`].
    #[error("HTTP 401: invalid or expired access token")]
    Unauthorized,

    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// Google's machine-readable reason, e.g. `insufficientPermissions`.
        reason: Option<String>,
    },

    #[error("{0}")]
    Transport(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl GoogleApiError {
    /// Whether Google rejected the call for missing OAuth scopes.
    pub fn is_insufficient_scope(&self) -> bool {
        matches!(
            self,
            Self::Status { status: 403, reason: Some(r), .. } if r == "insufficientPermissions"
        ) || matches!(
            self,
            Self::Status { status: 403, message, .. } if message.contains("insufficient")
        )
    }

    /// Credential problems stay credential errors; everything else is an
    /// execution failure prefixed with the API's name.
    pub(crate) fn into_tool_error(self, tool: &str, api: &str) -> ToolError {
        match self {
            Self::Credential(e) => ToolError::Credential(e),
            other => ToolError::failed(tool, format!("{api} API error: {other}")),
        }
    }
}

/// Run `operation` with the user's current token, refreshing at most once.
///
/// The operation receives the whole credential bundle so it can check
/// scopes. When it reports [`GoogleApiError::Unauthorized`], the provider is
/// asked to refresh and the operation runs a second time with the new
/// bundle. A refresh that yields nothing, or a second 401, ends the call
/// with [`CredentialError::Expired`]; there is never a third attempt.
pub async fn call_with_refresh<T, F, Fut>(
    credentials: &dyn CredentialProvider,
    user_id: &str,
    service: &str,
    mut operation: F,
) -> Result<T, GoogleApiError>
where
    F: FnMut(Credential) -> Fut,
    Fut: Future<Output = Result<T, GoogleApiError>>,
{
    let expired = || {
        GoogleApiError::Credential(CredentialError::Expired {
            service: display_name(service),
        })
    };

    let credential = credentials.get_tokens(user_id, service).await?;
    match operation(credential).await {
        Err(GoogleApiError::Unauthorized) => {}
        other => return other,
    }

    info!(user_id, service, "Refreshing credentials after API 401");
    let Some(refreshed) = credentials.refresh(user_id, service).await? else {
        warn!(user_id, service, "No refreshed credentials available");
        return Err(expired());
    };

    match operation(refreshed).await {
        Err(GoogleApiError::Unauthorized) => {
            warn!(user_id, service, "API still unauthorized after refresh");
            Err(expired())
        }
        other => other,
    }
}

/// Base URLs of the Google REST APIs. Overridable for tests.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub gmail: String,
    pub sheets: String,
    pub calendar: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            gmail: "https://gmail.googleapis.com/gmail/v1/users/me".into(),
            sheets: "https://sheets.googleapis.com/v4/spreadsheets".into(),
            calendar: "https://www.googleapis.com/calendar/v3".into(),
        }
    }
}

impl GoogleEndpoints {
    /// All three APIs served from one base (a local mock server).
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            gmail: format!("{base}/gmail/v1/users/me"),
            sheets: format!("{base}/v4/spreadsheets"),
            calendar: format!("{base}/calendar/v3"),
        }
    }
}

/// Shared HTTP plumbing for the Google tools.
#[derive(Clone)]
pub struct GoogleApi {
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    endpoints: GoogleEndpoints,
}

impl GoogleApi {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            credentials,
            endpoints: GoogleEndpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn endpoints(&self) -> &GoogleEndpoints {
        &self.endpoints
    }

    /// [`call_with_refresh`] against the user's Google bundle.
    pub async fn with_credentials<T, F, Fut>(
        &self,
        user_id: &str,
        operation: F,
    ) -> Result<T, GoogleApiError>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T, GoogleApiError>>,
    {
        call_with_refresh(self.credentials.as_ref(), user_id, GOOGLE_SERVICE, operation).await
    }

    /// `base` with percent-encoded path segments appended.
    pub(crate) fn url(base: &str, segments: &[&str]) -> Result<Url, GoogleApiError> {
        let mut url = Url::parse(base)
            .map_err(|e| GoogleApiError::Transport(format!("invalid endpoint '{base}': {e}")))?;
        url.path_segments_mut()
            .map_err(|_| GoogleApiError::Transport(format!("endpoint '{base}' cannot take a path")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) async fn get(
        &self,
        token: &str,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<Value, GoogleApiError> {
        self.send(Method::GET, token, url, query, None).await
    }

    pub(crate) async fn post(
        &self,
        token: &str,
        url: Url,
        body: &Value,
    ) -> Result<Value, GoogleApiError> {
        self.send(Method::POST, token, url, &[], Some(body)).await
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        token: &str,
        url: Url,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, GoogleApiError> {
        debug!(method = %method, url = %url, "Google API request");

        let mut request = self.client.request(method, url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GoogleApiError::Transport("request timed out".into())
            } else {
                GoogleApiError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(GoogleApiError::Unauthorized);
        }

        let text = response
            .text()
            .await
            .map_err(|e| GoogleApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            let (message, reason) = error_details(&text);
            return Err(GoogleApiError::Status {
                status: status.as_u16(),
                message: message.unwrap_or_else(|| {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                }),
                reason,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&text)
            .map_err(|e| GoogleApiError::Transport(format!("invalid JSON response: {e}")))
    }
}

/// Pull `error.message` and the first `error.errors[].reason` out of a
/// Google error body.
fn error_details(body: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        let trimmed = body.trim();
        return ((!trimmed.is_empty()).then(|| trimmed.to_string()), None);
    };
    let error = &value["error"];
    let message = error["message"].as_str().map(String::from);
    let reason = error["errors"][0]["reason"]
        .as_str()
        .or_else(|| error["status"].as_str())
        .map(String::from);
    (message, reason)
}
