//! Google tools against a local mock of the REST APIs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use agentexec_core::credential::{Credential, CredentialProvider};
use agentexec_core::error::{CredentialError, ToolError};
use agentexec_core::tool::{Tool, ToolContext};
use agentexec_tools::google::{
    GmailTool, GoogleApi, GoogleCalendarTool, GoogleEndpoints, GoogleSheetsTool,
};
use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde_json::{Value, json};

// ── Credentials ──────────────────────────────────────────────────────────

struct RotatingCredentials {
    scopes: Vec<String>,
    refreshes: AtomicUsize,
}

impl RotatingCredentials {
    fn new(scopes: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            refreshes: AtomicUsize::new(0),
        })
    }

    fn bundle(&self, token: &str) -> Credential {
        Credential {
            user_id: "u1".into(),
            service: "google".into(),
            access_token: token.into(),
            refresh_token: Some("refresh".into()),
            scopes: self.scopes.clone(),
            expires_at: None,
            updated_at: chrono::Utc::now(),
        }
    }
}

#[async_trait]
impl CredentialProvider for RotatingCredentials {
    async fn get_tokens(&self, _user_id: &str, _service: &str) -> Result<Credential, CredentialError> {
        Ok(self.bundle("stale"))
    }

    async fn refresh(
        &self,
        _user_id: &str,
        _service: &str,
    ) -> Result<Option<Credential>, CredentialError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.bundle("fresh")))
    }
}

// ── Mock server ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Hits(Arc<AtomicUsize>);

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer fresh")
}

async fn list_events(
    State(hits): State<Hits>,
    Path(calendar): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    hits.0.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": {"message": "expired"}})));
    }
    let wants = |k: &str, v: &str| query.iter().any(|(qk, qv)| qk == k && qv == v);
    assert!(wants("singleEvents", "true"));
    assert!(wants("orderBy", "startTime"));
    assert!(wants("maxResults", "2"));
    (
        StatusCode::OK,
        Json(json!({
            "items": [{
                "id": "ev1",
                "summary": format!("Sync on {calendar}"),
                "start": {"dateTime": "2024-05-01T10:00:00Z"},
                "end": {"dateTime": "2024-05-01T10:30:00Z"}
            }]
        })),
    )
}

async fn always_unauthorized(State(hits): State<Hits>) -> StatusCode {
    hits.0.fetch_add(1, Ordering::SeqCst);
    StatusCode::UNAUTHORIZED
}

async fn send_message(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    assert!(body["raw"].as_str().is_some_and(|r| !r.is_empty()));
    (StatusCode::OK, Json(json!({"id": "m1", "threadId": "t1"})))
}

async fn forbidden(_headers: HeaderMap) -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": {
                "message": "Request had insufficient authentication scopes.",
                "errors": [{"reason": "insufficientPermissions"}]
            }
        })),
    )
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn api(base: &str, credentials: Arc<RotatingCredentials>) -> GoogleApi {
    GoogleApi::new(credentials).with_endpoints(GoogleEndpoints::single(base))
}

fn ctx() -> ToolContext {
    ToolContext::new("u1", "agent-1")
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn calendar_refreshes_once_after_401() {
    let hits = Hits::default();
    let router = Router::new()
        .route("/calendar/v3/calendars/{calendar}/events", get(list_events))
        .with_state(hits.clone());
    let base = serve(router).await;
    let credentials = RotatingCredentials::new(&[]);
    let tool = GoogleCalendarTool::new(api(&base, credentials.clone()));

    let result = tool
        .execute(&ctx(), json!({"action": "list_events", "max_results": 2}))
        .await
        .unwrap();

    let data = result.data.unwrap();
    assert_eq!(data["count"], 1);
    assert_eq!(data["events"][0]["summary"], "Sync on primary");
    assert_eq!(data["events"][0]["start"], "2024-05-01T10:00:00Z");
    assert_eq!(hits.0.load(Ordering::SeqCst), 2);
    assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_401_is_reported_as_expired() {
    let hits = Hits::default();
    let router = Router::new()
        .route("/v4/spreadsheets/{id}/values/{range}", get(always_unauthorized))
        .with_state(hits.clone());
    let base = serve(router).await;
    let credentials = RotatingCredentials::new(&[]);
    let tool = GoogleSheetsTool::new(api(&base, credentials.clone()));

    let err = tool
        .execute(&ctx(), json!({"spreadsheet_id": "sheet-1"}))
        .await
        .unwrap_err();

    assert!(matches!(err, ToolError::Credential(CredentialError::Expired { .. })));
    assert_eq!(
        err.to_string(),
        "Google authentication expired. Reconnect your Google account to restore access."
    );
    assert_eq!(hits.0.load(Ordering::SeqCst), 2);
    assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gmail_send_posts_raw_message() {
    let router = Router::new().route("/gmail/v1/users/me/messages/send", post(send_message));
    let base = serve(router).await;
    let credentials = RotatingCredentials::new(&["https://www.googleapis.com/auth/gmail.send"]);
    let tool = GmailTool::new(api(&base, credentials.clone()));

    let result = tool
        .execute(
            &ctx(),
            json!({"to": "a@example.com", "subject": "Hi", "body": "Hello there"}),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gmail_send_without_send_scope_is_refused_locally() {
    let credentials =
        RotatingCredentials::new(&["https://www.googleapis.com/auth/gmail.readonly"]);
    let tool = GmailTool::new(api("http://127.0.0.1:9", credentials));

    let err = tool
        .execute(
            &ctx(),
            json!({"action": "send", "to": "a@example.com", "subject": "Hi", "body": "x"}),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ToolError::Credential(CredentialError::InsufficientScope { .. })
    ));
}

#[tokio::test]
async fn forbidden_scope_response_maps_to_insufficient_scope() {
    let router = Router::new().route("/gmail/v1/users/me/drafts", post(forbidden));
    let base = serve(router).await;
    let tool = GmailTool::new(api(&base, RotatingCredentials::new(&[])));

    let err = tool
        .execute(
            &ctx(),
            json!({"action": "create_draft", "to": "a@example.com", "body": "Notes"}),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ToolError::Credential(CredentialError::InsufficientScope { .. })
    ));
}
