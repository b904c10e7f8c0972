//! Gmail: send, read, search, drafts, threads and single messages.

use super::{GoogleApi, GoogleApiError};
use crate::params::{self, Params};
use agentexec_core::credential::Credential;
use agentexec_core::error::{CredentialError, ToolError};
use agentexec_core::tool::{Tool, ToolContext, ToolResult};
use agentexec_credentials::scopes::{GMAIL_SEND_SCOPES, has_any_scope};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use serde_json::{Value, json};
use tracing::debug;

const TOOL_NAME: &str = "gmail";
const API_NAME: &str = "Gmail";

/// Bodies longer than this many characters are cut in parsed messages.
const MAX_BODY_CHARS: usize = 5000;

const UNKNOWN_ACTION: &str = "Missing required parameter 'action'. Provide 'send', 'read', 'search', 'create_draft', or 'get_thread', or include fields (e.g. 'to/subject/body', 'query', 'email_id').";

/// Keys that may carry the message body, most specific first.
const MESSAGE_KEYS: &[&str] = &[
    "message",
    "body",
    "email_body",
    "draft_body",
    "message_body",
    "content",
    "text",
    "body_text",
    "email_content",
    "email_text",
];

const SUBJECT_KEYS: &[&str] = &["subject", "title", "topic", "agenda", "headline"];

const RECIPIENT_KEYS: &[&str] = &[
    "recipient",
    "recipients",
    "recipient_email",
    "to_email",
    "email",
    "email_address",
    "send_to",
];

/// An outgoing message, for both send and create_draft.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: Option<String>,
    pub body: String,
    pub is_html: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadArgs {
    /// A specific message; when absent, the newest matches of `query`.
    pub email_id: Option<String>,
    pub query: String,
    pub max_results: usize,
    pub label_ids: Vec<String>,
    pub mark_as_read: bool,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchArgs {
    pub query: Option<String>,
    pub max_results: usize,
    pub label_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GmailAction {
    Send(OutgoingMessage),
    CreateDraft(OutgoingMessage),
    Read(ReadArgs),
    Search(SearchArgs),
    GetThread { thread_id: String },
    GetMessage { message_id: String, format: String },
}

/// Map an action name or one of its aliases to the canonical name.
pub fn canonical_action(raw: &str) -> Option<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "read" | "open" => Some("read"),
        "get_message" | "get" | "message" | "getmessage" => Some("get_message"),
        "search" | "list" | "find" => Some("search"),
        "send" | "send_message" | "send_email" => Some("send"),
        "create_draft" | "draft" | "save_draft" => Some("create_draft"),
        "get_thread" | "thread" => Some("get_thread"),
        _ => None,
    }
}

/// Guess the action from which fields are present.
///
/// Explicit ids win, then anything that looks like composing a message,
/// then a bare id (read), then list/search filters.
pub fn infer_action(params: &Params) -> Option<&'static str> {
    let has = |key: &str| params::is_truthy(params.get(key));

    if has("thread_id") {
        return Some("get_thread");
    }
    if has("message_id") {
        return Some("get_message");
    }
    if ["to", "subject", "body", "message", "cc", "bcc"]
        .iter()
        .any(|k| has(k))
    {
        return Some("send");
    }
    if has("email_id") || has("id") {
        return Some("read");
    }
    if ["max_results", "query", "label_ids", "labelIds"]
        .iter()
        .any(|k| params.contains_key(*k))
    {
        return Some("search");
    }
    None
}

/// Apply field aliases and coerce `label_ids` / `max_results`.
pub fn normalize(mut params: Params) -> Result<Params, ToolError> {
    params::alias(&mut params, "labelIds", "label_ids");
    params::alias(&mut params, "maxResults", "max_results");
    params::alias(&mut params, "messageId", "message_id");
    params::alias(&mut params, "threadId", "thread_id");
    params::alias(&mut params, "message", "body");
    params::alias(&mut params, "body", "message");

    let labels = params::string_list(params.get("label_ids"));
    if labels.is_empty() {
        params.remove("label_ids");
    } else {
        params.insert("label_ids".into(), json!(labels));
    }

    match params::integer(&params, "max_results") {
        Ok(Some(n)) => {
            params.insert("max_results".into(), json!(n));
        }
        Ok(None) => {}
        Err(()) => {
            return Err(ToolError::Validation(
                "Gmail max_results must be an integer value.".into(),
            ));
        }
    }

    Ok(params)
}

impl GmailAction {
    /// Decode tool arguments into an action, validating what it needs.
    pub fn from_params(params: Params) -> Result<Self, ToolError> {
        let params = normalize(params)?;

        let explicit = params::text(&params, &["action"]);
        let action = match explicit.as_deref() {
            Some(raw) => canonical_action(raw),
            None => Some(infer_action(&params).unwrap_or("read")),
        }
        .ok_or_else(|| ToolError::Validation(UNKNOWN_ACTION.into()))?;

        let max_results = |default: usize| {
            params
                .get("max_results")
                .and_then(Value::as_i64)
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(default)
        };
        let label_ids = params::string_list(params.get("label_ids"));
        let format = params::text(&params, &["format"])
            .unwrap_or_else(|| "full".into())
            .to_lowercase();

        match action {
            "send" => Ok(Self::Send(compose_send(&params)?)),
            "create_draft" => Ok(Self::CreateDraft(compose_draft(&params)?)),
            "read" => Ok(Self::Read(ReadArgs {
                email_id: params::text(&params, &["email_id", "message_id", "id"]),
                query: params::text(&params, &["query"]).unwrap_or_else(|| "is:unread".into()),
                max_results: max_results(5),
                label_ids,
                mark_as_read: params::coerce_bool(params.get("mark_as_read")),
                format,
            })),
            "search" => {
                let query = params::text(&params, &["query"]);
                let default = if query.is_none() && label_ids.is_empty() { 5 } else { 10 };
                Ok(Self::Search(SearchArgs {
                    query,
                    max_results: max_results(default),
                    label_ids,
                }))
            }
            "get_thread" => params::text(&params, &["thread_id", "id"])
                .map(|thread_id| Self::GetThread { thread_id })
                .ok_or_else(|| {
                    ToolError::Validation("Gmail get_thread action requires 'thread_id'.".into())
                }),
            "get_message" => params::text(&params, &["message_id", "email_id", "id"])
                .map(|message_id| Self::GetMessage { message_id, format })
                .ok_or_else(|| {
                    ToolError::Validation("Gmail get_message action requires 'message_id'.".into())
                }),
            _ => Err(ToolError::Validation(UNKNOWN_ACTION.into())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Send(_) => "send",
            Self::CreateDraft(_) => "create_draft",
            Self::Read(_) => "read",
            Self::Search(_) => "search",
            Self::GetThread { .. } => "get_thread",
            Self::GetMessage { .. } => "get_message",
        }
    }

    fn needs_send_scope(&self) -> bool {
        matches!(self, Self::Send(_) | Self::CreateDraft(_))
    }
}

fn compose_send(params: &Params) -> Result<OutgoingMessage, ToolError> {
    let to = resolve_recipients(params);
    let subject = resolve_subject(params);
    let body = resolve_message(params);

    let mut missing = Vec::new();
    if to.is_empty() {
        missing.push("to");
    }
    if subject.is_none() {
        missing.push("subject");
    }
    if body.is_none() {
        missing.push("message");
    }
    if !missing.is_empty() {
        return Err(ToolError::Validation(format!(
            "Gmail send action requires fields: 'to', 'subject', and 'message'. Missing: {}",
            missing.join(", ")
        )));
    }

    Ok(OutgoingMessage {
        to,
        cc: params::string_list(params.get("cc")),
        bcc: params::string_list(params.get("bcc")),
        subject,
        body: body.unwrap_or_default(),
        is_html: params::coerce_bool(params.get("is_html")),
    })
}

fn compose_draft(params: &Params) -> Result<OutgoingMessage, ToolError> {
    let Some(body) = resolve_message(params) else {
        let mut provided: Vec<&str> = params
            .iter()
            .filter(|(_, v)| params::is_truthy(Some(v)))
            .map(|(k, _)| k.as_str())
            .collect();
        provided.sort_unstable();
        let provided = if provided.is_empty() {
            "none".to_string()
        } else {
            provided.join(", ")
        };
        return Err(ToolError::Validation(format!(
            "Gmail create_draft action requires a non-empty email body. Set the 'message' field (or 'body') to the textual content you want in the draft. Provided keys: {provided}."
        )));
    };

    let subject = resolve_subject(params).or_else(|| Some(fallback_subject(params, &body)));

    Ok(OutgoingMessage {
        to: resolve_recipients(params),
        cc: params::string_list(params.get("cc")),
        bcc: params::string_list(params.get("bcc")),
        subject,
        body,
        is_html: params::coerce_bool(params.get("is_html")),
    })
}

/// Text out of a string, a list of parts, or an object with a text-ish key.
fn extract_content(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(extract_content)
                .filter(|p| !p.is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join("\n"))
        }
        Value::Object(map) => ["text", "content", "message", "body", "value", "parts", "items"]
            .iter()
            .filter_map(|k| map.get(*k))
            .filter(|v| params::is_truthy(Some(v)))
            .find_map(extract_content),
        other => Some(other.to_string()),
    }
}

/// Look up `keys` case-insensitively and return the first non-blank text.
fn resolve_text(params: &Params, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| extract_content(v))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

fn resolve_message(params: &Params) -> Option<String> {
    resolve_text(params, MESSAGE_KEYS)
}

fn resolve_subject(params: &Params) -> Option<String> {
    resolve_text(params, SUBJECT_KEYS)
}

fn resolve_recipients(params: &Params) -> Vec<String> {
    let direct = params::string_list(params.get("to"));
    if !direct.is_empty() {
        return direct;
    }
    RECIPIENT_KEYS
        .iter()
        .find_map(|key| {
            let found = params::string_list(params.get(*key));
            (!found.is_empty()).then_some(found)
        })
        .unwrap_or_default()
}

/// A subject for a draft that was given none.
fn fallback_subject(params: &Params, body: &str) -> String {
    let schedule: Vec<String> = ["date", "time"]
        .iter()
        .filter_map(|k| params::text(params, &[k]))
        .collect();
    if !schedule.is_empty() {
        return format!("Meeting on {}", schedule.join(" "));
    }
    match body.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(first) => first.chars().take(120).collect(),
        None => "Draft Email".into(),
    }
}

/// RFC 2047 encoded-word for non-ASCII header values.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?utf-8?b?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

/// The RFC 2822 message, base64url-encoded the way the Gmail API wants it.
pub fn build_raw_message(message: &OutgoingMessage) -> String {
    let mut mime = String::new();
    let subtype = if message.is_html { "html" } else { "plain" };
    mime.push_str(&format!("Content-Type: text/{subtype}; charset=\"utf-8\"\r\n"));
    mime.push_str("MIME-Version: 1.0\r\n");
    mime.push_str("Content-Transfer-Encoding: base64\r\n");
    if !message.to.is_empty() {
        mime.push_str(&format!("To: {}\r\n", message.to.join(", ")));
    }
    if let Some(subject) = &message.subject {
        mime.push_str(&format!("Subject: {}\r\n", encode_header(subject)));
    }
    if !message.cc.is_empty() {
        mime.push_str(&format!("Cc: {}\r\n", message.cc.join(", ")));
    }
    if !message.bcc.is_empty() {
        mime.push_str(&format!("Bcc: {}\r\n", message.bcc.join(", ")));
    }
    mime.push_str("\r\n");

    let encoded_body = STANDARD.encode(message.body.as_bytes());
    for chunk in encoded_body.as_bytes().chunks(76) {
        mime.push_str(&String::from_utf8_lossy(chunk));
        mime.push_str("\r\n");
    }

    URL_SAFE.encode(mime.as_bytes())
}

fn decode_body(data: &str) -> String {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('=').as_bytes())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn truncate(text: String) -> String {
    if text.chars().count() <= MAX_BODY_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(MAX_BODY_CHARS).collect();
    cut.push_str("... [truncated]");
    cut
}

/// Lower-cased header name → value.
fn headers(payload: &Value) -> serde_json::Map<String, Value> {
    payload["headers"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|h| {
            let name = h["name"].as_str()?;
            Some((
                name.to_lowercase(),
                Value::String(h["value"].as_str().unwrap_or_default().to_string()),
            ))
        })
        .collect()
}

/// First text/plain and text/html bodies found in a MIME tree.
fn extract_bodies(payload: &Value) -> (Option<String>, Option<String>) {
    let data = payload["body"]["data"].as_str().filter(|d| !d.is_empty());
    let (mut plain, mut html) = match (payload["mimeType"].as_str(), data) {
        (Some("text/plain"), Some(d)) => (Some(decode_body(d)), None),
        (Some("text/html"), Some(d)) => (None, Some(decode_body(d))),
        _ => (None, None),
    };
    for part in payload["parts"].as_array().into_iter().flatten() {
        if plain.is_some() && html.is_some() {
            break;
        }
        let (p, h) = extract_bodies(part);
        plain = plain.or(p);
        html = html.or(h);
    }
    (plain, html)
}

/// The fields of a full-format message a model cares about.
pub fn parse_message(message: &Value) -> Value {
    let payload = &message["payload"];
    let headers = headers(payload);
    let header = |name: &str| headers.get(name).cloned().unwrap_or_else(|| json!(""));
    let (body_text, body_html) = extract_bodies(payload);

    json!({
        "subject": header("subject"),
        "from": header("from"),
        "to": header("to"),
        "cc": header("cc"),
        "bcc": header("bcc"),
        "reply_to": header("reply-to"),
        "date": header("date"),
        "snippet": message["snippet"],
        "body_text": body_text.map(truncate),
        "body_html": body_html.map(truncate),
    })
}

/// Refuse to send when the granted scopes are known and none allows it.
///
/// An empty scope list means the grant never reported scopes, so the
/// decision is left to the API.
fn assert_send_scope(credential: &Credential) -> Result<(), GoogleApiError> {
    if credential.scopes.is_empty() || has_any_scope(&credential.scopes, GMAIL_SEND_SCOPES) {
        return Ok(());
    }
    Err(insufficient_send_scope())
}

fn insufficient_send_scope() -> GoogleApiError {
    GoogleApiError::Credential(CredentialError::InsufficientScope {
        service: "Google".into(),
        missing: GMAIL_SEND_SCOPES.iter().map(|s| s.to_string()).collect(),
    })
}

pub struct GmailTool {
    api: GoogleApi,
}

impl GmailTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, GoogleApiError> {
        GoogleApi::url(&self.api.endpoints().gmail, segments)
    }

    async fn dispatch(&self, token: &str, action: &GmailAction) -> Result<Value, GoogleApiError> {
        match action {
            GmailAction::Send(message) => {
                let body = json!({ "raw": build_raw_message(message) });
                let sent = self
                    .api
                    .post(token, self.endpoint(&["messages", "send"])?, &body)
                    .await?;
                Ok(outgoing_summary(&sent, "sent", message))
            }
            GmailAction::CreateDraft(message) => {
                let body = json!({ "message": { "raw": build_raw_message(message) } });
                let draft = self.api.post(token, self.endpoint(&["drafts"])?, &body).await?;
                Ok(outgoing_summary(&draft, "draft_created", message))
            }
            GmailAction::Read(args) => self.read(token, args).await,
            GmailAction::Search(args) => self.search(token, args).await,
            GmailAction::GetThread { thread_id } => {
                let thread = self
                    .api
                    .get(token, self.endpoint(&["threads", thread_id.as_str()])?, &[])
                    .await?;
                let messages: Vec<Value> = thread["messages"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(|m| {
                        let mut parsed = parse_message(m);
                        parsed["id"] = m["id"].clone();
                        parsed["thread_id"] = json!(thread_id);
                        parsed
                    })
                    .collect();
                Ok(json!({
                    "thread_id": thread_id,
                    "message_count": messages.len(),
                    "messages": messages,
                }))
            }
            GmailAction::GetMessage { message_id, format } => {
                self.get_message(token, message_id, format).await
            }
        }
    }

    async fn list_ids(
        &self,
        token: &str,
        query: Option<&str>,
        max_results: usize,
        label_ids: &[String],
    ) -> Result<Vec<String>, GoogleApiError> {
        let mut q = vec![("maxResults", max_results.to_string())];
        if let Some(query) = query {
            q.push(("q", query.to_string()));
        }
        q.extend(label_ids.iter().map(|l| ("labelIds", l.clone())));

        let listed = self.api.get(token, self.endpoint(&["messages"])?, &q).await?;
        Ok(listed["messages"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|m| m["id"].as_str().map(String::from))
            .collect())
    }

    async fn get_message(
        &self,
        token: &str,
        message_id: &str,
        format: &str,
    ) -> Result<Value, GoogleApiError> {
        let message = self
            .api
            .get(
                token,
                self.endpoint(&["messages", message_id])?,
                &[("format", format.to_string())],
            )
            .await?;

        let mut result = if format == "full" {
            parse_message(&message)
        } else {
            json!({ "snippet": message["snippet"] })
        };
        result["id"] = json!(message_id);
        result["thread_id"] = message["threadId"].clone();
        result["label_ids"] = message
            .get("labelIds")
            .cloned()
            .unwrap_or_else(|| json!([]));
        match format {
            "full" => {}
            "raw" => result["raw"] = message["raw"].clone(),
            _ => result["payload"] = message["payload"].clone(),
        }
        Ok(result)
    }

    async fn read(&self, token: &str, args: &ReadArgs) -> Result<Value, GoogleApiError> {
        let ids = match &args.email_id {
            Some(id) => vec![id.clone()],
            None => {
                self.list_ids(token, Some(&args.query), args.max_results, &args.label_ids)
                    .await?
            }
        };

        let mut messages = Vec::new();
        for id in ids.iter().take(args.max_results) {
            messages.push(self.get_message(token, id, &args.format).await?);
            if args.mark_as_read {
                let modify = self.endpoint(&["messages", id.as_str(), "modify"])?;
                let body = json!({ "removeLabelIds": ["UNREAD"] });
                if let Err(e) = self.api.post(token, modify, &body).await {
                    debug!(message_id = %id, error = %e, "Failed to mark message as read");
                }
            }
        }

        Ok(json!({ "count": messages.len(), "messages": messages }))
    }

    async fn search(&self, token: &str, args: &SearchArgs) -> Result<Value, GoogleApiError> {
        let ids = self
            .list_ids(token, args.query.as_deref(), args.max_results, &args.label_ids)
            .await?;

        let mut emails = Vec::new();
        for id in ids.iter().take(args.max_results) {
            let mut q = vec![("format", "metadata".to_string())];
            q.extend(
                ["Subject", "From", "Date", "To"]
                    .iter()
                    .map(|h| ("metadataHeaders", h.to_string())),
            );
            let message = self
                .api
                .get(token, self.endpoint(&["messages", id.as_str()])?, &q)
                .await?;
            let headers = headers(&message["payload"]);
            let header = |name: &str| headers.get(name).cloned().unwrap_or_else(|| json!(""));
            emails.push(json!({
                "id": id,
                "subject": header("subject"),
                "from": header("from"),
                "to": header("to"),
                "date": header("date"),
                "snippet": message.get("snippet").cloned().unwrap_or_else(|| json!("")),
                "label_ids": message.get("labelIds").cloned().unwrap_or_else(|| json!([])),
            }));
        }

        Ok(json!({ "count": emails.len(), "emails": emails }))
    }
}

fn outgoing_summary(response: &Value, status: &str, message: &OutgoingMessage) -> Value {
    json!({
        "id": response["id"],
        "status": status,
        "to": message.to,
        "cc": message.cc,
        "bcc": message.bcc,
        "subject": message.subject,
    })
}

#[async_trait]
impl Tool for GmailTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Read and send emails using Gmail"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["read", "send", "list", "search", "get_message", "get_thread", "send_message", "create_draft", "get"],
                    "description": "Action to perform"
                },
                "email_id": { "type": "string", "description": "Email ID for read action" },
                "message_id": { "type": "string", "description": "Gmail message ID to retrieve" },
                "to": { "type": "string", "description": "Recipient email address(es), comma separated" },
                "subject": { "type": "string", "description": "Email subject" },
                "body": { "type": "string", "description": "Email body" },
                "message": { "type": "string", "description": "Email body (alias of body)" },
                "is_html": { "type": "boolean", "description": "Send the body as HTML" },
                "cc": { "type": ["array", "string"], "description": "CC recipients" },
                "bcc": { "type": ["array", "string"], "description": "BCC recipients" },
                "max_results": { "type": ["integer", "string"], "default": 10, "description": "Maximum number of emails to return" },
                "query": { "type": "string", "description": "Gmail search query, e.g. 'is:unread from:boss'" },
                "mark_as_read": { "type": "boolean", "description": "Mark read messages as read" },
                "label_ids": { "type": ["array", "string"], "description": "Label IDs to filter by" },
                "thread_id": { "type": "string", "description": "Thread ID for get_thread" },
                "format": { "type": "string", "default": "full", "description": "Message format: full, metadata, minimal or raw" }
            },
            "required": []
        })
    }

    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<ToolResult, ToolError> {
        let params = match arguments {
            Value::Object(map) => map,
            Value::Null => Params::new(),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "expected an object, got {other}"
                )));
            }
        };
        let action = GmailAction::from_params(params)?;
        debug!(action = action.name(), user_id = %ctx.user_id, "Gmail tool call");

        let result = self
            .api
            .with_credentials(&ctx.user_id, |credential| {
                let action = &action;
                async move {
                    if action.needs_send_scope() {
                        assert_send_scope(&credential)?;
                    }
                    self.dispatch(&credential.access_token, action).await
                }
            })
            .await;

        match result {
            Ok(value) => Ok(ToolResult::json(value)),
            Err(e) if e.is_insufficient_scope() => {
                Err(insufficient_send_scope().into_tool_error(TOOL_NAME, API_NAME))
            }
            Err(e) => Err(e.into_tool_error(TOOL_NAME, API_NAME)),
        }
    }
}
