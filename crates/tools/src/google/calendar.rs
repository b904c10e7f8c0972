//! Google Calendar: list upcoming events, create an event, fetch one event.

use super::{GoogleApi, GoogleApiError};
use crate::params::{self, Params};
use agentexec_core::error::ToolError;
use agentexec_core::tool::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;
use regex_lite::Regex;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;
use tracing::debug;

const TOOL_NAME: &str = "google_calendar";
const API_NAME: &str = "Google Calendar";
const DEFAULT_CALENDAR: &str = "primary";
const DEFAULT_MAX_RESULTS: i64 = 10;

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub summary: String,
    pub start: Value,
    pub end: Value,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalendarAction {
    ListEvents {
        max_results: i64,
        time_min: Option<String>,
        time_max: Option<String>,
    },
    CreateEvent(NewEvent),
    GetEvent {
        event_id: String,
    },
}

pub fn infer_action(params: &Params) -> &'static str {
    if params::is_truthy(params.get("event_id")) {
        "get_event"
    } else if ["summary", "start", "end"]
        .iter()
        .any(|k| params::is_truthy(params.get(*k)))
    {
        "create_event"
    } else {
        "list_events"
    }
}

pub fn is_valid_email(candidate: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(candidate))
}

/// An RFC 3339 timestamp becomes `dateTime`, anything else an all-day `date`.
/// Objects already in Google's shape are passed through minus null fields.
fn event_time(value: &Value, time_zone: Option<&str>) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            (!cleaned.is_empty()).then_some(Value::Object(cleaned))
        }
        other => {
            let text = params::scalar_text(other)?;
            if text.contains('T') {
                let mut slot = json!({ "dateTime": text });
                if let Some(tz) = time_zone {
                    slot["timeZone"] = json!(tz);
                }
                Some(slot)
            } else {
                Some(json!({ "date": text }))
            }
        }
    }
}

impl CalendarAction {
    /// Returns the action plus the target calendar id.
    pub fn from_params(mut params: Params) -> Result<(Self, String), ToolError> {
        params::alias(&mut params, "start_time", "start");
        params::alias(&mut params, "end_time", "end");
        params::alias(&mut params, "eventId", "event_id");
        params::alias(&mut params, "calendarId", "calendar_id");
        params::alias(&mut params, "maxResults", "max_results");

        let calendar_id =
            params::text(&params, &["calendar_id"]).unwrap_or_else(|| DEFAULT_CALENDAR.into());
        let action = params::text(&params, &["action"])
            .map(|a| a.to_lowercase())
            .unwrap_or_else(|| infer_action(&params).to_string());

        let action = match action.as_str() {
            "list_events" | "list" => Self::ListEvents {
                max_results: params::integer(&params, "max_results")
                    .map_err(|_| {
                        ToolError::Validation(
                            "Google Calendar max_results must be an integer value.".into(),
                        )
                    })?
                    .unwrap_or(DEFAULT_MAX_RESULTS),
                time_min: params::text(&params, &["time_min", "timeMin"]),
                time_max: params::text(&params, &["time_max", "timeMax"]),
            },
            "create_event" | "create" => Self::CreateEvent(new_event(&params)?),
            "get_event" | "get" => Self::GetEvent {
                event_id: params::text(&params, &["event_id"]).ok_or_else(|| {
                    ToolError::Validation(
                        "Google Calendar get_event action requires 'event_id'.".into(),
                    )
                })?,
            },
            _ => {
                return Err(ToolError::Validation(
                    "Unknown Google Calendar action. Supported actions are 'list_events', 'create_event', and 'get_event'."
                        .into(),
                ));
            }
        };
        Ok((action, calendar_id))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListEvents { .. } => "list_events",
            Self::CreateEvent(_) => "create_event",
            Self::GetEvent { .. } => "get_event",
        }
    }
}

fn new_event(params: &Params) -> Result<NewEvent, ToolError> {
    let time_zone = params::text(params, &["time_zone", "timezone"]);
    let slot = |key: &str| {
        params
            .get(key)
            .and_then(|v| event_time(v, time_zone.as_deref()))
    };
    let (Some(start), Some(end)) = (slot("start"), slot("end")) else {
        return Err(ToolError::Validation(
            "Google Calendar create_event action requires 'start' and 'end' fields (RFC3339 or YYYY-MM-DD)."
                .into(),
        ));
    };

    let attendees = params::string_list(params.get("attendees"));
    let invalid: Vec<&str> = attendees
        .iter()
        .map(String::as_str)
        .filter(|a| !is_valid_email(a))
        .collect();
    if !invalid.is_empty() {
        return Err(ToolError::Validation(format!(
            "Google Calendar attendees must be valid email addresses. Invalid entries: {}",
            invalid.join(", ")
        )));
    }

    Ok(NewEvent {
        summary: params::text(params, &["summary", "title"])
            .unwrap_or_else(|| "Untitled Event".into()),
        start,
        end,
        description: params::text(params, &["description"]),
        location: params::text(params, &["location"]),
        attendees,
    })
}

fn time_text(slot: &Value) -> Value {
    slot.get("dateTime")
        .or_else(|| slot.get("date"))
        .cloned()
        .unwrap_or(Value::Null)
}

/// The fields of an event worth showing to a model.
pub fn summarize_event(event: &Value) -> Value {
    let attendees: Vec<Value> = event["attendees"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|a| a.get("email").cloned())
                .collect()
        })
        .unwrap_or_default();
    json!({
        "id": event["id"],
        "summary": event.get("summary").cloned().unwrap_or_else(|| json!("(no title)")),
        "start": time_text(&event["start"]),
        "end": time_text(&event["end"]),
        "time_zone": event["start"].get("timeZone").cloned().unwrap_or(Value::Null),
        "attendees": attendees,
        "html_link": event["htmlLink"],
        "location": event["location"],
    })
}

pub struct GoogleCalendarTool {
    api: GoogleApi,
}

impl GoogleCalendarTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }

    async fn dispatch(
        &self,
        token: &str,
        calendar_id: &str,
        action: &CalendarAction,
    ) -> Result<Value, GoogleApiError> {
        let base = &self.api.endpoints().calendar;
        match action {
            CalendarAction::ListEvents {
                max_results,
                time_min,
                time_max,
            } => {
                let url = GoogleApi::url(base, &["calendars", calendar_id, "events"])?;
                let mut query = vec![
                    ("maxResults", max_results.to_string()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                ];
                if let Some(min) = time_min {
                    query.push(("timeMin", min.clone()));
                }
                if let Some(max) = time_max {
                    query.push(("timeMax", max.clone()));
                }
                let result = self.api.get(token, url, &query).await?;
                let events: Vec<Value> = result["items"]
                    .as_array()
                    .map(|items| items.iter().map(summarize_event).collect())
                    .unwrap_or_default();
                Ok(json!({
                    "calendar_id": calendar_id,
                    "count": events.len(),
                    "events": events,
                }))
            }
            CalendarAction::CreateEvent(event) => {
                let url = GoogleApi::url(base, &["calendars", calendar_id, "events"])?;
                let mut body = json!({
                    "summary": event.summary,
                    "start": event.start,
                    "end": event.end,
                });
                if let Some(description) = &event.description {
                    body["description"] = json!(description);
                }
                if let Some(location) = &event.location {
                    body["location"] = json!(location);
                }
                if !event.attendees.is_empty() {
                    body["attendees"] = event
                        .attendees
                        .iter()
                        .map(|email| json!({ "email": email }))
                        .collect();
                }
                let created = self.api.post(token, url, &body).await?;
                Ok(json!({
                    "id": created["id"],
                    "status": created["status"],
                    "summary": created.get("summary").cloned().unwrap_or_else(|| json!(event.summary)),
                    "start": created["start"],
                    "end": created["end"],
                    "html_link": created["htmlLink"],
                }))
            }
            CalendarAction::GetEvent { event_id } => {
                let url = GoogleApi::url(base, &["calendars", calendar_id, "events", event_id.as_str()])?;
                self.api.get(token, url, &[]).await
            }
        }
    }
}

#[async_trait]
impl Tool for GoogleCalendarTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "List and create Google Calendar events"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["list_events", "create_event", "get_event"],
                    "description": "Action to perform"
                },
                "calendar_id": { "type": "string", "description": "Calendar ID (default: primary)" },
                "max_results": { "type": ["integer", "string"], "description": "Maximum events to list (default: 10)" },
                "time_min": { "type": "string", "description": "Lower bound (RFC3339) for listed events" },
                "time_max": { "type": "string", "description": "Upper bound (RFC3339) for listed events" },
                "summary": { "type": "string", "description": "Event title" },
                "start": { "type": "string", "description": "Start time (RFC3339) or date (YYYY-MM-DD)" },
                "end": { "type": "string", "description": "End time (RFC3339) or date (YYYY-MM-DD)" },
                "time_zone": { "type": "string", "description": "IANA time zone for timed events" },
                "description": { "type": "string", "description": "Event description" },
                "location": { "type": "string", "description": "Event location" },
                "attendees": { "type": ["array", "string"], "items": { "type": "string" }, "description": "Attendee email addresses" },
                "event_id": { "type": "string", "description": "Event ID for get_event" }
            },
            "required": []
        })
    }

    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<ToolResult, ToolError> {
        let params = arguments.as_object().cloned().unwrap_or_default();
        let (action, calendar_id) = CalendarAction::from_params(params)?;
        debug!(user_id = %ctx.user_id, action = action.name(), calendar_id = %calendar_id, "Google Calendar tool call");

        self.api
            .with_credentials(&ctx.user_id, |credential| {
                let action = &action;
                let calendar_id = calendar_id.as_str();
                async move {
                    self.dispatch(&credential.access_token, calendar_id, action)
                        .await
                }
            })
            .await
            .map(ToolResult::json)
            .map_err(|e| e.into_tool_error(TOOL_NAME, API_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(v: Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn inference() {
        assert_eq!(infer_action(&params(json!({"event_id": "e1", "summary": "x"}))), "get_event");
        assert_eq!(infer_action(&params(json!({"start": "2024-05-01"}))), "create_event");
        assert_eq!(infer_action(&Params::new()), "list_events");
    }

    #[test]
    fn list_defaults() {
        let (action, calendar) = CalendarAction::from_params(Params::new()).unwrap();
        assert_eq!(calendar, "primary");
        assert_eq!(
            action,
            CalendarAction::ListEvents {
                max_results: 10,
                time_min: None,
                time_max: None
            }
        );

        let (action, calendar) = CalendarAction::from_params(params(json!({
            "action": "list_events",
            "max_results": "3",
            "calendar_id": "team@example.com"
        })))
        .unwrap();
        assert_eq!(calendar, "team@example.com");
        assert!(matches!(action, CalendarAction::ListEvents { max_results: 3, .. }));
    }

    #[test]
    fn timed_and_all_day_events() {
        let (action, _) = CalendarAction::from_params(params(json!({
            "summary": "Standup",
            "start_time": "2024-05-01T09:00:00Z",
            "end_time": "2024-05-01T09:15:00Z",
            "time_zone": "Europe/Berlin"
        })))
        .unwrap();
        let CalendarAction::CreateEvent(event) = action else {
            panic!("expected create_event");
        };
        assert_eq!(event.summary, "Standup");
        assert_eq!(
            event.start,
            json!({"dateTime": "2024-05-01T09:00:00Z", "timeZone": "Europe/Berlin"})
        );

        let (action, _) = CalendarAction::from_params(params(json!({
            "start": "2024-05-01",
            "end": "2024-05-02"
        })))
        .unwrap();
        let CalendarAction::CreateEvent(event) = action else {
            panic!("expected create_event");
        };
        assert_eq!(event.summary, "Untitled Event");
        assert_eq!(event.start, json!({"date": "2024-05-01"}));
    }

    #[test]
    fn create_requires_both_times() {
        let err = CalendarAction::from_params(params(json!({
            "action": "create_event",
            "start": "2024-05-01"
        })))
        .unwrap_err();
        assert!(err.to_string().contains("requires 'start' and 'end'"));
    }

    #[test]
    fn attendees_are_validated() {
        let err = CalendarAction::from_params(params(json!({
            "start": "2024-05-01",
            "end": "2024-05-01",
            "attendees": "ok@example.com, not-an-email"
        })))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Google Calendar attendees must be valid email addresses. Invalid entries: not-an-email"
        );
    }

    #[test]
    fn get_and_unknown() {
        let err = CalendarAction::from_params(params(json!({"action": "get_event"}))).unwrap_err();
        assert_eq!(err.to_string(), "Google Calendar get_event action requires 'event_id'.");
        let err = CalendarAction::from_params(params(json!({"action": "delete"}))).unwrap_err();
        assert!(err.to_string().starts_with("Unknown Google Calendar action"));
    }

    #[test]
    fn event_summary_shape() {
        let event = json!({
            "id": "ev1",
            "summary": "Review",
            "start": {"dateTime": "2024-05-01T10:00:00Z", "timeZone": "UTC"},
            "end": {"date": "2024-05-01"},
            "attendees": [{"email": "a@x.io"}, {"displayName": "no email"}],
            "htmlLink": "https://calendar.google.com/ev1"
        });
        let s = summarize_event(&event);
        assert_eq!(s["start"], "2024-05-01T10:00:00Z");
        assert_eq!(s["end"], "2024-05-01");
        assert_eq!(s["time_zone"], "UTC");
        assert_eq!(s["attendees"], json!(["a@x.io"]));
        assert_eq!(s["location"], Value::Null);
    }
}
