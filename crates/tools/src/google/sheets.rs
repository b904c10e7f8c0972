//! Google Sheets: read a range, write a range, create a spreadsheet.

use super::{GoogleApi, GoogleApiError};
use crate::params::{self, Params};
use agentexec_core::error::ToolError;
use agentexec_core::tool::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;

const TOOL_NAME: &str = "google_sheets";
const API_NAME: &str = "Google Sheets";
const DEFAULT_RANGE: &str = "Sheet1!A1:Z";

#[derive(Debug, Clone, PartialEq)]
pub enum SheetsAction {
    Read {
        spreadsheet_id: String,
        range: String,
    },
    Write {
        spreadsheet_id: String,
        range: String,
        values: Value,
    },
    Create {
        title: String,
    },
}

/// `title` means create, `values` means write, a spreadsheet id alone means read.
pub fn infer_action(params: &Params) -> Option<&'static str> {
    if params::is_truthy(params.get("title")) {
        return Some("create");
    }
    if params.get("values").is_some_and(|v| !v.is_null()) {
        return Some("write");
    }
    if params::is_truthy(params.get("spreadsheet_id")) || params::is_truthy(params.get("spreadsheetId"))
    {
        return Some("read");
    }
    None
}

fn required(field: Option<String>, message: &str) -> Result<String, ToolError> {
    field.ok_or_else(|| ToolError::Validation(message.into()))
}

impl SheetsAction {
    pub fn from_params(mut params: Params) -> Result<Self, ToolError> {
        params::alias(&mut params, "spreadsheetId", "spreadsheet_id");
        params::alias(&mut params, "rangeName", "range");

        let action = match params::text(&params, &["action"]) {
            Some(explicit) => explicit.to_lowercase(),
            None => infer_action(&params)
                .ok_or_else(|| {
                    ToolError::Validation(
                        "Missing required parameter 'action'. Provide 'read', 'write', or 'create', or include fields such as 'title' for creating a sheet, 'values' for writing, or 'spreadsheet_id' for reading."
                            .into(),
                    )
                })?
                .to_string(),
        };

        let spreadsheet_id = params::text(&params, &["spreadsheet_id"]);
        let range = params::text(&params, &["range"]);

        match action.as_str() {
            "read" => Ok(Self::Read {
                spreadsheet_id: required(
                    spreadsheet_id,
                    "Google Sheets read action requires 'spreadsheet_id'.",
                )?,
                range: range.unwrap_or_else(|| DEFAULT_RANGE.into()),
            }),
            "write" => {
                let spreadsheet_id = required(
                    spreadsheet_id,
                    "Google Sheets write action requires 'spreadsheet_id'.",
                )?;
                let values = params
                    .get("values")
                    .filter(|v| !v.is_null())
                    .cloned()
                    .ok_or_else(|| {
                        ToolError::Validation("Google Sheets write action requires 'values'.".into())
                    })?;
                let range = required(range, "Google Sheets write action requires 'range'.")?;
                Ok(Self::Write {
                    spreadsheet_id,
                    range,
                    values,
                })
            }
            "create" => Ok(Self::Create {
                title: required(
                    params::text(&params, &["title"]),
                    "Google Sheets create action requires 'title'.",
                )?,
            }),
            _ => Err(ToolError::Validation(
                "Unknown Google Sheets action. Supported actions are 'read', 'write', and 'create'."
                    .into(),
            )),
        }
    }
}

pub struct GoogleSheetsTool {
    api: GoogleApi,
}

impl GoogleSheetsTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }

    async fn dispatch(&self, token: &str, action: &SheetsAction) -> Result<Value, GoogleApiError> {
        let base = &self.api.endpoints().sheets;
        match action {
            SheetsAction::Read {
                spreadsheet_id,
                range,
            } => {
                let url = GoogleApi::url(base, &[spreadsheet_id.as_str(), "values", range.as_str()])?;
                let result = self.api.get(token, url, &[]).await?;
                let values = result.get("values").cloned().unwrap_or_else(|| json!([]));
                Ok(json!({
                    "spreadsheet_id": spreadsheet_id,
                    "range": range,
                    "row_count": values.as_array().map_or(0, Vec::len),
                    "values": values,
                }))
            }
            SheetsAction::Write {
                spreadsheet_id,
                range,
                values,
            } => {
                let url = GoogleApi::url(base, &[spreadsheet_id.as_str(), "values", range.as_str()])?;
                let result = self
                    .api
                    .send(
                        Method::PUT,
                        token,
                        url,
                        &[("valueInputOption", "RAW".to_string())],
                        Some(&json!({ "values": values })),
                    )
                    .await?;
                Ok(json!({
                    "spreadsheet_id": spreadsheet_id,
                    "range": range,
                    "updated_cells": result.get("updatedCells").cloned().unwrap_or_else(|| json!(0)),
                }))
            }
            SheetsAction::Create { title } => {
                let url = GoogleApi::url(base, &[])?;
                let body = json!({ "properties": { "title": title } });
                let result = self.api.post(token, url, &body).await?;
                Ok(json!({
                    "spreadsheet_id": result["spreadsheetId"],
                    "title": title,
                    "url": result["spreadsheetUrl"],
                }))
            }
        }
    }
}

#[async_trait]
impl Tool for GoogleSheetsTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Read and write data from Google Sheets"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["read", "write", "create"],
                    "description": "Action to perform"
                },
                "spreadsheet_id": { "type": "string", "description": "Google Sheets ID" },
                "range": { "type": "string", "description": "Cell range (e.g., 'Sheet1!A1:D10')" },
                "values": { "type": "array", "description": "Data to write (2D array)" },
                "title": { "type": "string", "description": "Title for new spreadsheet" }
            },
            "required": []
        })
    }

    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<ToolResult, ToolError> {
        let params = arguments.as_object().cloned().unwrap_or_default();
        let action = SheetsAction::from_params(params)?;
        debug!(user_id = %ctx.user_id, ?action, "Google Sheets tool call");

        self.api
            .with_credentials(&ctx.user_id, |credential| {
                let action = &action;
                async move { self.dispatch(&credential.access_token, action).await }
            })
            .await
            .map(ToolResult::json)
            .map_err(|e| e.into_tool_error(TOOL_NAME, API_NAME))
    }
}
