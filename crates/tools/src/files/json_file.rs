//! JSON read/write tool.

use super::FileRoot;
use super::csv_file::{check_encoding, ensure_parent};
use crate::params;
use agentexec_core::error::ToolError;
use agentexec_core::tool::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

const TOOL_NAME: &str = "json";
const DEFAULT_INDENT: usize = 2;

pub struct JsonFileTool {
    root: FileRoot,
}

fn fail(reason: impl std::fmt::Display) -> ToolError {
    ToolError::failed(TOOL_NAME, format!("JSON file error: {reason}"))
}

/// Pretty-print with `indent` spaces per level. Non-ASCII is written as-is.
pub fn to_indented(data: &Value, indent: usize) -> Result<String, serde_json::Error> {
    let pad = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    data.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

impl JsonFileTool {
    pub fn new(root: FileRoot) -> Self {
        Self { root }
    }

    async fn read(&self, file_path: &str, encoding: &str) -> Result<Value, String> {
        let path = self.root.resolve(file_path).map_err(|e| e.to_string())?;
        if !path.exists() {
            return Err(format!("File not found: {file_path}"));
        }
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| e.to_string())?;
        let data: Value = serde_json::from_str(&text).map_err(|e| e.to_string())?;
        Ok(json!({
            "file_path": file_path,
            "data": data,
            "encoding": encoding,
        }))
    }

    async fn write(
        &self,
        file_path: &str,
        data: &Value,
        encoding: &str,
        indent: usize,
    ) -> Result<Value, String> {
        let text = to_indented(data, indent).map_err(|e| e.to_string())?;
        let path = self.root.resolve(file_path).map_err(|e| e.to_string())?;
        ensure_parent(&path).await.map_err(|e| e.to_string())?;
        tokio::fs::write(&path, text)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({
            "file_path": file_path,
            "encoding": encoding,
            "indent": indent,
        }))
    }
}

#[async_trait]
impl Tool for JsonFileTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Read and write JSON files"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["read", "write"],
                    "description": "Action to perform"
                },
                "file_path": { "type": "string", "description": "Path to JSON file" },
                "data": { "type": "object", "description": "Data to write (required for write action)" },
                "encoding": { "type": "string", "default": "utf-8", "description": "File encoding" },
                "indent": { "type": "integer", "default": 2, "description": "JSON indentation" }
            },
            "required": ["action", "file_path"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, arguments: Value) -> Result<ToolResult, ToolError> {
        let params = arguments.as_object().cloned().unwrap_or_default();
        let action = params::text(&params, &["action"]).unwrap_or_default();
        let file_path = params::text(&params, &["file_path"])
            .ok_or_else(|| ToolError::Validation("Missing required parameter: file_path".into()))?;
        let encoding = params::text(&params, &["encoding"]).unwrap_or_else(|| "utf-8".into());
        check_encoding(&encoding).map_err(fail)?;

        let result = match action.as_str() {
            "read" => self.read(&file_path, &encoding).await,
            "write" => {
                let indent = params::integer(&params, "indent")
                    .map_err(|_| fail("indent must be an integer"))?
                    .map_or(DEFAULT_INDENT, |i| i.clamp(0, 16) as usize);
                let data = params.get("data").cloned().unwrap_or(Value::Null);
                self.write(&file_path, &data, &encoding, indent).await
            }
            other => Err(format!("Unknown action: {other}")),
        };
        result.map(ToolResult::json).map_err(fail)
    }
}
