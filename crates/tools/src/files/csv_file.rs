//! CSV read/write tool.

use super::FileRoot;
use crate::params::{self, Params};
use agentexec_core::error::ToolError;
use agentexec_core::tool::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;
use serde_json::{Map, Number, Value, json};
use std::path::Path;

const TOOL_NAME: &str = "csv";

pub struct CsvFileTool {
    root: FileRoot,
}

impl CsvFileTool {
    pub fn new(root: FileRoot) -> Self {
        Self { root }
    }
}

fn fail(reason: impl std::fmt::Display) -> ToolError {
    ToolError::failed(TOOL_NAME, format!("CSV file error: {reason}"))
}

/// Only UTF-8 is supported; the name is echoed back as given.
pub(crate) fn check_encoding(encoding: &str) -> Result<(), String> {
    match encoding.to_ascii_lowercase().replace('_', "-").as_str() {
        "utf-8" | "utf8" => Ok(()),
        other => Err(format!("Unsupported encoding: {other}")),
    }
}

fn delimiter_byte(delimiter: &str) -> Result<u8, String> {
    match delimiter.as_bytes() {
        [b] => Ok(*b),
        _ => Err(format!(
            "Delimiter must be a single ASCII character, got '{delimiter}'"
        )),
    }
}

/// A cell read from disk: empty is null, numeric text becomes a number.
fn cell_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse CSV text into (columns, records).
pub fn read_records(text: &str, delimiter: u8) -> Result<(Vec<String>, Vec<Value>), csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns: Vec<String> = reader.headers()?.iter().map(String::from).collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: Map<String, Value> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| (column.clone(), row.get(i).map_or(Value::Null, cell_value)))
            .collect();
        records.push(Value::Object(record));
    }
    Ok((columns, records))
}

/// Render an array of objects as CSV. Columns follow first appearance.
pub fn write_records(rows: &[Value], delimiter: u8) -> Result<(Vec<String>, String), String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        let Value::Object(map) = row else {
            return Err("Each row must be a JSON object".into());
        };
        for key in map.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(&columns).map_err(|e| e.to_string())?;
    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|c| row.get(c).map(cell_text).unwrap_or_default())
            .collect();
        writer.write_record(&record).map_err(|e| e.to_string())?;
    }
    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    let text = String::from_utf8(bytes).map_err(|e| e.to_string())?;
    Ok((columns, text))
}

pub(crate) async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

impl CsvFileTool {
    async fn read(&self, file_path: &str, delimiter: &str, encoding: &str) -> Result<Value, String> {
        let path = self.root.resolve(file_path).map_err(|e| e.to_string())?;
        if !path.exists() {
            return Err(format!("File not found: {file_path}"));
        }
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| e.to_string())?;
        let (columns, records) =
            read_records(&text, delimiter_byte(delimiter)?).map_err(|e| e.to_string())?;
        Ok(json!({
            "file_path": file_path,
            "row_count": records.len(),
            "data": records,
            "columns": columns,
            "encoding": encoding,
            "delimiter": delimiter,
        }))
    }

    async fn write(
        &self,
        file_path: &str,
        params: &Params,
        delimiter: &str,
        encoding: &str,
    ) -> Result<Value, String> {
        let rows = match params.get("data") {
            Some(Value::Array(rows)) if !rows.is_empty() => rows,
            _ => return Err("No data provided for writing".into()),
        };
        let (columns, text) = write_records(rows, delimiter_byte(delimiter)?)?;

        let path = self.root.resolve(file_path).map_err(|e| e.to_string())?;
        ensure_parent(&path).await.map_err(|e| e.to_string())?;
        tokio::fs::write(&path, text)
            .await
            .map_err(|e| e.to_string())?;

        Ok(json!({
            "file_path": file_path,
            "rows_written": rows.len(),
            "columns": columns,
            "encoding": encoding,
            "delimiter": delimiter,
        }))
    }
}

#[async_trait]
impl Tool for CsvFileTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Read and write CSV files"
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
                "file_path": { "type": "string", "description": "Path to CSV file" },
                "data": { "type": "array", "description": "Data to write (required for write action)" },
                "delimiter": { "type": "string", "default": ",", "description": "CSV delimiter" },
                "encoding": { "type": "string", "default": "utf-8", "description": "File encoding" }
            },
            "required": ["action", "file_path"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, arguments: Value) -> Result<ToolResult, ToolError> {
        let params = arguments.as_object().cloned().unwrap_or_default();
        let action = params::text(&params, &["action"]).unwrap_or_default();
        let file_path = params::text(&params, &["file_path"])
            .ok_or_else(|| ToolError::Validation("Missing required parameter: file_path".into()))?;
        let delimiter = params::text(&params, &["delimiter"]).unwrap_or_else(|| ",".into());
        let encoding = params::text(&params, &["encoding"]).unwrap_or_else(|| "utf-8".into());
        check_encoding(&encoding).map_err(fail)?;

        let result = match action.as_str() {
            "read" => self.read(&file_path, &delimiter, &encoding).await,
            "write" => self.write(&file_path, &params, &delimiter, &encoding).await,
            other => Err(format!("Unknown action: {other}")),
        };
        result.map(ToolResult::json).map_err(fail)
    }
}
