//! Directory listing tool with `*`/`?` name patterns.

use super::FileRoot;
use crate::params;
use agentexec_core::error::ToolError;
use agentexec_core::tool::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const TOOL_NAME: &str = "file_list";

pub struct FileListTool {
    root: FileRoot,
}

/// Shell-style match: `*` any run of characters, `?` exactly one.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut n, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some('?') => {
                n += 1;
                p += 1;
            }
            Some(c) if *c == name[n] => {
                n += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

async fn entry(path: PathBuf, name: String) -> Option<Value> {
    let meta = tokio::fs::metadata(&path).await.ok()?;
    if !meta.is_file() {
        return None;
    }
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0.0, |d| d.as_secs_f64());
    Some(json!({
        "path": path.display().to_string(),
        "name": name,
        "size": meta.len(),
        "modified": modified,
    }))
}

async fn collect(dir: &Path, pattern: &str, recursive: bool) -> std::io::Result<Vec<Value>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        let mut names = Vec::new();
        while let Some(item) = entries.next_entry().await? {
            names.push(item.path());
        }
        names.sort();

        for path in names {
            if recursive && path.is_dir() {
                pending.push(path);
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if matches_pattern(&name, pattern)
                && let Some(file) = entry(path, name).await
            {
                files.push(file);
            }
        }
    }
    Ok(files)
}

impl FileListTool {
    pub fn new(root: FileRoot) -> Self {
        Self { root }
    }

    async fn list(&self, directory: &str, pattern: &str, recursive: bool) -> Result<Value, String> {
        let path = self.root.resolve(directory).map_err(|e| e.to_string())?;
        if !path.exists() {
            return Err(format!("Directory not found: {directory}"));
        }
        if !path.is_dir() {
            return Err(format!("Not a directory: {directory}"));
        }
        let files = collect(&path, pattern, recursive)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({
            "directory": directory,
            "pattern": pattern,
            "recursive": recursive,
            "count": files.len(),
            "files": files,
        }))
    }
}

#[async_trait]
impl Tool for FileListTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "List files in a directory"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory": { "type": "string", "description": "Directory path to list" },
                "pattern": { "type": "string", "description": "File pattern (e.g., '*.csv', '*.json')" },
                "recursive": { "type": "boolean", "default": false, "description": "Search recursively" }
            },
            "required": ["directory"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, arguments: Value) -> Result<ToolResult, ToolError> {
        let params = arguments.as_object().cloned().unwrap_or_default();
        let directory = params::text(&params, &["directory"])
            .ok_or_else(|| ToolError::Validation("Missing required parameter: directory".into()))?;
        let pattern = params::text(&params, &["pattern"]).unwrap_or_else(|| "*".into());
        let recursive = params::coerce_bool(params.get("recursive"));

        self.list(&directory, &pattern, recursive)
            .await
            .map(ToolResult::json)
            .map_err(|e| ToolError::failed(TOOL_NAME, format!("File listing error: {e}")))
    }
}
