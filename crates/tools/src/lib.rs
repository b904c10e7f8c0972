//! Built-in tools and tool plumbing for agentexec.
//!
//! - [`validation`]: the declarative parameter check every tool call passes
//! - [`input`]: strict-then-lenient parsing of raw tool arguments
//! - [`google`]: Gmail, Sheets and Calendar behind a shared refresh-once client
//! - [`files`]: CSV, JSON and directory listing, optionally confined to a root
//! - [`catalog`]: persisted tool records and standalone execution
//!
//! The built-in registry is assembled once by [`builtin_registry`] and shared
//! by every execution.

pub mod catalog;
pub mod files;
pub mod google;
pub mod input;
pub(crate) mod params;
pub mod validation;

use agentexec_core::tool::ToolRegistry;
use files::{CsvFileTool, FileListTool, FileRoot, JsonFileTool};
use google::{GmailTool, GoogleApi, GoogleCalendarTool, GoogleSheetsTool};
use std::sync::Arc;

pub use catalog::ToolCatalog;
pub use input::{ArgsParseError, parse_tool_input, parse_tool_value};
pub use validation::validate_parameters;

/// Names of every built-in tool, in registration order.
pub const BUILTIN_TOOL_NAMES: &[&str] = &[
    "gmail",
    "google_sheets",
    "google_calendar",
    "csv",
    "json",
    "file_list",
];

/// What the built-in tools need from the host.
#[derive(Clone)]
pub struct BuiltinDeps {
    pub google: GoogleApi,
    pub files: FileRoot,
}

/// Register all built-in tools.
pub fn builtin_registry(deps: BuiltinDeps) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GmailTool::new(deps.google.clone())));
    registry.register(Arc::new(GoogleSheetsTool::new(deps.google.clone())));
    registry.register(Arc::new(GoogleCalendarTool::new(deps.google)));
    registry.register(Arc::new(CsvFileTool::new(deps.files.clone())));
    registry.register(Arc::new(JsonFileTool::new(deps.files.clone())));
    registry.register(Arc::new(FileListTool::new(deps.files)));
    registry
}
