//! System prompt composition and per-run context.
//!
//! The prompt handed to the model is built from layers, in order:
//!
//! | Layer | Source | Present when |
//! |-------|--------|--------------|
//! | 1. Base instructions | agent config, else a generic persona | always |
//! | 2. Capability disclosure | sorted, de-duplicated tool names | any tool is available |
//! | 3. Guardrails | fixed text | any tool is available |
//! | 4. Tool-family hints | fixed text per known tool | that tool is available |
//! | 5. Retrieved context | [`ContextAssembler::retrieve_context`] | retrieval found chunks |
//!
//! Conversation history is not part of the prompt; it is replayed as
//! messages by [`history_messages`].

pub mod assembler;

pub use assembler::{ContextAssembler, format_chunks, history_messages};

use std::collections::BTreeSet;

// ── Guidance text ─────────────────────────────────────────────────────────

pub const TOOL_USE_GUARDRAIL: &str = "When a user request requires information or actions from an available tool, \
you must call that tool before responding. Never claim an email was sent, \
data was read, or content was written unless the relevant tool execution \
actually reports success. If a tool call fails, explain the failure instead \
of fabricating a result.";

pub const SINGLE_ARGUMENT_GUARDRAIL: &str = "Each tool expects a single JSON object passed as its argument. \
Provide well-formed JSON containing all required fields whenever you invoke a tool.";

pub const GMAIL_HINT: &str = "For any email task you must call the Gmail tool. \
Supported actions include 'send', 'read', 'search', 'create_draft', 'get_message', and 'get_thread'. \
For 'send' and 'create_draft', include 'to', 'subject', and 'message' (or 'body'), plus optional 'is_html', 'cc', or 'bcc'. \
For reading, provide an 'email_id'/'message_id' or a search query with 'max_results'; \
set 'mark_as_read' to true only when the user explicitly asks. \
If the user asks to send an email but omits required information, ask follow-up questions before calling the tool.";

pub const SHEETS_HINT: &str = "For spreadsheet actions, call the Google Sheets tool with the requested operation and range. \
Do not fabricate spreadsheet contents.";

pub const CALENDAR_HINT: &str = "Use the Google Calendar tool to list events, fetch event details, or create calendar entries. \
Provide start/end timestamps in RFC3339 or YYYY-MM-DD format, and specify attendees as emails when needed.";

/// Tool-family hints keyed by lowercase tool name.
const TOOL_HINTS: &[(&str, &str)] = &[
    ("gmail", GMAIL_HINT),
    ("google_sheets", SHEETS_HINT),
    ("google_calendar", CALENDAR_HINT),
];

// ── Composition ───────────────────────────────────────────────────────────

/// Build the system prompt for one run.
///
/// `tool_names` may contain duplicates and blanks; both are dropped.
/// `retrieved` is the rendered retrieval block, empty when nothing matched.
pub fn compose_system_prompt<S: AsRef<str>>(
    base_prompt: &str,
    tool_names: &[S],
    retrieved: &str,
) -> String {
    let names: BTreeSet<&str> = tool_names
        .iter()
        .map(|n| n.as_ref().trim())
        .filter(|n| !n.is_empty())
        .collect();

    let mut blocks: Vec<String> = Vec::new();
    if !names.is_empty() {
        let listing: Vec<&str> = names.iter().copied().collect();
        blocks.push(format!(
            "You have access to the following tools to help users: {}.",
            listing.join(", ")
        ));
        blocks.push(TOOL_USE_GUARDRAIL.to_string());
        blocks.push(SINGLE_ARGUMENT_GUARDRAIL.to_string());
    }

    let lowered: BTreeSet<String> = names.iter().map(|n| n.to_lowercase()).collect();
    for (tool, hint) in TOOL_HINTS {
        if lowered.contains(*tool) {
            blocks.push((*hint).to_string());
        }
    }

    let mut prompt = base_prompt.trim().to_string();
    if !blocks.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(&blocks.join("\n\n"));
    }

    if !retrieved.is_empty() {
        prompt = format!("{prompt}\n\nContext:\n{retrieved}").trim().to_string();
    }
    prompt
}
