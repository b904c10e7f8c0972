//! Error types for the agentexec domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them so `?` works across crate boundaries.

use thiserror::Error;

/// The top-level error type for all agentexec operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Remote tool server errors ---
    #[error("Remote tool error: {0}")]
    Remote(#[from] RemoteToolError),

    // --- Credential errors ---
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An agent or execution is absent or not owned by the caller.
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    /// A state-machine transition that is not allowed.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Anything raised while the reasoning loop was running.
    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Parameters failed the declared schema (required fields, primitive types).
    #[error("{0}")]
    Validation(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

impl ToolError {
    pub fn failed(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }
}

/// Failures talking to an external tool server. Always scoped to one alias.
#[derive(Debug, Clone, Error)]
pub enum RemoteToolError {
    #[error("Failed to initialise MCP server '{alias}': {cause}")]
    Connection { alias: String, cause: String },

    #[error("MCP server '{alias}' returned HTTP {status}")]
    Http { alias: String, status: u16 },

    #[error("Unsupported transport '{transport}' in MCP server '{alias}' configuration")]
    UnsupportedTransport { alias: String, transport: String },

    #[error("Invalid configuration for MCP server '{alias}': {reason}")]
    InvalidConfig { alias: String, reason: String },

    #[error("MCP server '{alias}' protocol error: {message}")]
    Protocol { alias: String, message: String },

    #[error("MCP server '{alias}' timed out")]
    Timeout { alias: String },

    /// The allow-list matched nothing on any reachable server.
    #[error("No MCP tools matched the provided filters")]
    NoToolsMatched,
}

impl RemoteToolError {
    /// The server alias this error belongs to, if any.
    pub fn alias(&self) -> Option<&str> {
        match self {
            Self::Connection { alias, .. }
            | Self::Http { alias, .. }
            | Self::UnsupportedTransport { alias, .. }
            | Self::InvalidConfig { alias, .. }
            | Self::Protocol { alias, .. }
            | Self::Timeout { alias } => Some(alias),
            Self::NoToolsMatched => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("No {service} credentials found. Connect your {service} account first.")]
    Missing { service: String },

    #[error("{service} authentication expired. Reconnect your {service} account to restore access.")]
    Expired { service: String },

    #[error("{service} credentials are missing required permissions: {}", missing.join(", "))]
    InsufficientScope { service: String, missing: Vec<String> },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Credential store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}
