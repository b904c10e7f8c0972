//! Remote tool servers for agentexec.
//!
//! Agents may name any number of external tool servers. For each run the
//! [`RemoteToolkit`] sanitizes their connection maps, connects to all of them
//! concurrently over stdio, SSE or streamable HTTP, lists their tools,
//! applies the agent's allow-list and hands back plain [`Tool`] objects.
//! A server that cannot be reached costs only its own tools.
//!
//! [`Tool`]: agentexec_core::tool::Tool

pub mod config;
pub mod filter;
pub mod protocol;
pub mod session;
pub mod tool;
pub mod toolkit;
pub mod transport;

pub use config::{
    ConnectionSpec, RemoteSettings, ServerConfig, Target, TransportKind, alternate_url,
    canonical_url, sanitize_server_config,
};
pub use filter::ToolFilter;
pub use session::RemoteSession;
pub use tool::RemoteTool;
pub use toolkit::RemoteToolkit;
