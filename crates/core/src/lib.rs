//! # agentexec core
//!
//! Domain types, traits, and error definitions for the agent execution engine.
//! This crate has no I/O of its own: it defines the model every other crate
//! implements against.
//!
//! Every external collaborator (language model, persistence, credential
//! store, retrieval, tools) is a trait here; implementations live in their
//! own crates and are injected as `Arc<dyn Trait>`.

pub mod agent;
pub mod credential;
pub mod error;
pub mod event;
pub mod execution;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod store;
pub mod tool;
pub mod tool_record;

// Re-export key types at crate root for ergonomics
pub use agent::{Agent, AgentConfig, AgentStatus, LlmSettings};
pub use credential::{Credential, CredentialProvider, CredentialStore};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use execution::{
    Execution, ExecutionInput, ExecutionStats, ExecutionStatus, IntermediateStep, RunOutput,
};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use retrieval::{RetrievalClient, RetrievedChunk};
pub use store::{AgentStore, ExecutionQuery, ExecutionStore, Order, ToolRecordStore};
pub use tool::{Tool, ToolCall, ToolContext, ToolRegistry, ToolResult};
pub use tool_record::{ToolKind, ToolRecord};
