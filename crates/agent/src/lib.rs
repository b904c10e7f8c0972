//! The agent reasoning pipeline for agentexec.
//!
//! One run follows an **Assemble → Reason → Tear down** cycle:
//!
//! 1. **Connect** the agent's remote tool servers and merge their tools with
//!    the selected built-ins ([`toolset`])
//! 2. **Build context**: replayed history, retrieved knowledge and the
//!    composed system prompt ([`context`])
//! 3. **Send to LLM** via the injected provider
//! 4. **If tool calls**: invoke them ([`invoker`]), append observations,
//!    loop back to step 3
//! 5. **If text response**: return it with the recorded steps
//!
//! The loop stops at the first text-only response, when the step budget
//! runs out, or when the run is cancelled. Remote connections never
//! outlive the run.

pub mod context;
pub mod invoker;
pub mod loop_runner;
pub mod runner;
pub mod toolset;

pub use context::{ContextAssembler, compose_system_prompt};
pub use invoker::{Invocation, ToolInvoker};
pub use loop_runner::ReasoningLoop;
pub use runner::{AgentRunner, RunDefaults, RunRequest, resolve_max_steps};
pub use toolset::{assemble_toolset, remote_filter};
