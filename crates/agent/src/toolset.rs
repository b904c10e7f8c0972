//! Per-run toolset: the agent's built-in selection plus remote tools.

use agentexec_core::agent::Agent;
use agentexec_core::tool::{Tool, ToolRegistry};
use agentexec_remote::ToolFilter;
use std::sync::Arc;
use tracing::{debug, warn};

/// The remote allow-list declared by the agent.
pub fn remote_filter(agent: &Agent) -> ToolFilter {
    ToolFilter::from_names(agent.config.allowed_tools.iter())
}

/// Combine the agent's built-in tools with remote ones.
///
/// Built-ins win on name collisions; the shadowed remote tool is dropped
/// with a warning. Unknown built-in names are skipped.
pub fn assemble_toolset(builtins: &ToolRegistry, agent: &Agent, remote: &[Arc<dyn Tool>]) -> ToolRegistry {
    for name in &agent.config.tools {
        if !builtins.contains(name) {
            warn!(agent_id = %agent.id, tool = %name, "Agent references an unknown built-in tool");
        }
    }

    let mut toolset = builtins.select(&agent.config.tools);
    for tool in remote {
        if !toolset.register_if_absent(tool.clone()) {
            warn!(
                agent_id = %agent.id,
                tool = %tool.name(),
                "Remote tool shadowed by a built-in of the same name"
            );
        }
    }

    debug!(agent_id = %agent.id, tools = ?toolset.names(), "Toolset assembled");
    toolset
}
