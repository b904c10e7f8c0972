//! `agentexec remote`: Probe an agent's remote tool servers.

use crate::agent_file::AgentFile;
use agentexec_agent::remote_filter;
use agentexec_config::AppConfig;
use agentexec_remote::{RemoteSettings, RemoteToolkit};
use std::path::Path;

pub async fn run(config: &AppConfig, agent_path: &Path) -> anyhow::Result<()> {
    let agent = AgentFile::load(agent_path)?.into_agent("local");
    if agent.config.mcp_servers.is_empty() {
        println!("No remote tool servers configured for {}", agent.name);
        return Ok(());
    }

    let toolkit = RemoteToolkit::connect(
        &agent.config.mcp_servers,
        &remote_filter(&agent),
        &RemoteSettings::from(config),
    )
    .await;

    println!("Remote tools for {} ({} servers)", agent.name, agent.config.mcp_servers.len());
    for tool in toolkit.tools() {
        println!("  {:<24} {}", tool.name(), tool.description());
    }
    if toolkit.is_empty() {
        println!("  (none)");
    }
    for failure in toolkit.failures() {
        println!("  ⚠️  {failure}");
    }

    toolkit.shutdown().await;
    Ok(())
}
