//! Agent definitions read from TOML files.
//!
//! ```toml
//! id = "support"
//! name = "Support Bot"
//! system_prompt = "You answer billing questions."
//! tools = ["csv"]
//! allowed_tools = ["send_mail"]
//!
//! [llm]
//! model = "gpt-4o-mini"
//!
//! [mcp_servers.mail]
//! url = "http://localhost:9000"
//! transport = "streamable_http"
//! ```

use agentexec_core::agent::{Agent, AgentConfig};
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct AgentFile {
    /// Stable id; a fresh one is generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub config: AgentConfig,
}

impl AgentFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read agent file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid agent file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The agent owned by `user_id`.
    pub fn into_agent(self, user_id: &str) -> Agent {
        let mut agent = Agent::new(user_id, self.name, self.config);
        if let Some(id) = self.id.filter(|id| !id.trim().is_empty()) {
            agent.id = id;
        }
        agent
    }
}
