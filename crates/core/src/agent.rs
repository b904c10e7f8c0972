//! Agent definitions: an owned language-model setup plus a toolset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of an agent. Deletion is soft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Active,
    Inactive,
    Deleted,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Free-form language-model settings attached to an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Per-agent API key; falls back to the process-wide key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// The agent's configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub llm: LlmSettings,

    /// Top-level prompt, consulted after `llm.system_prompt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Remote tool servers: alias → raw connection map.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mcp_servers: BTreeMap<String, serde_json::Value>,

    /// Explicit allow-list applied to remote tools. Empty means "all".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,

    /// Names of built-in tools attached to this agent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
}

/// A named, owned agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub config: AgentConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, config: AgentConfig) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: name.into(),
            status: AgentStatus::Active,
            config,
            created_at: now,
            updated_at: now,
        }
    }

    /// The base instructions: `llm.system_prompt`, then `system_prompt`,
    /// then a generic persona naming the agent.
    pub fn base_prompt(&self) -> String {
        self.config
            .llm
            .system_prompt
            .as_deref()
            .or(self.config.system_prompt.as_deref())
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("You are a helpful AI assistant named {}.", self.name))
    }

    pub fn is_deleted(&self) -> bool {
        self.status == AgentStatus::Deleted
    }
}
