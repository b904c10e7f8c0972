//! In-memory store: useful for testing and ephemeral runs.

use agentexec_core::agent::{Agent, AgentStatus};
use agentexec_core::credential::{Credential, CredentialStore};
use agentexec_core::error::StoreError;
use agentexec_core::execution::{Execution, ExecutionStatus};
use agentexec_core::store::{AgentStore, ExecutionQuery, ExecutionStore, Order, ToolRecordStore};
use agentexec_core::tool_record::ToolRecord;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    agents: HashMap<String, Agent>,
    /// Insertion order doubles as the tie-breaker for equal timestamps.
    executions: Vec<Execution>,
    tools: Vec<ToolRecord>,
    credentials: HashMap<(String, String), Credential>,
}

/// A store that keeps every table in process memory.
///
/// Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStore for InMemoryStore {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        Ok(self.tables.read().await.agents.get(agent_id).cloned())
    }

    async fn put_agent(&self, agent: Agent) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .agents
            .insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>, StoreError> {
        let tables = self.tables.read().await;
        let mut agents: Vec<Agent> = tables
            .agents
            .values()
            .filter(|a| a.user_id == user_id && !a.is_deleted())
            .cloned()
            .collect();
        agents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(agents)
    }

    async fn set_agent_status(&self, agent_id: &str, status: AgentStatus) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.status = status;
                agent.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.executions.iter().any(|e| e.id == execution.id) {
            return Err(StoreError::Conflict(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        tables.executions.push(execution.clone());
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<Execution>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .executions
            .iter()
            .find(|e| e.id == execution_id)
            .cloned())
    }

    async fn update_execution_if(
        &self,
        execution: &Execution,
        expected: ExecutionStatus,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.executions.iter_mut().find(|e| e.id == execution.id) {
            Some(stored) if stored.status == expected => {
                *stored = execution.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_executions(&self, query: &ExecutionQuery) -> Result<Vec<Execution>, StoreError> {
        let tables = self.tables.read().await;
        let mut matched: Vec<&Execution> = tables
            .executions
            .iter()
            .filter(|e| query.matches(e))
            .collect();

        // Stable sort keeps insertion order among equal timestamps
        matched.sort_by_key(|e| e.created_at);
        if query.order == Order::NewestFirst {
            matched.reverse();
        }

        Ok(matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ToolRecordStore for InMemoryStore {
    async fn get_tool_record(&self, id: &str) -> Result<Option<ToolRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.tools.iter().find(|t| t.id == id).cloned())
    }

    async fn find_tool_record(&self, name: &str) -> Result<Option<ToolRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.tools.iter().find(|t| t.name == name).cloned())
    }

    async fn list_tool_records(&self) -> Result<Vec<ToolRecord>, StoreError> {
        let mut tools = self.tables.read().await.tools.clone();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    async fn insert_tool_record(&self, record: &ToolRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.tools.iter().any(|t| t.name == record.name) {
            return Err(StoreError::Conflict(format!(
                "tool '{}' already exists",
                record.name
            )));
        }
        tables.tools.push(record.clone());
        Ok(())
    }

    async fn update_tool_record(&self, record: &ToolRecord) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .tools
            .iter()
            .any(|t| t.name == record.name && t.id != record.id)
        {
            return Err(StoreError::Conflict(format!(
                "tool '{}' already exists",
                record.name
            )));
        }
        match tables.tools.iter_mut().find(|t| t.id == record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_tool_record(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let len_before = tables.tools.len();
        tables.tools.retain(|t| t.id != id);
        Ok(tables.tools.len() < len_before)
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn get_credential(
        &self,
        user_id: &str,
        service: &str,
    ) -> Result<Option<Credential>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .credentials
            .get(&(user_id.to_string(), service.to_string()))
            .cloned())
    }

    async fn put_credential(&self, credential: Credential) -> Result<(), StoreError> {
        let key = (credential.user_id.clone(), credential.service.clone());
        self.tables.write().await.credentials.insert(key, credential);
        Ok(())
    }

    async fn delete_credential(&self, user_id: &str, service: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .credentials
            .remove(&(user_id.to_string(), service.to_string()))
            .is_some())
    }
}
