//! Persistence traits consumed by the engine.
//!
//! Implementations: in-memory (tests, ephemeral runs) and SQLite, both in
//! `agentexec-store`. Stores do per-row work only; ownership checks and
//! state-machine rules live in the callers.

use crate::agent::{Agent, AgentStatus};
use crate::error::StoreError;
use crate::execution::{Execution, ExecutionStatus};
use crate::tool_record::ToolRecord;
use async_trait::async_trait;

type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn get_agent(&self, agent_id: &str) -> StoreResult<Option<Agent>>;

    /// Insert or replace an agent.
    async fn put_agent(&self, agent: Agent) -> StoreResult<()>;

    /// Non-deleted agents owned by the user.
    async fn list_agents(&self, user_id: &str) -> StoreResult<Vec<Agent>>;

    async fn set_agent_status(&self, agent_id: &str, status: AgentStatus) -> StoreResult<bool>;

    /// The agent if it exists, belongs to `user_id`, and is not deleted.
    async fn get_owned_agent(&self, agent_id: &str, user_id: &str) -> StoreResult<Option<Agent>> {
        Ok(self
            .get_agent(agent_id)
            .await?
            .filter(|a| a.user_id == user_id && !a.is_deleted()))
    }
}

/// Ordering of execution listings by creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    OldestFirst,
    #[default]
    NewestFirst,
}

/// Filters for listing executions. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ExecutionQuery {
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub order: Order,
}

impl ExecutionQuery {
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Default::default()
        }
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, exec: &Execution) -> bool {
        self.agent_id.as_ref().is_none_or(|a| a == &exec.agent_id)
            && self.user_id.as_ref().is_none_or(|u| u == &exec.user_id)
            && self
                .session_id
                .as_ref()
                .is_none_or(|s| exec.session_id.as_ref() == Some(s))
            && self.status.is_none_or(|s| s == exec.status)
    }
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert_execution(&self, execution: &Execution) -> StoreResult<()>;

    async fn get_execution(&self, execution_id: &str) -> StoreResult<Option<Execution>>;

    /// Overwrite the record only if its stored status is still `expected`.
    /// Returns false when the status had already moved on.
    async fn update_execution_if(
        &self,
        execution: &Execution,
        expected: ExecutionStatus,
    ) -> StoreResult<bool>;

    async fn list_executions(&self, query: &ExecutionQuery) -> StoreResult<Vec<Execution>>;
}

#[async_trait]
pub trait ToolRecordStore: Send + Sync {
    async fn get_tool_record(&self, id: &str) -> StoreResult<Option<ToolRecord>>;

    async fn find_tool_record(&self, name: &str) -> StoreResult<Option<ToolRecord>>;

    async fn list_tool_records(&self) -> StoreResult<Vec<ToolRecord>>;

    /// Fails with `StoreError::Conflict` when the name is taken.
    async fn insert_tool_record(&self, record: &ToolRecord) -> StoreResult<()>;

    async fn update_tool_record(&self, record: &ToolRecord) -> StoreResult<bool>;

    async fn delete_tool_record(&self, id: &str) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionInput;

    #[test]
    fn query_matches_on_every_set_field() {
        let mut exec = Execution::start("a1", "u1", ExecutionInput::default(), Some("s1".into()));
        exec.status = ExecutionStatus::Completed;

        assert!(ExecutionQuery::default().matches(&exec));
        assert!(ExecutionQuery::for_agent("a1").matches(&exec));
        assert!(!ExecutionQuery::for_agent("a2").matches(&exec));

        let q = ExecutionQuery {
            session_id: Some("s2".into()),
            ..ExecutionQuery::for_user("u1")
        };
        assert!(!q.matches(&exec));

        let q = ExecutionQuery {
            status: Some(ExecutionStatus::Completed),
            ..ExecutionQuery::for_agent("a1")
        };
        assert!(q.matches(&exec));
    }
}
