//! The seam between execution bookkeeping and actually running an agent.

use agentexec_agent::{AgentRunner, RunRequest};
use agentexec_core::agent::Agent;
use agentexec_core::error::Error;
use agentexec_core::execution::RunOutput;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Runs an agent to completion. The manager records whatever comes back.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Implementations should stop early once `cancel` fires and still
    /// release any resources acquired for the run.
    async fn run(
        &self,
        agent: &Agent,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunOutput, Error>;
}

#[async_trait]
impl Runner for AgentRunner {
    async fn run(
        &self,
        agent: &Agent,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunOutput, Error> {
        AgentRunner::run(self, agent, request, cancel).await
    }
}
