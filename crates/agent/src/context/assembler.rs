//! Retrieved knowledge and replayed conversation history for a run.
//!
//! Both are best-effort inputs: a failing retrieval client degrades to an
//! empty context block, and history only ever contains executions that
//! completed with something to say.

use agentexec_core::error::StoreError;
use agentexec_core::execution::{Execution, ExecutionStatus};
use agentexec_core::message::Message;
use agentexec_core::retrieval::{RetrievalClient, RetrievedChunk};
use agentexec_core::store::{ExecutionQuery, ExecutionStore, Order};
use std::sync::Arc;
use tracing::{info, warn};

const PREVIEW_CHARS: usize = 200;

/// Pulls retrieval context and prior turns for an agent.
pub struct ContextAssembler {
    retrieval: Arc<dyn RetrievalClient>,
    executions: Arc<dyn ExecutionStore>,
    top_k: usize,
    history_limit: usize,
}

impl ContextAssembler {
    pub fn new(retrieval: Arc<dyn RetrievalClient>, executions: Arc<dyn ExecutionStore>) -> Self {
        Self {
            retrieval,
            executions,
            top_k: 3,
            history_limit: 20,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Search the agent's knowledge for `query` and render the hits.
    ///
    /// Never fails: retrieval errors are logged and yield an empty string.
    pub async fn retrieve_context(&self, agent_id: &str, query: &str) -> String {
        info!(
            agent_id = %agent_id,
            query_preview = %preview(query),
            top_k = self.top_k,
            "[RAG] Retrieval Start"
        );

        let chunks = match self.retrieval.search(agent_id, query, self.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "RAG retrieval failed");
                return String::new();
            }
        };

        if chunks.is_empty() {
            info!(agent_id = %agent_id, "[RAG] Retrieval Empty");
            return String::new();
        }

        for (index, chunk) in chunks.iter().enumerate() {
            info!(
                agent_id = %agent_id,
                index = index + 1,
                distance = %format!("{:.4}", chunk.distance),
                metadata = %chunk.metadata,
                preview = %preview(&chunk.content),
                "[RAG] Match"
            );
        }

        let rendered = format_chunks(&chunks);
        info!(agent_id = %agent_id, chunks = chunks.len(), "[RAG] Context Ready");
        rendered
    }

    /// The most recent completed executions of the agent, oldest first.
    ///
    /// With a `session_id`, only executions from that session are replayed.
    pub async fn history(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<Execution>, StoreError> {
        if self.history_limit == 0 {
            return Ok(Vec::new());
        }

        let query = ExecutionQuery {
            session_id: session_id.map(str::to_string),
            status: Some(ExecutionStatus::Completed),
            limit: Some(self.history_limit),
            order: Order::NewestFirst,
            ..ExecutionQuery::for_agent(agent_id)
        };
        let mut executions = self.executions.list_executions(&query).await?;
        executions.retain(|e| e.output.is_some());
        executions.reverse();
        Ok(executions)
    }
}

/// Render retrieved chunks as `[i] (distance: D) metadata=<json>` headers
/// followed by the chunk text, separated by blank lines.
pub fn format_chunks(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            let metadata = if chunk.metadata.is_null() {
                serde_json::Value::Object(Default::default())
            } else {
                chunk.metadata.clone()
            };
            format!(
                "[{}] (distance: {:.4}) metadata={}\n{}",
                index + 1,
                chunk.distance,
                metadata,
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One user turn and one assistant turn per execution; empty sides are skipped.
pub fn history_messages(executions: &[Execution]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(executions.len() * 2);
    for execution in executions {
        if !execution.input.input.is_empty() {
            messages.push(Message::user(&execution.input.input));
        }
        if let Some(reply) = execution.output_text().filter(|r| !r.is_empty()) {
            messages.push(Message::assistant(reply));
        }
    }
    messages
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
