//! No-op retrieval: agents without a knowledge base get no context.

use agentexec_core::error::StoreError;
use agentexec_core::retrieval::{RetrievalClient, RetrievedChunk};
use async_trait::async_trait;

/// A retrieval client that never finds anything.
pub struct NoopRetrieval;

#[async_trait]
impl RetrievalClient for NoopRetrieval {
    async fn search(
        &self,
        _agent_id: &str,
        _query: &str,
        _top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        Ok(Vec::new())
    }
}
