//! Retrieval Client contract: top-K stored chunks relevant to a query.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored text chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Lower is closer.
    pub distance: f32,
}

#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn search(
        &self,
        agent_id: &str,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<RetrievedChunk>, StoreError>;
}
