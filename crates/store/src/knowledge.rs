//! In-memory vector knowledge base.
//!
//! Chunks are embedded once on insert through the configured [`Provider`]
//! and ranked by cosine distance at query time. Each agent sees only its
//! own chunks.

use crate::vector::cosine_distance;
use agentexec_core::error::StoreError;
use agentexec_core::provider::{EmbeddingRequest, Provider};
use agentexec_core::retrieval::{RetrievalClient, RetrievedChunk};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

struct StoredChunk {
    agent_id: String,
    content: String,
    metadata: serde_json::Value,
    embedding: Vec<f32>,
}

pub struct KnowledgeBase {
    embedder: Arc<dyn Provider>,
    model: String,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl KnowledgeBase {
    pub fn new(embedder: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            embedder,
            model: model.into(),
            chunks: RwLock::new(Vec::new()),
        }
    }

    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, StoreError> {
        let expected = inputs.len();
        let response = self
            .embedder
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs,
            })
            .await
            .map_err(|e| StoreError::QueryFailed(format!("embedding failed: {e}")))?;

        if response.embeddings.len() != expected {
            return Err(StoreError::QueryFailed(format!(
                "expected {expected} embeddings, got {}",
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }

    /// Embed and store chunks for an agent. Returns how many were added.
    pub async fn add_documents(
        &self,
        agent_id: &str,
        documents: Vec<(String, serde_json::Value)>,
    ) -> Result<usize, StoreError> {
        if documents.is_empty() {
            return Ok(0);
        }
        let embeddings = self
            .embed(documents.iter().map(|(c, _)| c.clone()).collect())
            .await?;

        let mut chunks = self.chunks.write().await;
        let added = documents.len();
        for ((content, metadata), embedding) in documents.into_iter().zip(embeddings) {
            chunks.push(StoredChunk {
                agent_id: agent_id.to_string(),
                content,
                metadata,
                embedding,
            });
        }
        debug!(agent_id, added, "Stored knowledge chunks");
        Ok(added)
    }

    pub async fn add_document(
        &self,
        agent_id: &str,
        content: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.add_documents(agent_id, vec![(content.into(), metadata)])
            .await
            .map(|_| ())
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

#[async_trait]
impl RetrievalClient for KnowledgeBase {
    async fn search(
        &self,
        agent_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        {
            let chunks = self.chunks.read().await;
            if !chunks.iter().any(|c| c.agent_id == agent_id) {
                return Ok(Vec::new());
            }
        }

        let query_embedding = self
            .embed(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let chunks = self.chunks.read().await;
        let mut scored: Vec<RetrievedChunk> = chunks
            .iter()
            .filter(|c| c.agent_id == agent_id)
            .map(|c| RetrievedChunk {
                content: c.content.clone(),
                metadata: c.metadata.clone(),
                distance: cosine_distance(&c.embedding, &query_embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}
