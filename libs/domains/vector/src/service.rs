use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::error::VectorResult;
use crate::index::SimilarityIndex;
use crate::models::{QueryFilter, ScoredRecord, namespace_for_knowledge_base};

/// Text search over a knowledge base.
///
/// Combines an embedding provider with a similarity index
pub struct RetrievalService {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SimilarityIndex>,
}

impl RetrievalService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, index: Arc<dyn SimilarityIndex>) -> Self {
        Self { provider, index }
    }

    /// Top `top_k` chunks of the knowledge base most similar to `text`.
    ///
    /// Blank text fails with `Validation`. A transient index failure yields an
    /// empty list.
    #[instrument(skip(self, text, filter))]
    pub async fn search(
        &self,
        knowledge_base_id: Uuid,
        text: &str,
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> VectorResult<Vec<ScoredRecord>> {
        let embedding = self.provider.embed_one(text).await?;
        let namespace = namespace_for_knowledge_base(knowledge_base_id);

        self.index.query(&namespace, &embedding, top_k, filter).await
    }
}
