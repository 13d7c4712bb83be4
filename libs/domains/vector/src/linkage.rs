use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{VectorError, VectorResult};
use crate::index::SimilarityIndex;
use crate::models::{Chunk, VectorRecord, VectorRef};
use crate::refs::VectorRefStore;

/// Result of linking one chunk
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    /// Vector stored and ref recorded
    Linked(VectorRef),
    /// The index refused the record (orphaned chunk or wrong dimension)
    Skipped,
}

/// Ties chunks to their vectors through backend-agnostic [`VectorRef`]s.
///
/// Writes are two idempotent steps keyed by chunk id: the vector first, then
/// the ref. A failure between the two leaves a vector without a current ref;
/// calling again completes the link.
pub struct KnowledgeLinkage {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SimilarityIndex>,
    refs: Arc<dyn VectorRefStore>,
}

impl KnowledgeLinkage {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SimilarityIndex>,
        refs: Arc<dyn VectorRefStore>,
    ) -> Self {
        Self {
            provider,
            index,
            refs,
        }
    }

    /// Embed the chunk content, then store and link the vector.
    #[instrument(
        skip(self, chunk),
        fields(chunk_id = %chunk.id, knowledge_base_id = %chunk.knowledge_base_id)
    )]
    pub async fn embed_and_link(&self, chunk: &Chunk) -> VectorResult<LinkOutcome> {
        let vector = self.provider.embed_one(&chunk.content).await?;
        self.link_vector(chunk, vector).await
    }

    /// Store an already computed vector for the chunk and link it.
    pub async fn link_vector(&self, chunk: &Chunk, vector: Vec<f32>) -> VectorResult<LinkOutcome> {
        let namespace = chunk.namespace();
        let dimension = u32::try_from(vector.len())
            .map_err(|_| VectorError::Validation("vector is too long".to_string()))?;

        self.index.ensure_namespace(&namespace, dimension).await?;

        let record = VectorRecord::for_chunk(chunk, vector, self.provider.model());
        let report = self.index.upsert(&namespace, vec![record]).await?;
        if report.upserted == 0 {
            return Ok(LinkOutcome::Skipped);
        }

        let vector_ref = VectorRef::new(chunk.id, self.index.backend(), &namespace);
        if let Err(err) = self.refs.upsert(vector_ref.clone()).await {
            warn!(
                chunk_id = %chunk.id,
                namespace = %namespace,
                error = %err,
                "Vector stored but ref update failed; retry the link"
            );
            return Err(err);
        }

        info!(chunk_id = %chunk.id, namespace = %namespace, "Linked chunk vector");
        Ok(LinkOutcome::Linked(vector_ref))
    }

    /// Remove the chunk's vector, then its ref. Both steps tolerate absence.
    pub async fn unlink(&self, chunk: &Chunk) -> VectorResult<()> {
        let namespace = chunk.namespace();
        self.index.delete(&namespace, &[chunk.id]).await?;
        self.refs
            .delete_for_chunks(&[chunk.id], self.index.backend())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DeterministicProvider;
    use crate::index::InMemoryIndex;
    use crate::models::IndexBackend;
    use crate::refs::MockVectorRefStore;
    use uuid::Uuid;

    fn chunk() -> Chunk {
        Chunk::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            0,
            "Orders ship within two business days.",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ref_failure_leaves_vector_and_retry_completes() {
        let index = Arc::new(InMemoryIndex::new());
        let mut refs = MockVectorRefStore::new();
        let mut seq = mockall::Sequence::new();
        refs.expect_upsert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(VectorError::StoreTransient("connection reset".into())));
        refs.expect_upsert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let linkage = KnowledgeLinkage::new(
            Arc::new(DeterministicProvider::new(8).unwrap()),
            index.clone(),
            Arc::new(refs),
        );
        let chunk = chunk();

        assert!(linkage.embed_and_link(&chunk).await.is_err());
        assert!(index.get(&chunk.namespace(), chunk.id).await.is_some());

        let outcome = linkage.embed_and_link(&chunk).await.unwrap();
        assert!(matches!(outcome, LinkOutcome::Linked(r) if r.backend == IndexBackend::Memory));
        assert_eq!(index.record_count(&chunk.namespace()).await, Some(1));
    }

    #[tokio::test]
    async fn test_unlink_removes_vector_then_ref() {
        let index = Arc::new(InMemoryIndex::new());
        let mut refs = MockVectorRefStore::new();
        refs.expect_upsert().returning(|_| Ok(()));
        refs.expect_delete_for_chunks()
            .withf(|ids, backend| ids.len() == 1 && *backend == IndexBackend::Memory)
            .times(1)
            .returning(|_, _| Ok(1));

        let linkage = KnowledgeLinkage::new(
            Arc::new(DeterministicProvider::new(8).unwrap()),
            index.clone(),
            Arc::new(refs),
        );
        let chunk = chunk();

        linkage.embed_and_link(&chunk).await.unwrap();
        linkage.unlink(&chunk).await.unwrap();
        assert_eq!(index.record_count(&chunk.namespace()).await, Some(0));
    }
}
