//! Namespace-scoped similarity index and its backends.

mod catalog;
mod memory;
mod pgvector;

use std::collections::HashSet;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::warn;

use crate::error::{VectorError, VectorResult};
use crate::models::{
    ChunkId, IndexBackend, NamespaceInfo, QueryFilter, ScoredRecord, UpsertReport, VectorRecord,
};

pub use catalog::{ChunkCatalog, InMemoryChunkCatalog, PgChunkCatalog};
#[cfg(test)]
pub use catalog::MockChunkCatalog;
pub use memory::InMemoryIndex;
pub use pgvector::PgVectorIndex;

/// CRUD and nearest-neighbour search over vector records, partitioned by namespace.
///
/// Every backend shares these rules:
/// - `ensure_namespace` never drops data and rejects a dimension change.
/// - `upsert` is insert-or-replace by id. Orphaned, wrong-sized or non-finite
///   records are skipped with a warning and reported in [`UpsertReport::skipped`].
/// - `query` absorbs transient backend failures into an empty result.
/// - `delete` ignores unknown ids.
/// - `stream_all` starts a fresh pass on every call.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    fn backend(&self) -> IndexBackend;

    async fn ensure_namespace(&self, namespace: &str, dimension: u32)
    -> VectorResult<NamespaceInfo>;

    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>)
    -> VectorResult<UpsertReport>;

    /// Up to `top_k` records ordered by descending score. The namespace always
    /// bounds the search; `filter` narrows it further.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> VectorResult<Vec<ScoredRecord>>;

    /// Returns how many records were removed.
    async fn delete(&self, namespace: &str, ids: &[ChunkId]) -> VectorResult<u64>;

    /// Pull-based batches of at most `batch_size` records covering the namespace.
    fn stream_all<'a>(
        &'a self,
        namespace: &'a str,
        batch_size: usize,
    ) -> BoxStream<'a, VectorResult<Vec<VectorRecord>>>;
}

/// Query-path policy: transient store failures become an empty result.
pub(crate) fn absorb_transient(
    backend: IndexBackend,
    namespace: &str,
    result: VectorResult<Vec<ScoredRecord>>,
) -> VectorResult<Vec<ScoredRecord>> {
    match result {
        Err(err) if err.is_transient_store() => {
            warn!(
                backend = %backend,
                namespace = %namespace,
                error = %err,
                "Similarity query failed transiently, returning no results"
            );
            Ok(Vec::new())
        }
        other => other,
    }
}

pub(crate) fn validate_batch_size(batch_size: usize) -> VectorResult<()> {
    if batch_size == 0 {
        return Err(VectorError::Validation(
            "batch size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_probe(dimension: u32, vector: &[f32]) -> VectorResult<()> {
    if vector.len() != dimension as usize {
        return Err(VectorError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Cosine similarity in `[-1, 1]`; zero vectors score 0.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

/// Split a batch into records safe to write and ids to skip.
///
/// A record is skipped when its vector does not match the namespace
/// dimension, holds a NaN or infinite component, or (with a catalog) when
/// its owning chunk no longer exists.
pub(crate) async fn screen_records(
    namespace: &str,
    dimension: u32,
    records: Vec<VectorRecord>,
    catalog: Option<&dyn ChunkCatalog>,
) -> VectorResult<(Vec<VectorRecord>, Vec<ChunkId>)> {
    let mut skipped = Vec::new();

    let sized: Vec<VectorRecord> = records
        .into_iter()
        .filter(|record| {
            if record.vector.len() != dimension as usize {
                warn!(
                    namespace = %namespace,
                    id = %record.id,
                    expected = dimension,
                    actual = record.vector.len(),
                    "Skipping vector record with wrong dimension"
                );
                skipped.push(record.id);
                return false;
            }
            if !record.vector.iter().all(|x| x.is_finite()) {
                warn!(
                    namespace = %namespace,
                    id = %record.id,
                    "Skipping vector record with non-finite component"
                );
                skipped.push(record.id);
                return false;
            }
            true
        })
        .collect();

    let Some(catalog) = catalog else {
        return Ok((sized, skipped));
    };
    if sized.is_empty() {
        return Ok((sized, skipped));
    }

    let ids: Vec<ChunkId> = sized.iter().map(|r| r.id).collect();
    let live: HashSet<ChunkId> = catalog.live_chunks(&ids).await?;

    let accepted = sized
        .into_iter()
        .filter(|record| {
            if live.contains(&record.id) {
                return true;
            }
            warn!(
                namespace = %namespace,
                id = %record.id,
                "Skipping vector record without a live owning chunk"
            );
            skipped.push(record.id);
            false
        })
        .collect();

    Ok((accepted, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_absorb_transient_only() {
        let absorbed = absorb_transient(
            IndexBackend::Memory,
            "kb_a",
            Err(VectorError::StoreTransient("connection reset".into())),
        );
        assert!(absorbed.unwrap().is_empty());

        let propagated = absorb_transient(
            IndexBackend::Memory,
            "kb_a",
            Err(VectorError::Store("syntax error".into())),
        );
        assert!(propagated.is_err());
    }

    #[tokio::test]
    async fn test_screen_records_without_catalog_checks_dimension() {
        let good = VectorRecord::new(Uuid::new_v4(), vec![0.1, 0.2]);
        let bad = VectorRecord::new(Uuid::new_v4(), vec![0.1]);
        let bad_id = bad.id;

        let (accepted, skipped) = screen_records("kb_a", 2, vec![good, bad], None)
            .await
            .unwrap();

        assert_eq!(accepted.len(), 1);
        assert_eq!(skipped, vec![bad_id]);
    }

    #[tokio::test]
    async fn test_screen_records_rejects_non_finite_components() {
        let good = VectorRecord::new(Uuid::new_v4(), vec![0.5, 0.5]);
        let nan = VectorRecord::new(Uuid::new_v4(), vec![f32::NAN, 0.5]);
        let inf = VectorRecord::new(Uuid::new_v4(), vec![0.5, f32::NEG_INFINITY]);
        let (nan_id, inf_id) = (nan.id, inf.id);

        let mut catalog = MockChunkCatalog::new();
        catalog
            .expect_live_chunks()
            .withf(|ids| ids.len() == 1)
            .returning(|ids| Ok(ids.iter().copied().collect()));

        let (accepted, skipped) =
            screen_records("kb_a", 2, vec![good, nan, inf], Some(&catalog))
                .await
                .unwrap();

        assert_eq!(accepted.len(), 1);
        assert_eq!(skipped, vec![nan_id, inf_id]);
    }

    #[tokio::test]
    async fn test_screen_records_consults_catalog() {
        let live = Uuid::new_v4();
        let orphan = Uuid::new_v4();

        let mut catalog = MockChunkCatalog::new();
        catalog
            .expect_live_chunks()
            .times(1)
            .returning(move |_| Ok(HashSet::from([live])));

        let records = vec![
            VectorRecord::new(live, vec![1.0]),
            VectorRecord::new(orphan, vec![1.0]),
        ];
        let (accepted, skipped) = screen_records("kb_a", 1, records, Some(&catalog))
            .await
            .unwrap();

        assert_eq!(accepted.iter().map(|r| r.id).collect::<Vec<_>>(), vec![live]);
        assert_eq!(skipped, vec![orphan]);
    }

    #[tokio::test]
    async fn test_screen_records_skips_catalog_for_empty_batch() {
        let mut catalog = MockChunkCatalog::new();
        catalog.expect_live_chunks().never();

        let (accepted, skipped) = screen_records("kb_a", 3, Vec::new(), Some(&catalog))
            .await
            .unwrap();
        assert!(accepted.is_empty());
        assert!(skipped.is_empty());
    }
}
