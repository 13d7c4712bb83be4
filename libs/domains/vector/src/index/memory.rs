use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{
    ChunkCatalog, SimilarityIndex, check_probe, cosine_similarity, screen_records,
    validate_batch_size,
};
use crate::error::{VectorError, VectorResult};
use crate::models::{
    ChunkId, IndexBackend, NamespaceInfo, Payload, QueryFilter, ScoredRecord, UpsertReport,
    VectorRecord, validate_dimension, validate_namespace,
};

#[derive(Debug)]
struct Namespace {
    dimension: u32,
    records: BTreeMap<ChunkId, (Vec<f32>, Payload)>,
}

/// Brute-force cosine index held in process memory.
///
/// Records are kept ordered by id so `stream_all` can page with a cursor.
#[derive(Default)]
pub struct InMemoryIndex {
    namespaces: RwLock<HashMap<String, Namespace>>,
    catalog: Option<Arc<dyn ChunkCatalog>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_catalog(mut self, catalog: Arc<dyn ChunkCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Number of records in a namespace, `None` when undeclared
    pub async fn record_count(&self, namespace: &str) -> Option<usize> {
        self.namespaces
            .read()
            .await
            .get(namespace)
            .map(|ns| ns.records.len())
    }

    pub async fn get(&self, namespace: &str, id: ChunkId) -> Option<VectorRecord> {
        let namespaces = self.namespaces.read().await;
        let (vector, payload) = namespaces.get(namespace)?.records.get(&id)?;
        Some(VectorRecord {
            id,
            vector: vector.clone(),
            payload: payload.clone(),
        })
    }

    async fn page(
        &self,
        namespace: &str,
        after: Option<ChunkId>,
        limit: usize,
    ) -> VectorResult<Vec<VectorRecord>> {
        let namespaces = self.namespaces.read().await;
        let ns = namespaces
            .get(namespace)
            .ok_or_else(|| VectorError::NamespaceNotFound(namespace.to_string()))?;

        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        Ok(ns
            .records
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, (vector, payload))| VectorRecord {
                id: *id,
                vector: vector.clone(),
                payload: payload.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl SimilarityIndex for InMemoryIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::Memory
    }

    async fn ensure_namespace(
        &self,
        namespace: &str,
        dimension: u32,
    ) -> VectorResult<NamespaceInfo> {
        validate_namespace(namespace)?;
        validate_dimension(dimension)?;

        let mut namespaces = self.namespaces.write().await;
        let ns = namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| Namespace {
                dimension,
                records: BTreeMap::new(),
            });

        if ns.dimension != dimension {
            return Err(VectorError::DimensionConflict {
                namespace: namespace.to_string(),
                existing: ns.dimension,
                requested: dimension,
            });
        }

        Ok(NamespaceInfo {
            name: namespace.to_string(),
            dimension,
        })
    }

    #[instrument(skip_all, fields(namespace = %namespace, count = records.len()))]
    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> VectorResult<UpsertReport> {
        let dimension = self
            .namespaces
            .read()
            .await
            .get(namespace)
            .map(|ns| ns.dimension)
            .ok_or_else(|| VectorError::NamespaceNotFound(namespace.to_string()))?;

        let (accepted, skipped) =
            screen_records(namespace, dimension, records, self.catalog.as_deref()).await?;

        let mut namespaces = self.namespaces.write().await;
        let ns = namespaces
            .get_mut(namespace)
            .ok_or_else(|| VectorError::NamespaceNotFound(namespace.to_string()))?;

        let upserted = accepted.len();
        for record in accepted {
            ns.records.insert(record.id, (record.vector, record.payload));
        }

        debug!(upserted, skipped = skipped.len(), "Upserted vector records");
        Ok(UpsertReport { upserted, skipped })
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> VectorResult<Vec<ScoredRecord>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let namespaces = self.namespaces.read().await;
        let Some(ns) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };
        check_probe(ns.dimension, vector)?;

        let scope = filter.and_then(QueryFilter::scope);
        let mut scored: Vec<ScoredRecord> = ns
            .records
            .iter()
            .filter(|(_, (_, payload))| scope.is_none_or(|s| s.matches(payload)))
            .map(|(id, (stored, payload))| ScoredRecord {
                id: *id,
                score: cosine_similarity(vector, stored),
                payload: payload.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(top_k);

        Ok(scored)
    }

    async fn delete(&self, namespace: &str, ids: &[ChunkId]) -> VectorResult<u64> {
        let mut namespaces = self.namespaces.write().await;
        let Some(ns) = namespaces.get_mut(namespace) else {
            return Ok(0);
        };

        Ok(ids.iter().filter(|id| ns.records.remove(*id).is_some()).count() as u64)
    }

    fn stream_all<'a>(
        &'a self,
        namespace: &'a str,
        batch_size: usize,
    ) -> BoxStream<'a, VectorResult<Vec<VectorRecord>>> {
        async_stream::stream! {
            if let Err(e) = validate_batch_size(batch_size) {
                yield Err(e);
                return;
            }

            let mut cursor = None;
            loop {
                match self.page(namespace, cursor, batch_size).await {
                    Ok(batch) if batch.is_empty() => break,
                    Ok(batch) => {
                        cursor = batch.last().map(|r| r.id);
                        let last_page = batch.len() < batch_size;
                        yield Ok(batch);
                        if last_page {
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryChunkCatalog;
    use futures::TryStreamExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_ensure_namespace_is_idempotent_and_rejects_resize() {
        let index = InMemoryIndex::new();
        index.ensure_namespace("kb_a", 3).await.unwrap();
        index
            .upsert("kb_a", vec![VectorRecord::new(Uuid::new_v4(), vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        index.ensure_namespace("kb_a", 3).await.unwrap();
        assert_eq!(index.record_count("kb_a").await, Some(1));

        let err = index.ensure_namespace("kb_a", 4).await.unwrap_err();
        assert!(matches!(
            err,
            VectorError::DimensionConflict {
                existing: 3,
                requested: 4,
                ..
            }
        ));
        assert_eq!(index.record_count("kb_a").await, Some(1));
    }

    #[tokio::test]
    async fn test_upsert_requires_declared_namespace() {
        let index = InMemoryIndex::new();
        let err = index
            .upsert("kb_missing", vec![VectorRecord::new(Uuid::new_v4(), vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::NamespaceNotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_skips_orphans_via_catalog() {
        let live = Uuid::new_v4();
        let catalog = Arc::new(InMemoryChunkCatalog::with_chunks([live]));
        let index = InMemoryIndex::new().with_chunk_catalog(catalog);
        index.ensure_namespace("kb_a", 1).await.unwrap();

        let orphan = Uuid::new_v4();
        let report = index
            .upsert(
                "kb_a",
                vec![VectorRecord::new(live, vec![1.0]), VectorRecord::new(orphan, vec![1.0])],
            )
            .await
            .unwrap();

        assert_eq!(report.upserted, 1);
        assert_eq!(report.skipped, vec![orphan]);
        assert!(index.get("kb_a", orphan).await.is_none());
    }

    #[tokio::test]
    async fn test_query_edge_cases() {
        let index = InMemoryIndex::new();
        assert!(index.query("kb_none", &[1.0], 5, None).await.unwrap().is_empty());

        index.ensure_namespace("kb_a", 2).await.unwrap();
        index
            .upsert("kb_a", vec![VectorRecord::new(Uuid::new_v4(), vec![1.0, 0.0])])
            .await
            .unwrap();

        assert!(index.query("kb_a", &[1.0, 0.0], 0, None).await.unwrap().is_empty());
        assert!(matches!(
            index.query("kb_a", &[1.0], 1, None).await,
            Err(VectorError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_delete_ignores_unknown_ids() {
        let index = InMemoryIndex::new();
        index.ensure_namespace("kb_a", 1).await.unwrap();
        let id = Uuid::new_v4();
        index
            .upsert("kb_a", vec![VectorRecord::new(id, vec![1.0])])
            .await
            .unwrap();

        assert_eq!(index.delete("kb_a", &[id, Uuid::new_v4()]).await.unwrap(), 1);
        assert_eq!(index.delete("kb_a", &[id]).await.unwrap(), 0);
        assert_eq!(index.delete("kb_none", &[id]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stream_all_pages_in_id_order() {
        let index = InMemoryIndex::new();
        index.ensure_namespace("kb_a", 1).await.unwrap();
        let records: Vec<_> = (0..7)
            .map(|i| VectorRecord::new(Uuid::new_v4(), vec![i as f32]))
            .collect();
        index.upsert("kb_a", records).await.unwrap();

        let batches: Vec<Vec<VectorRecord>> =
            index.stream_all("kb_a", 3).try_collect().await.unwrap();
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![3, 3, 1]
        );

        let ids: Vec<_> = batches.iter().flatten().map(|r| r.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_stream_all_rejects_zero_batch_size() {
        let index = InMemoryIndex::new();
        index.ensure_namespace("kb_a", 1).await.unwrap();

        let items: Vec<_> = index.stream_all("kb_a", 0).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_stream_all_unknown_namespace() {
        let index = InMemoryIndex::new();
        let items: Vec<_> = index.stream_all("kb_none", 10).collect().await;
        assert!(matches!(items[..], [Err(VectorError::NamespaceNotFound(_))]));
    }
}
