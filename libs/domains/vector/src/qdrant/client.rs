use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    self, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    GetPointsBuilder, PointId, PointStruct, PointsIdsList, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::QdrantConfig;
use crate::error::{VectorError, VectorResult};
use crate::index::{
    ChunkCatalog, SimilarityIndex, absorb_transient, check_probe, screen_records,
    validate_batch_size,
};
use crate::models::{
    ChunkId, IndexBackend, NamespaceInfo, Payload, PayloadValue, QueryFilter, ScoredRecord,
    UpsertReport, VectorRecord, validate_dimension, validate_namespace,
};

/// Similarity index with one Qdrant collection per namespace, cosine distance.
pub struct QdrantIndex {
    client: Qdrant,
    catalog: Option<Arc<dyn ChunkCatalog>>,
}

impl QdrantIndex {
    pub fn new(config: QdrantConfig) -> VectorResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
        }

        let client = builder
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VectorError::Config(format!("Failed to build Qdrant client: {}", e)))?;

        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self {
            client,
            catalog: None,
        }
    }

    pub fn with_chunk_catalog(mut self, catalog: Arc<dyn ChunkCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Vector size of the collection, `None` when it does not exist
    async fn collection_dimension(&self, namespace: &str) -> VectorResult<Option<u32>> {
        if !self.client.collection_exists(namespace).await? {
            return Ok(None);
        }

        let info = self.client.collection_info(namespace).await?;
        let dimension = info
            .result
            .as_ref()
            .and_then(|r| r.config.as_ref())
            .and_then(extract_dimension)
            .ok_or_else(|| {
                VectorError::Store(format!("Collection {} has no single vector config", namespace))
            })?;

        Ok(Some(dimension))
    }

    async fn search(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> VectorResult<Vec<ScoredRecord>> {
        let Some(dimension) = self.collection_dimension(namespace).await? else {
            return Ok(Vec::new());
        };
        check_probe(dimension, vector)?;

        let mut builder = SearchPointsBuilder::new(namespace, vector.to_vec(), top_k as u64)
            .with_payload(true);

        if let Some(scope) = filter.and_then(QueryFilter::scope) {
            builder = builder.filter(Filter::must([Condition::matches(
                scope.payload_key(),
                scope.value(),
            )]));
        }

        let response = self.client.search_points(builder).await?;

        response
            .result
            .into_iter()
            .map(|point| {
                let id = point
                    .id
                    .as_ref()
                    .map(point_id_to_uuid)
                    .transpose()?
                    .ok_or_else(|| VectorError::Internal("Missing point ID".to_string()))?;

                Ok(ScoredRecord {
                    id,
                    score: point.score,
                    payload: payload_from_qdrant(point.payload),
                })
            })
            .collect()
    }

    async fn scroll_page(
        &self,
        namespace: &str,
        offset: Option<PointId>,
        limit: usize,
    ) -> VectorResult<(Vec<VectorRecord>, Option<PointId>)> {
        let mut builder = ScrollPointsBuilder::new(namespace)
            .limit(limit as u32)
            .with_payload(true)
            .with_vectors(true);

        if let Some(offset) = offset {
            builder = builder.offset(offset);
        }

        let response = self.client.scroll(builder).await?;

        let records = response
            .result
            .into_iter()
            .map(point_to_record)
            .collect::<VectorResult<Vec<_>>>()?;

        Ok((records, response.next_page_offset))
    }
}

#[async_trait]
impl SimilarityIndex for QdrantIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::Qdrant
    }

    #[instrument(skip(self))]
    async fn ensure_namespace(
        &self,
        namespace: &str,
        dimension: u32,
    ) -> VectorResult<NamespaceInfo> {
        validate_namespace(namespace)?;
        validate_dimension(dimension)?;

        match self.collection_dimension(namespace).await? {
            Some(existing) => check_dimension(namespace, dimension, existing)?,
            None => {
                let created = self
                    .client
                    .create_collection(CreateCollectionBuilder::new(namespace).vectors_config(
                        VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
                    ))
                    .await;

                match created {
                    Ok(_) => debug!(dimension, "Created Qdrant collection"),
                    Err(e) => {
                        // A concurrent caller may have created it first.
                        let existing = self.collection_dimension(namespace).await?;
                        resolve_create_failure(namespace, dimension, e.into(), existing)?;
                        debug!(dimension, "Qdrant collection created concurrently");
                    }
                }
            }
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
            .collection_dimension(namespace)
            .await?
            .ok_or_else(|| VectorError::NamespaceNotFound(namespace.to_string()))?;

        let (accepted, mut skipped) =
            screen_records(namespace, dimension, records, self.catalog.as_deref()).await?;

        let mut upserted = accepted.len();
        if upserted > 0 {
            let points: Vec<(ChunkId, PointStruct)> = accepted
                .into_iter()
                .map(|r| {
                    let point = PointStruct::new(
                        uuid_to_point_id(r.id),
                        r.vector,
                        payload_to_qdrant(&r.payload),
                    );
                    (r.id, point)
                })
                .collect();

            let batch: Vec<PointStruct> = points.iter().map(|(_, p)| p.clone()).collect();
            let result = self
                .client
                .upsert_points(UpsertPointsBuilder::new(namespace, batch).wait(true))
                .await
                .map_err(VectorError::from);

            match result {
                Ok(_) => {}
                Err(err) if err.is_transient_store() => return Err(err),
                Err(err) => {
                    warn!(
                        namespace = %namespace,
                        error = %err,
                        "Batch upsert rejected, writing records one at a time"
                    );
                    upserted = 0;
                    for (id, point) in points {
                        let single = UpsertPointsBuilder::new(namespace, vec![point]).wait(true);
                        let result = self
                            .client
                            .upsert_points(single)
                            .await
                            .map_err(VectorError::from);
                        if record_point_outcome(namespace, id, result, &mut skipped)? {
                            upserted += 1;
                        }
                    }
                }
            }
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

        let result = self.search(namespace, vector, top_k, filter).await;
        absorb_transient(self.backend(), namespace, result)
    }

    async fn delete(&self, namespace: &str, ids: &[ChunkId]) -> VectorResult<u64> {
        if ids.is_empty() || !self.client.collection_exists(namespace).await? {
            return Ok(0);
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| uuid_to_point_id(*id)).collect();

        let existing = self
            .client
            .get_points(
                GetPointsBuilder::new(namespace, point_ids.clone())
                    .with_vectors(false)
                    .with_payload(false),
            )
            .await?
            .result
            .len();

        self.client
            .delete_points(
                DeletePointsBuilder::new(namespace)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await?;

        Ok(existing as u64)
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

            match self.client.collection_exists(namespace).await {
                Ok(true) => {}
                Ok(false) => {
                    yield Err(VectorError::NamespaceNotFound(namespace.to_string()));
                    return;
                }
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            }

            let mut offset = None;
            loop {
                match self.scroll_page(namespace, offset, batch_size).await {
                    Ok((batch, next)) => {
                        if !batch.is_empty() {
                            yield Ok(batch);
                        }
                        match next {
                            Some(next) => offset = Some(next),
                            None => break,
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

fn check_dimension(namespace: &str, requested: u32, existing: u32) -> VectorResult<()> {
    if existing != requested {
        return Err(VectorError::DimensionConflict {
            namespace: namespace.to_string(),
            existing,
            requested,
        });
    }
    Ok(())
}

/// A failed create is fine when the collection now exists with the requested size.
fn resolve_create_failure(
    namespace: &str,
    requested: u32,
    error: VectorError,
    existing: Option<u32>,
) -> VectorResult<()> {
    match existing {
        Some(existing) => check_dimension(namespace, requested, existing),
        None => Err(error),
    }
}

/// Outcome of a single-point write: `Ok(true)` when stored, `Ok(false)` when the
/// point was rejected and recorded in `skipped`. Transient failures propagate.
fn record_point_outcome<T>(
    namespace: &str,
    id: ChunkId,
    result: VectorResult<T>,
    skipped: &mut Vec<ChunkId>,
) -> VectorResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(err) if err.is_transient_store() => Err(err),
        Err(err) => {
            warn!(
                namespace = %namespace,
                id = %id,
                error = %err,
                "Skipping vector record rejected by the store"
            );
            skipped.push(id);
            Ok(false)
        }
    }
}

fn point_to_record(point: qdrant::RetrievedPoint) -> VectorResult<VectorRecord> {
    let id = point
        .id
        .as_ref()
        .map(point_id_to_uuid)
        .transpose()?
        .ok_or_else(|| VectorError::Internal("Missing point ID".to_string()))?;

    let vector = extract_vector_from_output(&point.vectors)
        .ok_or_else(|| VectorError::Store(format!("Point {} has no dense vector", id)))?;

    Ok(VectorRecord {
        id,
        vector,
        payload: payload_from_qdrant(point.payload),
    })
}

fn uuid_to_point_id(id: Uuid) -> PointId {
    PointId::from(id.to_string())
}

fn point_id_to_uuid(point_id: &PointId) -> VectorResult<Uuid> {
    match &point_id.point_id_options {
        Some(qdrant::point_id::PointIdOptions::Uuid(uuid_str)) => Uuid::parse_str(uuid_str)
            .map_err(|e| VectorError::Internal(format!("Invalid UUID: {}", e))),
        Some(qdrant::point_id::PointIdOptions::Num(num)) => Ok(Uuid::from_u128(*num as u128)),
        None => Err(VectorError::Internal("Missing point ID".to_string())),
    }
}

fn payload_to_qdrant(payload: &Payload) -> HashMap<String, QdrantValue> {
    payload
        .iter()
        .map(|(key, value)| {
            let value = match value {
                PayloadValue::Bool(b) => QdrantValue::from(*b),
                PayloadValue::Integer(i) => QdrantValue::from(*i),
                PayloadValue::Float(f) => QdrantValue::from(*f),
                PayloadValue::Text(s) => QdrantValue::from(s.clone()),
            };
            (key.clone(), value)
        })
        .collect()
}

fn payload_from_qdrant(payload: HashMap<String, QdrantValue>) -> Payload {
    use qdrant::value::Kind;

    payload
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value.kind? {
                Kind::BoolValue(b) => PayloadValue::Bool(b),
                Kind::IntegerValue(i) => PayloadValue::Integer(i),
                Kind::DoubleValue(f) => PayloadValue::Float(f),
                Kind::StringValue(s) => PayloadValue::Text(s),
                _ => return None,
            };
            Some((key, value))
        })
        .collect()
}

fn extract_dimension(config: &qdrant::CollectionConfig) -> Option<u32> {
    let vectors = config.params.as_ref()?.vectors_config.as_ref()?;
    match vectors.config.as_ref()? {
        qdrant::vectors_config::Config::Params(p) => Some(p.size as u32),
        qdrant::vectors_config::Config::ParamsMap(_) => None,
    }
}

/// Uses the deprecated `data` field until the client exposes dense vectors directly.
#[allow(deprecated)]
fn extract_vector_from_output(vectors: &Option<qdrant::VectorsOutput>) -> Option<Vec<f32>> {
    match vectors {
        Some(qdrant::VectorsOutput {
            vectors_options: Some(qdrant::vectors_output::VectorsOptions::Vector(v)),
        }) => Some(v.data.clone()),
        _ => None,
    }
}
