use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement, TransactionTrait,
    Value,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    ChunkCatalog, SimilarityIndex, absorb_transient, check_probe, screen_records,
    validate_batch_size,
};
use crate::error::{VectorError, VectorResult};
use crate::models::{
    ChunkId, IndexBackend, NamespaceInfo, QueryFilter, ScoredRecord, UpsertReport, VectorRecord,
    payload_from_json, payload_to_json, validate_dimension, validate_namespace,
};

/// Similarity index over the pgvector extension.
///
/// All namespaces share `vector_records`, keyed by `(namespace, id)`. Every
/// query runs as a standalone statement on a pooled connection so a failed
/// query cannot poison a session other callers use.
#[derive(Clone)]
pub struct PgVectorIndex {
    db: DatabaseConnection,
    catalog: Option<Arc<dyn ChunkCatalog>>,
}

#[derive(Debug, FromQueryResult)]
struct DimensionRow {
    dimension: i32,
}

#[derive(Debug, FromQueryResult)]
struct ScoredRow {
    id: Uuid,
    score: f64,
    payload: serde_json::Value,
}

#[derive(Debug, FromQueryResult)]
struct RecordRow {
    id: Uuid,
    embedding: String,
    payload: serde_json::Value,
}

impl PgVectorIndex {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db, catalog: None }
    }

    pub fn with_chunk_catalog(mut self, catalog: Arc<dyn ChunkCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    async fn namespace_dimension(&self, namespace: &str) -> VectorResult<Option<u32>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT dimension FROM vector_namespaces WHERE name = $1",
            [namespace.into()],
        );

        let row = DimensionRow::find_by_statement(stmt).one(&self.db).await?;
        Ok(row.map(|r| r.dimension as u32))
    }

    async fn search(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> VectorResult<Vec<ScoredRecord>> {
        let Some(dimension) = self.namespace_dimension(namespace).await? else {
            return Ok(Vec::new());
        };
        check_probe(dimension, vector)?;

        let mut values: Vec<Value> = vec![
            namespace.into(),
            format_vector(vector).into(),
            (top_k as i64).into(),
        ];

        let scope_clause = match filter.and_then(QueryFilter::scope) {
            Some(scope) => {
                values.push(scope.value().into());
                format!("AND payload->>'{}' = $4", scope.payload_key())
            }
            None => String::new(),
        };

        let sql = format!(
            r#"
            SELECT id, (1 - (embedding <=> $2::vector))::float8 AS score, payload
            FROM vector_records
            WHERE namespace = $1 {}
            ORDER BY embedding <=> $2::vector, id
            LIMIT $3
            "#,
            scope_clause
        );

        let rows = ScoredRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            values,
        ))
        .all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ScoredRecord {
                id: row.id,
                score: row.score as f32,
                payload: payload_from_json(&row.payload),
            })
            .collect())
    }

    async fn page(
        &self,
        namespace: &str,
        after: Option<ChunkId>,
        limit: usize,
    ) -> VectorResult<Vec<VectorRecord>> {
        let stmt = match after {
            None => Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                SELECT id, embedding::text AS embedding, payload
                FROM vector_records
                WHERE namespace = $1
                ORDER BY id
                LIMIT $2
                "#,
                [namespace.into(), (limit as i64).into()],
            ),
            Some(cursor) => Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                SELECT id, embedding::text AS embedding, payload
                FROM vector_records
                WHERE namespace = $1 AND id > $2
                ORDER BY id
                LIMIT $3
                "#,
                [namespace.into(), cursor.into(), (limit as i64).into()],
            ),
        };

        RecordRow::find_by_statement(stmt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| {
                Ok(VectorRecord {
                    id: row.id,
                    vector: parse_vector(&row.embedding)?,
                    payload: payload_from_json(&row.payload),
                })
            })
            .collect()
    }
}

#[async_trait]
impl SimilarityIndex for PgVectorIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::Pgvector
    }

    #[instrument(skip(self))]
    async fn ensure_namespace(
        &self,
        namespace: &str,
        dimension: u32,
    ) -> VectorResult<NamespaceInfo> {
        validate_namespace(namespace)?;
        validate_dimension(dimension)?;

        // The no-op update makes RETURNING yield the stored row on conflict.
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO vector_namespaces (name, dimension)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING dimension
            "#,
            [namespace.into(), (dimension as i32).into()],
        );

        let existing = DimensionRow::find_by_statement(stmt)
            .one(&self.db)
            .await?
            .map(|r| r.dimension as u32)
            .ok_or_else(|| {
                VectorError::Internal(format!("Failed to declare namespace {}", namespace))
            })?;

        if existing != dimension {
            return Err(VectorError::DimensionConflict {
                namespace: namespace.to_string(),
                existing,
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
            .namespace_dimension(namespace)
            .await?
            .ok_or_else(|| VectorError::NamespaceNotFound(namespace.to_string()))?;

        let (accepted, mut skipped) =
            screen_records(namespace, dimension, records, self.catalog.as_deref()).await?;

        let sql = r#"
            INSERT INTO vector_records (namespace, id, embedding, payload, updated_at)
            VALUES ($1, $2, $3::vector, $4, now())
            ON CONFLICT (namespace, id) DO UPDATE SET
                embedding = EXCLUDED.embedding,
                payload = EXCLUDED.payload,
                updated_at = EXCLUDED.updated_at
        "#;

        let mut upserted = 0;
        for record in accepted {
            let stmt = Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [
                    namespace.into(),
                    record.id.into(),
                    format_vector(&record.vector).into(),
                    payload_to_json(&record.payload).into(),
                ],
            );

            match self.db.execute_raw(stmt).await.map_err(VectorError::from) {
                Ok(_) => upserted += 1,
                Err(err) if err.is_transient_store() => return Err(err),
                Err(err) => {
                    warn!(
                        namespace = %namespace,
                        id = %record.id,
                        error = %err,
                        "Skipping vector record rejected by the store"
                    );
                    skipped.push(record.id);
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

    #[instrument(skip_all, fields(namespace = %namespace, count = ids.len()))]
    async fn delete(&self, namespace: &str, ids: &[ChunkId]) -> VectorResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let id_array = Value::from(ids.to_vec());

        let txn = self.db.begin().await?;

        let removed = txn
            .execute_raw(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "DELETE FROM vector_records WHERE namespace = $1 AND id = ANY($2)",
                [namespace.into(), id_array.clone()],
            ))
            .await?
            .rows_affected();

        txn.execute_raw(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM vector_refs WHERE index_name = $1 AND chunk_id = ANY($2) AND backend = $3",
            [
                namespace.into(),
                id_array,
                IndexBackend::Pgvector.as_str().into(),
            ],
        ))
        .await?;

        txn.commit().await?;

        Ok(removed)
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

            match self.namespace_dimension(namespace).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    yield Err(VectorError::NamespaceNotFound(namespace.to_string()));
                    return;
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
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

/// pgvector text form: `[0.1,0.2,0.3]`
pub(crate) fn format_vector(vector: &[f32]) -> String {
    let body = vector
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{}]", body)
}

pub(crate) fn parse_vector(text: &str) -> VectorResult<Vec<f32>> {
    let body = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| VectorError::Internal(format!("Malformed vector literal: {}", text)))?;

    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    body.split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .map_err(|e| VectorError::Internal(format!("Malformed vector component: {}", e)))
        })
        .collect()
}
