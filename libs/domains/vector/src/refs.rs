//! Backend pointers from chunks to their stored vectors.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{VectorError, VectorResult};
use crate::models::{ChunkId, IndexBackend, VectorRef};

/// Storage for [`VectorRef`]s, keyed by `(chunk_id, backend)`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorRefStore: Send + Sync {
    /// Insert or replace the ref for its `(chunk_id, backend)`
    async fn upsert(&self, vector_ref: VectorRef) -> VectorResult<()>;

    async fn get(&self, chunk_id: ChunkId, backend: IndexBackend)
    -> VectorResult<Option<VectorRef>>;

    /// Returns how many refs were removed
    async fn delete_for_chunks(&self, chunk_ids: &[ChunkId], backend: IndexBackend)
    -> VectorResult<u64>;
}

#[derive(Debug, Default)]
pub struct InMemoryVectorRefStore {
    refs: RwLock<HashMap<(ChunkId, IndexBackend), VectorRef>>,
}

impl InMemoryVectorRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.refs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.refs.read().await.is_empty()
    }
}

#[async_trait]
impl VectorRefStore for InMemoryVectorRefStore {
    async fn upsert(&self, vector_ref: VectorRef) -> VectorResult<()> {
        self.refs
            .write()
            .await
            .insert((vector_ref.chunk_id, vector_ref.backend), vector_ref);
        Ok(())
    }

    async fn get(
        &self,
        chunk_id: ChunkId,
        backend: IndexBackend,
    ) -> VectorResult<Option<VectorRef>> {
        Ok(self.refs.read().await.get(&(chunk_id, backend)).cloned())
    }

    async fn delete_for_chunks(
        &self,
        chunk_ids: &[ChunkId],
        backend: IndexBackend,
    ) -> VectorResult<u64> {
        let mut refs = self.refs.write().await;
        Ok(chunk_ids
            .iter()
            .filter(|id| refs.remove(&(**id, backend)).is_some())
            .count() as u64)
    }
}

/// Refs in the `vector_refs` table
#[derive(Clone)]
pub struct PgVectorRefStore {
    db: DatabaseConnection,
}

#[derive(Debug, FromQueryResult)]
struct VectorRefRow {
    chunk_id: Uuid,
    backend: String,
    index_name: String,
    vector_id: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VectorRefRow> for VectorRef {
    type Error = VectorError;

    fn try_from(row: VectorRefRow) -> Result<Self, Self::Error> {
        Ok(VectorRef {
            chunk_id: row.chunk_id,
            backend: row
                .backend
                .parse()
                .map_err(|_| VectorError::Internal(format!("Unknown backend '{}'", row.backend)))?,
            index_name: row.index_name,
            vector_id: row.vector_id,
            updated_at: row.updated_at,
        })
    }
}

impl PgVectorRefStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VectorRefStore for PgVectorRefStore {
    async fn upsert(&self, vector_ref: VectorRef) -> VectorResult<()> {
        let sql = r#"
            INSERT INTO vector_refs (chunk_id, backend, index_name, vector_id, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (chunk_id, backend) DO UPDATE SET
                index_name = EXCLUDED.index_name,
                vector_id = EXCLUDED.vector_id,
                updated_at = EXCLUDED.updated_at
        "#;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [
                vector_ref.chunk_id.into(),
                vector_ref.backend.as_str().into(),
                vector_ref.index_name.into(),
                vector_ref.vector_id.into(),
                vector_ref.updated_at.into(),
            ],
        );

        self.db.execute_raw(stmt).await?;
        Ok(())
    }

    async fn get(
        &self,
        chunk_id: ChunkId,
        backend: IndexBackend,
    ) -> VectorResult<Option<VectorRef>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT * FROM vector_refs WHERE chunk_id = $1 AND backend = $2",
            [chunk_id.into(), backend.as_str().into()],
        );

        VectorRefRow::find_by_statement(stmt)
            .one(&self.db)
            .await?
            .map(VectorRef::try_from)
            .transpose()
    }

    async fn delete_for_chunks(
        &self,
        chunk_ids: &[ChunkId],
        backend: IndexBackend,
    ) -> VectorResult<u64> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM vector_refs WHERE backend = $1 AND chunk_id = ANY($2)",
            [backend.as_str().into(), Value::from(chunk_ids.to_vec())],
        );

        Ok(self.db.execute_raw(stmt).await?.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_in_memory_one_ref_per_chunk_and_backend() {
        let store = InMemoryVectorRefStore::new();
        let chunk = Uuid::new_v4();

        store
            .upsert(VectorRef::new(chunk, IndexBackend::Pgvector, "kb_old"))
            .await
            .unwrap();
        store
            .upsert(VectorRef::new(chunk, IndexBackend::Pgvector, "kb_new"))
            .await
            .unwrap();
        store
            .upsert(VectorRef::new(chunk, IndexBackend::Qdrant, "kb_new"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 2);
        let current = store.get(chunk, IndexBackend::Pgvector).await.unwrap().unwrap();
        assert_eq!(current.index_name, "kb_new");

        assert_eq!(
            store
                .delete_for_chunks(&[chunk, Uuid::new_v4()], IndexBackend::Pgvector)
                .await
                .unwrap(),
            1
        );
        assert!(store.get(chunk, IndexBackend::Qdrant).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pg_get_maps_row() {
        let chunk = Uuid::new_v4();
        let now = Utc::now();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![BTreeMap::from([
                ("chunk_id", Value::from(chunk)),
                ("backend", Value::from("qdrant")),
                ("index_name", Value::from("kb_a")),
                ("vector_id", Value::from(chunk.to_string())),
                ("updated_at", Value::from(now)),
            ])]])
            .into_connection();

        let found = PgVectorRefStore::new(db)
            .get(chunk, IndexBackend::Qdrant)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.backend, IndexBackend::Qdrant);
        assert_eq!(found.vector_id, chunk.to_string());
    }

    #[tokio::test]
    async fn test_pg_delete_for_chunks_reports_rows() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            }])
            .into_connection();

        let removed = PgVectorRefStore::new(db.clone())
            .delete_for_chunks(&[Uuid::new_v4(), Uuid::new_v4()], IndexBackend::Pgvector)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            db.into_transaction_log()[0].statements()[0].sql,
            "DELETE FROM vector_refs WHERE backend = $1 AND chunk_id = ANY($2)"
        );
        assert_eq!(
            PgVectorRefStore::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection())
                .delete_for_chunks(&[], IndexBackend::Pgvector)
                .await
                .unwrap(),
            0
        );
    }
}
