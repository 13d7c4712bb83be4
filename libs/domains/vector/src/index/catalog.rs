use std::collections::HashSet;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DbBackend, FromQueryResult, Statement, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::VectorResult;
use crate::models::{Chunk, ChunkId};

/// Existence check for the chunks that own vector records.
///
/// The relational layer owns chunk lifecycle; the index only asks which ids
/// are still alive before writing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChunkCatalog: Send + Sync {
    /// The subset of `ids` whose chunk still exists
    async fn live_chunks(&self, ids: &[ChunkId]) -> VectorResult<HashSet<ChunkId>>;
}

/// Catalog backed by a set of known chunk ids
#[derive(Debug, Default)]
pub struct InMemoryChunkCatalog {
    chunks: RwLock<HashSet<ChunkId>>,
}

impl InMemoryChunkCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunks(ids: impl IntoIterator<Item = ChunkId>) -> Self {
        Self {
            chunks: RwLock::new(ids.into_iter().collect()),
        }
    }

    pub async fn register(&self, chunk: &Chunk) {
        self.chunks.write().await.insert(chunk.id);
    }

    pub async fn remove(&self, id: ChunkId) -> bool {
        self.chunks.write().await.remove(&id)
    }
}

#[async_trait]
impl ChunkCatalog for InMemoryChunkCatalog {
    async fn live_chunks(&self, ids: &[ChunkId]) -> VectorResult<HashSet<ChunkId>> {
        let chunks = self.chunks.read().await;
        Ok(ids.iter().filter(|id| chunks.contains(*id)).copied().collect())
    }
}

/// Catalog over the `knowledge_chunks` table
#[derive(Clone)]
pub struct PgChunkCatalog {
    db: DatabaseConnection,
}

#[derive(Debug, FromQueryResult)]
struct ChunkIdRow {
    id: Uuid,
}

impl PgChunkCatalog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChunkCatalog for PgChunkCatalog {
    async fn live_chunks(&self, ids: &[ChunkId]) -> VectorResult<HashSet<ChunkId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows = ChunkIdRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT id FROM knowledge_chunks WHERE id = ANY($1)",
            [Value::from(ids.to_vec())],
        ))
        .all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|row| row.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_in_memory_catalog() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let catalog = InMemoryChunkCatalog::with_chunks([a]);

        assert_eq!(catalog.live_chunks(&[a, b]).await.unwrap(), HashSet::from([a]));

        assert!(catalog.remove(a).await);
        assert!(catalog.live_chunks(&[a]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pg_catalog_returns_found_ids() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![BTreeMap::from([("id", Value::from(a))])]])
            .into_connection();

        let live = PgChunkCatalog::new(db).live_chunks(&[a, b]).await.unwrap();
        assert_eq!(live, HashSet::from([a]));
    }

    #[tokio::test]
    async fn test_pg_catalog_binds_ids_as_one_array() {
        let ids: Vec<Uuid> = (0..500).map(|_| Uuid::new_v4()).collect();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<BTreeMap<&str, Value>>::new()])
            .into_connection();

        PgChunkCatalog::new(db.clone()).live_chunks(&ids).await.unwrap();

        let log = db.into_transaction_log();
        let stmt = &log[0].statements()[0];
        assert_eq!(stmt.sql, "SELECT id FROM knowledge_chunks WHERE id = ANY($1)");
        assert_eq!(stmt.values.as_ref().map(|v| v.0.len()), Some(1));
    }

    #[tokio::test]
    async fn test_pg_catalog_empty_input_skips_query() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        assert!(PgChunkCatalog::new(db).live_chunks(&[]).await.unwrap().is_empty());
    }
}
