//! Behaviour every similarity index must show, exercised on the in-memory
//! backend and, for the store-failure cases, on pgvector over a mock connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use domain_vector::{
    InMemoryChunkCatalog, InMemoryIndex, PayloadValue, PgVectorIndex, QueryFilter,
    SimilarityIndex, VectorRecord,
};
use sea_orm::{DatabaseBackend, DbErr, MockDatabase, RuntimeErr, Value};
use test_utils::TestDataBuilder;
use uuid::Uuid;

#[tokio::test]
async fn test_upsert_same_id_keeps_last_write() {
    let index = InMemoryIndex::new();
    index.ensure_namespace("kb_a", 2).await.unwrap();
    let id = Uuid::new_v4();

    index
        .upsert(
            "kb_a",
            vec![VectorRecord::new(id, vec![1.0, 0.0]).with_payload("version", 1u32)],
        )
        .await
        .unwrap();
    index
        .upsert(
            "kb_a",
            vec![VectorRecord::new(id, vec![0.0, 1.0]).with_payload("version", 2u32)],
        )
        .await
        .unwrap();

    assert_eq!(index.record_count("kb_a").await, Some(1));
    let stored = index.get("kb_a", id).await.unwrap();
    assert_eq!(stored.vector, vec![0.0, 1.0]);
    assert_eq!(stored.payload["version"], PayloadValue::Integer(2));
}

#[tokio::test]
async fn test_orphaned_record_is_skipped_without_failing_batch() {
    let data = TestDataBuilder::from_test_name("orphaned_record");
    let (first, orphan, third) = (data.chunk_id(1), data.chunk_id(2), data.chunk_id(3));

    let catalog = Arc::new(InMemoryChunkCatalog::with_chunks([first, third]));
    let index = InMemoryIndex::new().with_chunk_catalog(catalog);
    index.ensure_namespace("kb_a", 4).await.unwrap();

    let report = index
        .upsert(
            "kb_a",
            vec![
                VectorRecord::new(first, data.vector(1, 4)),
                VectorRecord::new(orphan, data.vector(2, 4)),
                VectorRecord::new(third, data.vector(3, 4)),
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.upserted, 2);
    assert_eq!(report.skipped, vec![orphan]);
    assert!(index.get("kb_a", first).await.is_some());
    assert!(index.get("kb_a", orphan).await.is_none());
    assert!(index.get("kb_a", third).await.is_some());
}

#[tokio::test]
async fn test_nan_vector_is_skipped_and_query_stays_ranked() {
    let index = InMemoryIndex::new();
    index.ensure_namespace("kb_a", 2).await.unwrap();
    let (finite, nan) = (Uuid::new_v4(), Uuid::new_v4());

    let report = index
        .upsert(
            "kb_a",
            vec![
                VectorRecord::new(finite, vec![1.0, 0.0]),
                VectorRecord::new(nan, vec![f32::NAN, 0.0]),
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.upserted, 1);
    assert_eq!(report.skipped, vec![nan]);
    assert!(index.get("kb_a", nan).await.is_none());

    let hits = index.query("kb_a", &[1.0, 0.0], 1, None).await.unwrap();
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![finite]);
    assert!(hits[0].score.is_finite());
}

#[tokio::test]
async fn test_query_returns_two_closest_in_score_order() {
    let index = InMemoryIndex::new();
    index.ensure_namespace("kb_a", 2).await.unwrap();

    let (near, middle, far) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    index
        .upsert(
            "kb_a",
            vec![
                VectorRecord::new(far, vec![-1.0, 0.0]),
                VectorRecord::new(near, vec![1.0, 0.1]),
                VectorRecord::new(middle, vec![1.0, 1.0]),
            ],
        )
        .await
        .unwrap();

    let hits = index.query("kb_a", &[1.0, 0.0], 2, None).await.unwrap();

    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![near, middle]);
    let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
    test_utils::assertions::assert_descending(&scores, "query scores");
}

#[tokio::test]
async fn test_namespace_bounds_tenant_filter() {
    let data = TestDataBuilder::from_test_name("namespace_bounds");
    let client = data.client_id();
    let index = InMemoryIndex::new();

    for (namespace, seed) in [("kb_a", 10), ("kb_b", 20)] {
        index.ensure_namespace(namespace, 3).await.unwrap();
        let records = (0..3)
            .map(|i| {
                VectorRecord::new(data.chunk_id(seed + i), data.vector(seed + i, 3))
                    .with_payload("client_id", client)
                    .with_payload("source", namespace)
            })
            .collect();
        index.upsert(namespace, records).await.unwrap();
    }

    let filter = QueryFilter::client(client);
    let hits = index
        .query("kb_a", &data.vector(99, 3), 10, Some(&filter))
        .await
        .unwrap();

    assert_eq!(hits.len(), 3);
    assert!(
        hits.iter()
            .all(|h| h.payload["source"] == PayloadValue::from("kb_a"))
    );
}

#[tokio::test]
async fn test_knowledge_base_filter_wins_over_tenant_filter() {
    let index = InMemoryIndex::new();
    index.ensure_namespace("shared", 2).await.unwrap();

    let (client, kb_one, kb_two) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let (in_kb, other_kb) = (Uuid::new_v4(), Uuid::new_v4());
    index
        .upsert(
            "shared",
            vec![
                VectorRecord::new(in_kb, vec![1.0, 0.0])
                    .with_payload("client_id", client)
                    .with_payload("knowledge_base_id", kb_one),
                VectorRecord::new(other_kb, vec![1.0, 0.0])
                    .with_payload("client_id", client)
                    .with_payload("knowledge_base_id", kb_two),
            ],
        )
        .await
        .unwrap();

    let filter = QueryFilter {
        knowledge_base_id: Some(kb_one),
        client_id: Some(client),
    };
    let hits = index
        .query("shared", &[1.0, 0.0], 10, Some(&filter))
        .await
        .unwrap();

    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![in_kb]);
}

#[tokio::test]
async fn test_transient_query_failure_does_not_leak_into_next_query() {
    let hit = Uuid::new_v4();
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_errors([DbErr::Conn(RuntimeErr::Internal(
            "connection closed".into(),
        ))])
        .append_query_results([vec![BTreeMap::from([("dimension", Value::from(2i32))])]])
        .append_query_results([vec![BTreeMap::from([
            ("id", Value::from(hit)),
            ("score", Value::from(0.75f64)),
            ("payload", Value::from(serde_json::json!({}))),
        ])]])
        .into_connection();
    let index = PgVectorIndex::new(db);

    let failed = index.query("kb_a", &[1.0, 0.0], 3, None).await.unwrap();
    assert!(failed.is_empty());

    let next = index.query("kb_b", &[0.0, 1.0], 3, None).await.unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].id, hit);
}
