use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, instrument};

use crate::error::{VectorError, VectorResult};
use crate::index::SimilarityIndex;

/// Totals of a completed migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Records read from the source
    pub total_processed: usize,
    /// Records the destination accepted
    pub written: usize,
    /// Records the destination skipped (orphaned or wrong dimension)
    pub skipped: usize,
    pub batches: usize,
}

/// Copies every vector of one namespace into another, one batch at a time.
///
/// Source and destination may be the same index or different backends. The
/// run is a single sequential pass without checkpoints; after an abort it has
/// to start over, which is safe because upserts are idempotent.
pub struct MigrationRunner {
    source: Arc<dyn SimilarityIndex>,
    dest: Arc<dyn SimilarityIndex>,
}

impl MigrationRunner {
    pub fn new(source: Arc<dyn SimilarityIndex>, dest: Arc<dyn SimilarityIndex>) -> Self {
        Self { source, dest }
    }

    #[instrument(
        skip(self),
        fields(from = %self.source.backend(), to = %self.dest.backend())
    )]
    pub async fn run(
        &self,
        source_namespace: &str,
        dest_namespace: &str,
        dimension: u32,
        batch_size: usize,
    ) -> VectorResult<MigrationReport> {
        self.dest
            .ensure_namespace(dest_namespace, dimension)
            .await
            .map_err(|e| VectorError::migration(0, e))?;

        let mut report = MigrationReport::default();
        let mut batches = self.source.stream_all(source_namespace, batch_size);

        while let Some(batch) = batches.next().await {
            let number = report.batches + 1;
            let batch = batch.map_err(|e| VectorError::migration(number, e))?;
            let read = batch.len();

            let upsert = self
                .dest
                .upsert(dest_namespace, batch)
                .await
                .map_err(|e| VectorError::migration(number, e))?;

            report.batches = number;
            report.total_processed += read;
            report.written += upsert.upserted;
            report.skipped += upsert.skipped.len();

            info!(
                batch = number,
                read,
                written = upsert.upserted,
                total = report.total_processed,
                "Migrated batch"
            );
        }

        info!(
            total = report.total_processed,
            written = report.written,
            skipped = report.skipped,
            batches = report.batches,
            "Migration complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use crate::models::VectorRecord;
    use uuid::Uuid;

    async fn seeded(count: usize) -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new());
        index.ensure_namespace("kb_src", 2).await.unwrap();
        let records = (0..count)
            .map(|i| VectorRecord::new(Uuid::new_v4(), vec![i as f32, 1.0]))
            .collect();
        index.upsert("kb_src", records).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_same_index_copy() {
        let index = seeded(5).await;
        let runner = MigrationRunner::new(index.clone(), index.clone());

        let report = runner.run("kb_src", "kb_dst", 2, 2).await.unwrap();

        assert_eq!(report.total_processed, 5);
        assert_eq!(report.written, 5);
        assert_eq!(report.batches, 3);
        assert_eq!(index.record_count("kb_dst").await, Some(5));
    }

    #[tokio::test]
    async fn test_dimension_change_is_counted_as_skipped() {
        let source = seeded(3).await;
        let dest = Arc::new(InMemoryIndex::new());
        let runner = MigrationRunner::new(source, dest.clone());

        let report = runner.run("kb_src", "kb_dst", 3, 10).await.unwrap();

        assert_eq!(report.total_processed, 3);
        assert_eq!(report.written, 0);
        assert_eq!(report.skipped, 3);
        assert_eq!(dest.record_count("kb_dst").await, Some(0));
    }

    #[tokio::test]
    async fn test_missing_source_aborts_with_batch_number() {
        let runner = MigrationRunner::new(
            Arc::new(InMemoryIndex::new()),
            Arc::new(InMemoryIndex::new()),
        );

        let err = runner.run("kb_missing", "kb_dst", 2, 10).await.unwrap_err();
        assert!(matches!(err, VectorError::Migration { batch: 1, .. }));
    }

    #[tokio::test]
    async fn test_invalid_destination_aborts_before_reading() {
        let runner = MigrationRunner::new(seeded(1).await, Arc::new(InMemoryIndex::new()));
        let err = runner.run("kb_src", "bad name!", 2, 10).await.unwrap_err();
        assert!(matches!(err, VectorError::Migration { batch: 0, .. }));
    }
}
