use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KnowledgeChunks::Table)
                    .if_not_exists()
                    .col(pk_uuid(KnowledgeChunks::Id))
                    .col(uuid(KnowledgeChunks::DocumentId))
                    .col(uuid(KnowledgeChunks::KnowledgeBaseId))
                    .col(uuid(KnowledgeChunks::ClientId))
                    .col(integer(KnowledgeChunks::ChunkIndex))
                    .col(text(KnowledgeChunks::Content))
                    .col(integer_null(KnowledgeChunks::TokenCount))
                    .col(
                        timestamp_with_time_zone(KnowledgeChunks::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                ALTER TABLE knowledge_chunks
                    ADD CONSTRAINT chk_knowledge_chunks_index_non_negative CHECK (chunk_index >= 0),
                    ADD CONSTRAINT chk_knowledge_chunks_content_not_blank CHECK (btrim(content) <> '')
                "#,
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_knowledge_chunks_document_position")
                    .table(KnowledgeChunks::Table)
                    .col(KnowledgeChunks::DocumentId)
                    .col(KnowledgeChunks::ChunkIndex)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_knowledge_chunks_knowledge_base")
                    .table(KnowledgeChunks::Table)
                    .col(KnowledgeChunks::KnowledgeBaseId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(KnowledgeChunks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum KnowledgeChunks {
    Table,
    Id,
    DocumentId,
    KnowledgeBaseId,
    ClientId,
    ChunkIndex,
    Content,
    TokenCount,
    CreatedAt,
}
