use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VectorNamespaces::Table)
                    .if_not_exists()
                    .col(text(VectorNamespaces::Name).primary_key())
                    .col(integer(VectorNamespaces::Dimension))
                    .col(
                        timestamp_with_time_zone(VectorNamespaces::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "ALTER TABLE vector_namespaces ADD CONSTRAINT chk_vector_namespaces_dimension CHECK (dimension > 0)",
            )
            .await?;

        // `vector` has no sea-query column type, and the width is left open so a
        // single table can hold namespaces of different dimensions.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE IF NOT EXISTS vector_records (
                    namespace TEXT NOT NULL REFERENCES vector_namespaces(name) ON DELETE CASCADE,
                    id UUID NOT NULL,
                    embedding vector NOT NULL,
                    payload JSONB NOT NULL DEFAULT '{}'::jsonb,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    PRIMARY KEY (namespace, id)
                )
                "#,
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS idx_vector_records_knowledge_base ON vector_records ((payload->>'knowledge_base_id'))",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS idx_vector_records_client ON vector_records ((payload->>'client_id'))",
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VectorRefs::Table)
                    .if_not_exists()
                    .col(uuid(VectorRefs::ChunkId))
                    .col(string(VectorRefs::Backend))
                    .col(string(VectorRefs::IndexName))
                    .col(string(VectorRefs::VectorId))
                    .col(
                        timestamp_with_time_zone(VectorRefs::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(VectorRefs::ChunkId)
                            .col(VectorRefs::Backend),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vector_refs_location")
                    .table(VectorRefs::Table)
                    .col(VectorRefs::Backend)
                    .col(VectorRefs::IndexName)
                    .col(VectorRefs::VectorId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VectorRefs::Table).to_owned())
            .await?;

        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS vector_records")
            .await?;

        manager
            .drop_table(Table::drop().table(VectorNamespaces::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum VectorNamespaces {
    Table,
    Name,
    Dimension,
    CreatedAt,
}

#[derive(DeriveIden)]
enum VectorRefs {
    Table,
    ChunkId,
    Backend,
    IndexName,
    VectorId,
    UpdatedAt,
}
