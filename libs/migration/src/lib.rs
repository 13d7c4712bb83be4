pub use sea_orm_migration::prelude::*;

mod m20250301_000001_enable_pgvector;
mod m20250301_000002_create_knowledge_chunks;
mod m20250301_000003_create_vector_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_enable_pgvector::Migration),
            Box::new(m20250301_000002_create_knowledge_chunks::Migration),
            Box::new(m20250301_000003_create_vector_tables::Migration),
        ]
    }
}
