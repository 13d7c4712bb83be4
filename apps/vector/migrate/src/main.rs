//! Vector Migrate
//!
//! Copies every vector of one namespace into another, optionally across
//! index backends. Re-running a migration is safe: records are upserted by id.

use std::sync::Arc;

use clap::Parser;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use database::postgres::{PostgresConfig, check_health, connect_from_config_with_retry};
use domain_vector::{
    IndexBackend, MigrationRunner, PgChunkCatalog, PgVectorIndex, QdrantIndex, SimilarityIndex,
};
use eyre::{Result, WrapErr};
use tracing::info;

mod config;

use config::{MigrateConfig, parse_backend};

#[derive(Parser)]
#[command(name = "vector-migrate")]
#[command(about = "Copy vectors between namespaces and index backends")]
struct Cli {
    /// Namespace to read from
    #[arg(long)]
    source: String,

    /// Namespace to write into (created if missing)
    #[arg(long)]
    dest: String,

    /// Vector dimension of the destination namespace
    #[arg(long)]
    dim: u32,

    /// Records per batch. Defaults to MIGRATION_BATCH_SIZE.
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Source backend (postgres, qdrant). Defaults to VECTOR_BACKEND.
    #[arg(long, value_parser = parse_backend)]
    from: Option<IndexBackend>,

    /// Destination backend (postgres, qdrant). Defaults to VECTOR_BACKEND.
    #[arg(long, value_parser = parse_backend)]
    to: Option<IndexBackend>,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = MigrateConfig::from_env()?;
    let environment = Environment::from_env();
    init_tracing(&environment);

    let cli = Cli::parse();
    let from = cli.from.unwrap_or(config.default_backend);
    let to = cli.to.unwrap_or(config.default_backend);
    let batch_size = cli.batch_size.unwrap_or(config.batch_size);

    let source = open_index(from, &config).await?;
    let dest = if from == to {
        source.clone()
    } else {
        open_index(to, &config).await?
    };

    info!(
        "Migrating {} ({}) -> {} ({}) in batches of {}",
        cli.source, from, cli.dest, to, batch_size
    );

    let report = MigrationRunner::new(source, dest)
        .run(&cli.source, &cli.dest, cli.dim, batch_size)
        .await
        .wrap_err_with(|| format!("migration {} -> {} aborted", cli.source, cli.dest))?;

    println!(
        "Migrated {} records (written {}, skipped {}, batches {})",
        report.total_processed, report.written, report.skipped, report.batches
    );

    Ok(())
}

async fn open_index(
    backend: IndexBackend,
    config: &MigrateConfig,
) -> Result<Arc<dyn SimilarityIndex>> {
    match backend {
        IndexBackend::Pgvector => {
            let pg_config = <PostgresConfig as FromEnv>::from_env()?;

            info!("Connecting to database...");
            let db = connect_from_config_with_retry(pg_config, None)
                .await
                .map_err(|e| eyre::eyre!("Database connection failed: {}", e))?;
            let pgvector = check_health(&db)
                .await
                .map_err(|e| eyre::eyre!("Database health check failed: {}", e))?;
            info!("pgvector {} available", pgvector);

            let catalog = Arc::new(PgChunkCatalog::new(db.clone()));
            Ok(Arc::new(PgVectorIndex::new(db).with_chunk_catalog(catalog)))
        }
        IndexBackend::Qdrant => {
            info!("Connecting to Qdrant at {}", config.qdrant.url);
            let index = QdrantIndex::new(config.qdrant.clone())?;
            Ok(Arc::new(index))
        }
        IndexBackend::Memory => Err(eyre::eyre!("the in-memory backend cannot be migrated")),
    }
}
