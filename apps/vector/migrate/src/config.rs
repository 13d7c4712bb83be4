//! Configuration for the vector migration CLI

use core_config::{ConfigError, FromEnv, env_or_default, env_parse};
use domain_vector::{IndexBackend, QdrantConfig};

#[derive(Debug, Clone)]
pub struct MigrateConfig {
    /// Backend used when `--from`/`--to` are not given
    pub default_backend: IndexBackend,
    pub batch_size: usize,
    pub qdrant: QdrantConfig,
}

/// - `VECTOR_BACKEND` (default: `postgres`)
/// - `MIGRATION_BATCH_SIZE` (default: 100)
/// - `QDRANT_*` via [`QdrantConfig`]
///
/// `DATABASE_URL` is only read when a Postgres backend is selected.
impl FromEnv for MigrateConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_backend = env_or_default("VECTOR_BACKEND", "postgres");
        let default_backend = parse_backend(&raw_backend).map_err(|details| {
            ConfigError::ParseError {
                key: "VECTOR_BACKEND".to_string(),
                details,
            }
        })?;

        Ok(Self {
            default_backend,
            batch_size: env_parse("MIGRATION_BATCH_SIZE", "100")?,
            qdrant: QdrantConfig::from_env()?,
        })
    }
}

/// Only persistent backends can take part in a migration.
pub fn parse_backend(raw: &str) -> Result<IndexBackend, String> {
    match raw.parse::<IndexBackend>() {
        Ok(IndexBackend::Memory) => {
            Err("the in-memory backend cannot be migrated from or to".to_string())
        }
        Ok(backend) => Ok(backend),
        Err(e) => Err(e.to_string()),
    }
}
