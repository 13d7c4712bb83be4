//! Shared PostgreSQL plumbing: pooled connections with retry, a pgvector
//! health check, transient error classification and the retry loop reused
//! by remote clients.
//!
//! # Features
//!
//! - `postgres` (default) - connector built on SeaORM
//! - `config` - `core_config::FromEnv` for [`postgres::PostgresConfig`]
//!
//! ```ignore
//! use database::postgres::{check_health, connect_from_config_with_retry, PostgresConfig};
//!
//! let db = connect_from_config_with_retry(PostgresConfig::new(url), None).await?;
//! let pgvector_version = check_health(&db).await?;
//! ```

pub mod common;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use common::{DatabaseError, DatabaseResult};
