use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    Cardinality { expected: usize, actual: usize },

    #[error("Embedding provider unavailable after {attempts} attempt(s): {message}")]
    TransientProvider { attempts: u32, message: String },

    #[error("Embedding provider rejected request ({status}): {message}")]
    PermanentProvider { status: u16, message: String },

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error(
        "Namespace {namespace} already declared with dimension {existing}, requested {requested}"
    )]
    DimensionConflict {
        namespace: String,
        existing: u32,
        requested: u32,
    },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: u32, actual: usize },

    #[error("Vector store temporarily unavailable: {0}")]
    StoreTransient(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Migration aborted at batch {batch}: {source}")]
    Migration {
        batch: usize,
        #[source]
        source: Box<VectorError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type VectorResult<T> = Result<T, VectorError>;

impl VectorError {
    /// Transient failures of the index backend (connectivity, poisoned session,
    /// extension not loaded). Query paths absorb these instead of propagating.
    pub fn is_transient_store(&self) -> bool {
        matches!(self, VectorError::StoreTransient(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, VectorError::Validation(_))
    }

    pub(crate) fn migration(batch: usize, source: VectorError) -> Self {
        VectorError::Migration {
            batch,
            source: Box::new(source),
        }
    }
}

impl From<sea_orm::DbErr> for VectorError {
    fn from(err: sea_orm::DbErr) -> Self {
        if database::postgres::is_transient(&err) {
            VectorError::StoreTransient(err.to_string())
        } else {
            VectorError::Store(err.to_string())
        }
    }
}

/// gRPC status codes worth retrying: CANCELLED, DEADLINE_EXCEEDED,
/// RESOURCE_EXHAUSTED, ABORTED and UNAVAILABLE.
pub(crate) fn is_transient_grpc_code(code: i32) -> bool {
    matches!(code, 1 | 4 | 8 | 10 | 14)
}

impl From<qdrant_client::QdrantError> for VectorError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        use qdrant_client::QdrantError;

        let transient = match &err {
            QdrantError::ResponseError { status } => {
                is_transient_grpc_code(i32::from(status.code()))
            }
            _ => false,
        };

        if transient {
            VectorError::StoreTransient(err.to_string())
        } else {
            VectorError::Store(err.to_string())
        }
    }
}

impl From<serde_json::Error> for VectorError {
    fn from(err: serde_json::Error) -> Self {
        VectorError::Internal(format!("JSON error: {}", err))
    }
}

impl From<core_config::ConfigError> for VectorError {
    fn from(err: core_config::ConfigError) -> Self {
        VectorError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbErr, RuntimeErr};

    #[test]
    fn test_db_errors_split_by_transience() {
        let transient: VectorError =
            DbErr::Conn(RuntimeErr::Internal("connection reset".into())).into();
        let permanent: VectorError =
            DbErr::Query(RuntimeErr::Internal("syntax error".into())).into();

        assert!(transient.is_transient_store());
        assert!(!permanent.is_transient_store());
    }

    #[test]
    fn test_grpc_code_classification() {
        assert!(is_transient_grpc_code(14));
        assert!(is_transient_grpc_code(4));
        assert!(!is_transient_grpc_code(3)); // INVALID_ARGUMENT
        assert!(!is_transient_grpc_code(5)); // NOT_FOUND
    }

    #[test]
    fn test_migration_error_keeps_source() {
        let err = VectorError::migration(3, VectorError::Store("disk full".into()));
        assert_eq!(
            err.to_string(),
            "Migration aborted at batch 3: Vector store error: disk full"
        );
    }
}
