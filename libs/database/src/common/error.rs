/// Errors raised by the connector and health checks
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sea_orm::DbErr),

    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    /// A required Postgres extension is not installed in the target database
    #[error("Extension '{0}' is not installed; run the workspace migrations first")]
    MissingExtension(String),
}

impl DatabaseError {
    /// Whether retrying the failed operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            DatabaseError::Postgres(err) => crate::postgres::is_transient(err),
            DatabaseError::HealthCheckFailed(_) => true,
            DatabaseError::MissingExtension(_) => false,
        }
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
