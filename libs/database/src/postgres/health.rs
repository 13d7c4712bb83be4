use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use tracing::debug;

use crate::common::{DatabaseError, DatabaseResult};

const VECTOR_EXTENSION: &str = "vector";

/// Verify the connection works and the `vector` extension is installed.
///
/// Returns the installed pgvector version.
///
/// ```ignore
/// let db = connect_from_config_with_retry(config, None).await?;
/// let version = check_health(&db).await?;
/// ```
pub async fn check_health(db: &DatabaseConnection) -> DatabaseResult<String> {
    debug!("Running PostgreSQL health check");

    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Postgres,
        "SELECT extversion FROM pg_extension WHERE extname = $1",
        [VECTOR_EXTENSION.into()],
    );
    let row = db
        .query_one_raw(stmt)
        .await
        .map_err(|e| DatabaseError::HealthCheckFailed(e.to_string()))?
        .ok_or_else(|| DatabaseError::MissingExtension(VECTOR_EXTENSION.to_string()))?;

    let version: String = row.try_get("", "extversion")?;
    debug!(pgvector = %version, "PostgreSQL health check passed");
    Ok(version)
}
