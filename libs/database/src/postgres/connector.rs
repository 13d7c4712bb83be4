use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tracing::info;

use super::{PostgresConfig, is_transient};
use crate::common::{RetryConfig, retry_when};

/// Open a pool with the given options
pub async fn connect_with_options(options: ConnectOptions) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(options).await?;
    info!("Connected to PostgreSQL");
    Ok(db)
}

/// Connect, retrying failures that [`is_transient`] classifies as retryable.
///
/// Defaults to [`RetryConfig::default`] when `retry_config` is `None`.
///
/// ```ignore
/// let config = PostgresConfig::from_env()?;
/// let db = connect_from_config_with_retry(config, Some(RetryConfig::new().with_max_attempts(6))).await?;
/// ```
pub async fn connect_from_config_with_retry(
    config: PostgresConfig,
    retry_config: Option<RetryConfig>,
) -> Result<DatabaseConnection, DbErr> {
    let options = config.into_connect_options();
    let retry_config = retry_config.unwrap_or_default();

    retry_when(
        || connect_with_options(options.clone()),
        &retry_config,
        is_transient,
    )
    .await
    .map_err(|exhausted| exhausted.error)
}
