//! PostgreSQL connector, health check and classification of transient
//! driver errors.

mod config;
mod connector;
mod health;
mod transient;

pub use config::PostgresConfig;
pub use connector::{connect_from_config_with_retry, connect_with_options};
pub use health::check_health;
pub use transient::is_transient;

pub use sea_orm::{ConnectOptions, DatabaseConnection, DbErr};
