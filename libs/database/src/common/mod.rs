//! Utilities shared by the connector and by remote clients built on this crate

pub mod error;
pub mod retry;

pub use error::{DatabaseError, DatabaseResult};
pub use retry::{RetryConfig, RetryExhausted, backoff_delay_ms, retry_delay_ms, retry_when};
