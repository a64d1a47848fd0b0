//! Key/value cache interface behind the user-token lookup classifier.
//!
//! The gate only reads. Whatever issues user tokens owns the index and
//! writes it (for Valkey that is an external process; for the in-process
//! cache it is the startup seeding in `services::oauth2::factory`).
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

/// Kept apart from `GateError` so callers choose the failure policy; the gate
/// treats a failed lookup as "not a user token" and runs the chain.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
}

/// Implementations must be cheap to clone (typically `Arc<...>` inside).
#[async_trait]
pub trait CacheClient: Clone + Send + Sync + 'static {
    // Backend name, for logs.
    fn backend_name(&self) -> &'static str;

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    // `Ok(false)` when a live entry already exists.
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool>;
}
