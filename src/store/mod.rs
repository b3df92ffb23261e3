mod client;
mod postgres;

pub use client::PostgresClient;
pub use postgres::{PostgresStore, StoreConfig};

use async_trait::async_trait;

use crate::models::reading::SensorReading;

/// Rows returned by `recent` when the caller does not supply a limit.
pub const DEFAULT_RECENT_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("invalid identifier '{0}' (only [A-Za-z_][A-Za-z0-9_]* allowed)")]
    InvalidIdentifier(String),

    #[error("limit must be positive, got {0}")]
    InvalidLimit(i64),
}

/// Durable reading storage. The ingest bridge only appends; the history
/// endpoint only reads. Implementations must be safe for concurrent use
/// from both paths.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn append(&self, reading: &SensorReading) -> Result<(), StoreError>;

    /// The most recent readings, newest first. `None` means
    /// [`DEFAULT_RECENT_LIMIT`]; a non-positive limit is rejected before
    /// any query runs.
    async fn recent(&self, limit: Option<i64>) -> Result<Vec<SensorReading>, StoreError>;
}

/// Resolves the caller-supplied row limit, applying the default when absent.
pub fn resolve_limit(limit: Option<i64>) -> Result<i64, StoreError> {
    match limit {
        None => Ok(DEFAULT_RECENT_LIMIT),
        Some(n) if n > 0 => Ok(n),
        Some(n) => Err(StoreError::InvalidLimit(n)),
    }
}

pub(crate) fn validate_ident(s: &str) -> Result<(), StoreError> {
    let mut chars = s.chars();
    let first = chars
        .next()
        .ok_or_else(|| StoreError::InvalidIdentifier(s.to_string()))?;
    let ok_first = first.is_ascii_alphabetic() || first == '_';
    let ok_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if ok_first && ok_rest {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(s.to_string()))
    }
}
