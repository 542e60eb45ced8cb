//! Object store port used for monster images.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("object store request failed: {0}")]
    Remote(String),
    #[error("object store rejected `{key}` with status {status}")]
    Status { key: String, status: u16 },
    #[error("object `{key}` still present after {attempts} delete checks")]
    DeleteUnconfirmed { key: String, attempts: u32 },
    #[error("object store timed out during {operation}")]
    Timeout { operation: &'static str },
}

impl StorageError {
    pub fn remote(err: impl std::fmt::Display) -> Self {
        Self::Remote(err.to_string())
    }
}

/// Blob store addressed by stable keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` and return the location it resolves to.
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Remove `key`. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
