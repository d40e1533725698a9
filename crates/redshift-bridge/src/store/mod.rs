//! Object store collaborator.

mod object;

pub use object::ObjectStoreBackend;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Failure of a single object store call.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("{operation} {location} failed: {message}")]
    Transport {
        operation: &'static str,
        location: String,
        message: String,
    },
}

impl StoreError {
    pub fn transport(
        operation: &'static str,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        StoreError::Transport {
            operation,
            location: location.into(),
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Per-upload settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: Option<String>,
}

/// Bucket/key object storage used for staging.
///
/// Implementations must treat `list` prefixes as raw string prefixes:
/// `list("b", "out/run1_")` returns `out/run1_0000_part_00` but not
/// `out/run2_...`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StagingStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, data: Bytes, options: &PutOptions)
        -> StoreResult<()>;

    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Bytes>;

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Keys under `prefix`, sorted.
    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>>;

    async fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool>;
}
