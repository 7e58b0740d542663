//! Object storage for analyst uploads.
//!
//! Objects live under `<generated-id>/<original-file-name>` in a single
//! bucket. The store is built once at startup and handed to the service core,
//! so tests swap in [`MemoryStore`].

mod memory;
mod s3;

pub use memory::MemoryStore;
pub use s3::{S3Settings, S3Store};

use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket recorded in file metadata.
    fn bucket(&self) -> &str;

    /// Stores `content` under `key`, replacing anything already there.
    async fn put(&self, key: &str, content: Vec<u8>, content_type: Option<&str>) -> AppResult<()>;

    /// Removes the object under `key`. Removing a missing object succeeds.
    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Stand-in used when credentials are absent: every call fails loudly.
#[derive(Debug, Clone)]
pub struct DisabledStore {
    reason: String,
}

impl DisabledStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    fn unavailable(&self) -> AppError {
        AppError::Storage(format!("Object storage is disabled: {}", self.reason))
    }
}

#[async_trait]
impl ObjectStore for DisabledStore {
    fn bucket(&self) -> &str {
        ""
    }

    async fn put(&self, _key: &str, _content: Vec<u8>, _content_type: Option<&str>) -> AppResult<()> {
        Err(self.unavailable())
    }

    async fn delete(&self, _key: &str) -> AppResult<()> {
        Err(self.unavailable())
    }
}

/// Connects to S3 when fully configured, otherwise returns a disabled store.
/// A connection failure also disables storage instead of stopping the process.
pub async fn connect(settings: Result<S3Settings, String>) -> Arc<dyn ObjectStore> {
    let settings = match settings {
        Ok(settings) => settings,
        Err(missing) => {
            tracing::warn!(reason = %missing, "object storage disabled");
            return Arc::new(DisabledStore::new(missing));
        }
    };
    match S3Store::connect(&settings).await {
        Ok(store) => {
            tracing::info!(bucket = %settings.bucket, "object storage ready");
            Arc::new(store)
        }
        Err(err) => {
            tracing::error!(bucket = %settings.bucket, error = %err, "object storage unavailable");
            Arc::new(DisabledStore::new(err.user_message().to_string()))
        }
    }
}
