//! Collaborator boundary: the document store and the content uploader.
//!
//! Implement [`DocumentStore`] and [`ContentUploader`] for a backend and hand
//! them to [`crate::SyncEngine::new`]. Documents travel as JSON objects; the
//! identity of a document lives in its `key` field.

#[cfg(feature = "http")]
pub mod http;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(feature = "http")]
pub use http::HttpStore;

/// One page of a query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    #[serde(default)]
    pub list: Vec<Value>,
}

/// Document-style store addressed by collection and identity key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document and return it as stored, including its `key`.
    async fn create(&self, collection: &str, document: Value) -> Result<Value>;

    /// Merge `partial` into the document identified by `key`.
    ///
    /// Fails with [`crate::SyncError::NotFound`] for an unknown identity.
    async fn update(&self, collection: &str, key: &str, partial: Value) -> Result<Value>;

    async fn delete(&self, collection: &str, key: &str) -> Result<()>;

    /// Documents whose fields equal every field of `filter`, at most `limit`.
    async fn query(&self, collection: &str, filter: Value, limit: usize) -> Result<QueryPage>;
}

/// Uploads binary payloads and returns their remote URL.
#[async_trait]
pub trait ContentUploader: Send + Sync {
    async fn upload_content(&self, payload: Vec<u8>, filename: &str, directory: &str) -> Result<String>;
}
