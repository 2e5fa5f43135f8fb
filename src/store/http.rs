//! REST implementation of the store and uploader collaborators.

use crate::config::StoreConfig;
use crate::error::{Result, SyncError};
use crate::store::{ContentUploader, DocumentStore, QueryPage};
use async_trait::async_trait;
use base64::Engine as _;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Identity keys are paths; slashes must survive as a single URL segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Talks JSON to a document service.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &StoreConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.base_url.clone(), config.api_key()?))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn document_url(&self, collection: &str, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, encode_segment(key))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(REQUEST_TIMEOUT);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| SyncError::Store(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SyncError::Store(format!("{} failed ({}): {}", what, status, error_text)));
        }
        Ok(response)
    }

    async fn send_json(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let response = self.send(request, what).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| SyncError::Serialization(format!("{} returned invalid JSON: {}", what, e)))
    }
}

#[async_trait]
impl DocumentStore for HttpStore {
    async fn create(&self, collection: &str, document: Value) -> Result<Value> {
        debug!("POST {}", self.collection_url(collection));
        let request = self.client.post(self.collection_url(collection)).json(&document);
        self.send_json(request, "create").await
    }

    async fn update(&self, collection: &str, key: &str, partial: Value) -> Result<Value> {
        let request = self.client.patch(self.document_url(collection, key)).json(&partial);
        self.send_json(request, &format!("update {}", key)).await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        let request = self.client.delete(self.document_url(collection, key));
        self.send(request, &format!("delete {}", key)).await?;
        Ok(())
    }

    async fn query(&self, collection: &str, filter: Value, limit: usize) -> Result<QueryPage> {
        let request = self
            .client
            .post(format!("{}/query", self.collection_url(collection)))
            .json(&json!({ "filter": filter, "limit": limit }));
        let body = self.send_json(request, "query").await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl ContentUploader for HttpStore {
    async fn upload_content(&self, payload: Vec<u8>, filename: &str, directory: &str) -> Result<String> {
        let body = json!({
            "filename": filename,
            "directory": directory,
            "content": base64::engine::general_purpose::STANDARD.encode(&payload),
        });
        let request = self.client.post(format!("{}/upload", self.base_url)).json(&body);
        let response = self
            .send(request, "upload")
            .await
            .map_err(|e| SyncError::Upload(e.to_string()))?;
        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Upload(format!("invalid upload response: {}", e)))?;
        Ok(parsed.url)
    }
}

fn encode_segment(key: &str) -> String {
    utf8_percent_encode(key, SEGMENT).to_string()
}
