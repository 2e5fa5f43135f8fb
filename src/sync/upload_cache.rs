//! Content-addressed cache in front of the uploader.
//!
//! Entries are keyed by the blake3 digest of the payload and live as long as
//! the cache. An entry is either a settled URL or the in-flight upload that
//! concurrent callers join.

use crate::error::{Result, SyncError};
use crate::store::ContentUploader;
use crate::types::MessageRecord;
use base64::Engine as _;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

type SharedUpload = Shared<BoxFuture<'static, Result<String>>>;

enum CacheEntry {
    Ready(String),
    InFlight(SharedUpload),
}

/// A decoded `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPayload {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataPayload {
    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            _ => "bin",
        }
    }
}

pub fn is_remote_url(content: &str) -> bool {
    let trimmed = content.trim_start();
    trimmed.starts_with("http://") || trimmed.starts_with("https://")
}

/// Decode `data:<mime>;base64,<payload>`. Returns `None` for anything else.
pub fn decode_data_url(content: &str) -> Option<DataPayload> {
    let rest = content.trim().strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(data.trim()).ok()?;
    if bytes.is_empty() {
        return None;
    }
    let mime = if mime.is_empty() { "application/octet-stream" } else { mime };
    Some(DataPayload {
        mime: mime.to_lowercase(),
        bytes,
    })
}

/// Deduplicates uploads by payload identity.
#[derive(Clone)]
pub struct ContentAddressedUploadCache {
    uploader: Arc<dyn ContentUploader>,
    directory: String,
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl ContentAddressedUploadCache {
    pub fn new(uploader: Arc<dyn ContentUploader>, directory: impl Into<String>) -> Self {
        Self {
            uploader,
            directory: directory.into(),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of cached or in-flight entries
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remote URL for `content`. Remote URLs pass through untouched; identical
    /// payloads upload once. A failed upload is evicted so the next caller retries.
    pub async fn resolve(&self, content: &str) -> Result<String> {
        if is_remote_url(content) {
            return Ok(content.trim().to_string());
        }

        let digest = blake3::hash(content.as_bytes()).to_hex().to_string();

        let upload = {
            let mut entries = self.entries.lock().await;
            match entries.get(&digest) {
                Some(CacheEntry::Ready(url)) => return Ok(url.clone()),
                Some(CacheEntry::InFlight(upload)) => {
                    debug!("Joining in-flight upload {}", &digest[..12]);
                    upload.clone()
                }
                None => {
                    let payload = decode_data_url(content).ok_or_else(|| {
                        SyncError::Validation("image content is neither a URL nor a data URL".to_string())
                    })?;
                    let upload = self.start_upload(digest.clone(), payload);
                    entries.insert(digest, CacheEntry::InFlight(upload.clone()));
                    upload
                }
            }
        };
        upload.await
    }

    fn start_upload(&self, digest: String, payload: DataPayload) -> SharedUpload {
        let uploader = self.uploader.clone();
        let entries = self.entries.clone();
        let directory = self.directory.clone();
        let filename = format!("{}.{}", &digest[..16], payload.extension());

        async move {
            let result = uploader
                .upload_content(payload.bytes, &filename, &directory)
                .await
                .map_err(|e| match e {
                    SyncError::Upload(_) => e,
                    other => SyncError::Upload(other.to_string()),
                });

            let mut entries = entries.lock().await;
            match &result {
                Ok(url) => {
                    entries.insert(digest, CacheEntry::Ready(url.clone()));
                }
                Err(e) => {
                    warn!("Upload of {} failed: {}", filename, e);
                    entries.remove(&digest);
                }
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Replace every image reference with its remote URL. References that
    /// cannot be uploaded (blank or not a data URL) are dropped; upload
    /// failures propagate.
    pub async fn resolve_message_images(&self, messages: Vec<MessageRecord>) -> Result<Vec<MessageRecord>> {
        let mut resolved = Vec::with_capacity(messages.len());
        for mut message in messages {
            message.image_data_url = match message.image_data_url.take() {
                Some(image) if is_uploadable(&image) => Some(self.resolve(&image).await?),
                _ => None,
            };

            let mut urls = Vec::with_capacity(message.image_data_urls.len());
            for image in std::mem::take(&mut message.image_data_urls) {
                if is_uploadable(&image) {
                    urls.push(self.resolve(&image).await?);
                }
            }
            message.image_data_urls = urls;
            resolved.push(message);
        }
        Ok(resolved)
    }
}

fn is_uploadable(content: &str) -> bool {
    is_remote_url(content) || decode_data_url(content).is_some()
}
