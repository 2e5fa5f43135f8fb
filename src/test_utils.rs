//! In-memory collaborators for tests and local experiments.

use crate::error::{Result, SyncError};
use crate::store::{ContentUploader, DocumentStore, QueryPage};
use crate::sync::path_tags::{name_from_path, tags_from_path};
use crate::types::SessionEntity;
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A `data:image/png;base64,...` URL wrapping `bytes`
pub fn png_data_url(bytes: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// A minimal stored session whose identity is `path`
pub fn sample_session(path: &str) -> SessionEntity {
    let name = name_from_path(path);
    SessionEntity {
        key: path.to_string(),
        url: format!("session://{}", path),
        title: name.clone(),
        page_title: name,
        page_description: format!("Source: {}", path),
        page_content: String::new(),
        tags: tags_from_path(path),
        messages: Vec::new(),
        is_favorite: false,
        created_at: 1000,
        updated_at: 1000,
        last_access_time: 1000,
    }
}

/// Document store backed by ordered maps, with call counters and failure
/// injection.
#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    latency: Option<Duration>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    queries: AtomicUsize,
    fail_queries: AtomicBool,
    failing_creates: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, collection: &str, session: SessionEntity) {
        let key = session.key.clone();
        let document = serde_json::to_value(session).unwrap_or(Value::Null);
        self.insert_raw(collection, &key, document);
    }

    pub fn insert_raw(&self, collection: &str, key: &str, document: Value) {
        locked(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);
    }

    pub fn get(&self, collection: &str, key: &str) -> Option<Value> {
        locked(&self.collections)
            .get(collection)
            .and_then(|docs| docs.get(key).cloned())
    }

    pub fn session(&self, collection: &str, key: &str) -> Option<SessionEntity> {
        self.get(collection, key)
            .and_then(|doc| serde_json::from_value(doc).ok())
    }

    pub fn len(&self, collection: &str) -> usize {
        locked(&self.collections)
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates_for(&self, key: &str) {
        locked(&self.failing_creates).insert(key.to_string());
    }

    pub fn fail_deletes_for(&self, key: &str) {
        locked(&self.failing_deletes).insert(key.to_string());
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn matches_filter(document: &Value, filter: &Value) -> bool {
    match filter.as_object() {
        Some(fields) => fields
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected)),
        None => true,
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create(&self, collection: &str, mut document: Value) -> Result<Value> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let object = document
            .as_object_mut()
            .ok_or_else(|| SyncError::Validation("document must be an object".to_string()))?;
        let key = match object.get("key").and_then(Value::as_str) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => {
                let key = uuid::Uuid::new_v4().to_string();
                object.insert("key".to_string(), Value::String(key.clone()));
                key
            }
        };

        if locked(&self.failing_creates).contains(&key) {
            return Err(SyncError::Store(format!("create rejected for {}", key)));
        }

        let mut collections = locked(&self.collections);
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&key) {
            return Err(SyncError::Store(format!("duplicate key {}", key)));
        }
        docs.insert(key, document.clone());
        Ok(document)
    }

    async fn update(&self, collection: &str, key: &str, partial: Value) -> Result<Value> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let mut collections = locked(&self.collections);
        let existing = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(key))
            .ok_or_else(|| SyncError::NotFound(key.to_string()))?;

        let fields = match partial {
            Value::Object(fields) => fields,
            _ => return Err(SyncError::Validation("update must be an object".to_string())),
        };
        let target = existing.as_object_mut().ok_or_else(|| {
            SyncError::Store(format!("stored document {} is not an object", key))
        })?;
        merge_fields(target, fields);
        Ok(existing.clone())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if locked(&self.failing_deletes).contains(key) {
            return Err(SyncError::Store(format!("delete rejected for {}", key)));
        }

        locked(&self.collections)
            .get_mut(collection)
            .and_then(|docs| docs.remove(key))
            .map(|_| ())
            .ok_or_else(|| SyncError::NotFound(key.to_string()))
    }

    async fn query(&self, collection: &str, filter: Value, limit: usize) -> Result<QueryPage> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(SyncError::Store("query unavailable".to_string()));
        }

        let collections = locked(&self.collections);
        let list = collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| matches_filter(doc, &filter))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(QueryPage { list })
    }
}

fn merge_fields(target: &mut Map<String, Value>, fields: Map<String, Value>) {
    for (field, value) in fields {
        target.insert(field, value);
    }
}

/// Uploader that fabricates CDN URLs and counts calls.
#[derive(Default)]
pub struct CountingUploader {
    uploads: AtomicUsize,
    latency: Option<Duration>,
    fail: AtomicBool,
    last_filename: Mutex<Option<String>>,
}

impl CountingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn last_filename(&self) -> Option<String> {
        locked(&self.last_filename).clone()
    }
}

#[async_trait]
impl ContentUploader for CountingUploader {
    async fn upload_content(&self, payload: Vec<u8>, filename: &str, directory: &str) -> Result<String> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Upload(format!("upload of {} rejected", filename)));
        }
        if payload.is_empty() {
            return Err(SyncError::Upload("empty payload".to_string()));
        }
        *locked(&self.last_filename) = Some(filename.to_string());
        Ok(format!("https://cdn.test/{}/{}", directory, filename))
    }
}
