//! Sync engine
//!
//! Owns the three pieces of shared state (in-flight reads, upload cache,
//! pending writes) and exposes the file/comment → session/message operations.
//! Immediate read-modify-write cycles on one identity are serialized so
//! concurrent comment syncs never overwrite each other's messages.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::store::{ContentUploader, DocumentStore};
use crate::sync::dedup::RequestDeduplicator;
use crate::sync::messages::MessageNormalizer;
use crate::sync::path_tags::{canonical_path, is_within_folder, name_from_path, tags_from_path};
use crate::sync::timestamp::{normalize_timestamp, now_millis};
use crate::sync::upload_cache::ContentAddressedUploadCache;
use crate::sync::write_queue::{CoalescingWriteQueue, DrainReport};
use crate::types::{
    CommentEntity, FileEntity, FolderDeleteReport, MessageRecord, RawMessage, ReverseProjection,
    SessionEntity, SyncOutcome,
};
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

const DESCRIPTION_PREFIX: &str = "Source: ";

/// Bidirectional file ↔ session synchronization engine.
///
/// Construct once per process and share by reference; all coalescing
/// relies on callers going through the same instance.
pub struct SyncEngine {
    config: SyncConfig,
    store: Arc<dyn DocumentStore>,
    reads: RequestDeduplicator,
    uploads: ContentAddressedUploadCache,
    queue: CoalescingWriteQueue,
    normalizer: MessageNormalizer,
    identity_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn DocumentStore>,
        uploader: Arc<dyn ContentUploader>,
    ) -> Self {
        let reads = RequestDeduplicator::new(store.clone(), config.collection.clone());
        let uploads = ContentAddressedUploadCache::new(uploader, config.upload_directory.clone());
        let queue = CoalescingWriteQueue::new(
            store.clone(),
            reads.clone(),
            config.collection.clone(),
            config.batch_delay(),
        );
        let normalizer = MessageNormalizer::new(config.dedup_window_ms);

        Self {
            config,
            store,
            reads,
            uploads,
            queue,
            normalizer,
            identity_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &MessageNormalizer {
        &self.normalizer
    }

    pub fn upload_cache(&self) -> &ContentAddressedUploadCache {
        &self.uploads
    }

    /// Identity key of the session mirroring `path`
    pub fn identity_for_path(path: &str) -> String {
        canonical_path(path)
    }

    /// Read a session through the request deduplicator.
    pub async fn get_entity(&self, id: &str) -> Option<SessionEntity> {
        self.reads.get_by_identity(id).await
    }

    /// Number of writes waiting for the next drain
    pub async fn pending_writes(&self) -> usize {
        self.queue.pending_len().await
    }

    /// Drain the write queue now if a drain is scheduled.
    pub async fn flush(&self) -> DrainReport {
        self.queue.flush().await
    }

    /// Derive the session for `file`. Fails for a file without a usable path.
    pub fn derive_entity(&self, file: &FileEntity) -> Result<SessionEntity> {
        let key = Self::identity_for_path(&file.path);
        if key.is_empty() {
            return Err(SyncError::Validation(format!(
                "file reference has no usable path: {:?}",
                file.path
            )));
        }

        let name = if file.name.trim().is_empty() {
            name_from_path(&key)
        } else {
            file.name.trim().to_string()
        };
        let created_at = normalize_timestamp(file.created_at.as_ref());
        let updated_at = match &file.updated_at {
            Some(value) => normalize_timestamp(Some(value)),
            None => created_at,
        };

        Ok(SessionEntity {
            url: self.new_url(),
            title: name.clone(),
            page_title: name,
            page_description: format!("{}{}", DESCRIPTION_PREFIX, key),
            page_content: file.content.clone(),
            tags: tags_from_path(&key),
            messages: Vec::new(),
            is_favorite: false,
            created_at,
            updated_at,
            last_access_time: now_millis(),
            key,
        })
    }

    /// Mirror `file` into its session.
    ///
    /// `immediate` upserts against the store; otherwise the session is queued
    /// as a create-if-absent write. Without `force_update` an immediate sync
    /// of unchanged derived state skips the write.
    pub async fn sync_file_to_entity(
        &self,
        file: &FileEntity,
        immediate: bool,
        force_update: bool,
    ) -> Result<SyncOutcome> {
        let derived = self.derive_entity(file)?;

        if !immediate {
            let id = derived.key.clone();
            self.queue.enqueue(id.clone(), derived).await;
            return Ok(SyncOutcome::queued(id));
        }

        let _guard = self.lock_identity(&derived.key).await;
        match self.reads.get_by_identity(&derived.key).await {
            Some(existing) => {
                if !force_update && existing.same_derived_state(&derived) {
                    debug!("Session {} already up to date", existing.key);
                    return Ok(SyncOutcome::Written(existing));
                }
                let merged = SessionEntity {
                    url: existing.url,
                    messages: existing.messages,
                    is_favorite: existing.is_favorite,
                    created_at: existing.created_at,
                    ..derived
                };
                self.update_entity(&merged).await.map(SyncOutcome::Written)
            }
            None => self.create_entity(&derived).await.map(SyncOutcome::Written),
        }
    }

    /// Upsert `comment` as a message of the session mirroring `path`.
    ///
    /// Comments never create sessions: the file must have been synced first.
    pub async fn sync_comment_to_message(
        &self,
        comment: &CommentEntity,
        path: &str,
        immediate: bool,
    ) -> Result<SyncOutcome> {
        let id = Self::identity_for_path(path);
        let _guard = self.lock_identity(&id).await;
        let mut entity = self.require_entity(&id).await?;

        let incoming = self
            .normalizer
            .normalize(&RawMessage::from(comment))
            .ok_or_else(|| {
                SyncError::Validation(format!("comment {} has neither text nor image", comment.key))
            })?;

        let messages = self.normalizer.upsert_message(entity.messages, incoming);
        entity.messages = self.uploads.resolve_message_images(messages).await?;
        let now = now_millis();
        entity.updated_at = now;
        entity.last_access_time = now;

        if immediate {
            self.update_entity(&entity).await.map(SyncOutcome::Written)
        } else {
            self.queue.enqueue(id.clone(), entity).await;
            Ok(SyncOutcome::queued(id))
        }
    }

    /// Remove the message mirroring a deleted comment.
    ///
    /// Without the source `comment` there is nothing to match on, so no
    /// message is removed.
    pub async fn delete_comment_message(
        &self,
        comment_key: &str,
        path: &str,
        comment: Option<&CommentEntity>,
    ) -> Result<SessionEntity> {
        let id = Self::identity_for_path(path);
        let _guard = self.lock_identity(&id).await;
        let mut entity = self.require_entity(&id).await?;

        let messages = std::mem::take(&mut entity.messages);
        entity.messages = match comment.and_then(|c| self.normalizer.normalize(&RawMessage::from(c))) {
            Some(target) => {
                let (remaining, removed) = self.normalizer.remove_matching(messages, &target);
                debug!("Removed {} message(s) for comment {} from {}", removed, comment_key, id);
                remaining
            }
            None => {
                warn!(
                    "No source content for comment {} on {}; leaving messages untouched",
                    comment_key, id
                );
                self.normalizer.canonicalize(messages)
            }
        };

        entity.messages = self.uploads.resolve_message_images(entity.messages).await?;
        entity.updated_at = now_millis();
        self.update_entity(&entity).await
    }

    /// Point the session `identity_key` at `new_file` without touching its
    /// messages. The identity key itself never changes.
    pub async fn rename_entity(&self, identity_key: &str, new_file: &FileEntity) -> Result<SessionEntity> {
        self.queue.flush().await;

        let derived = self.derive_entity(new_file)?;
        let _guard = self.lock_identity(identity_key).await;
        let partial = json!({
            "url": derived.url,
            "title": derived.title,
            "pageTitle": derived.page_title,
            "pageDescription": derived.page_description,
            "tags": derived.tags,
            "updatedAt": now_millis(),
        });

        let stored = self
            .store
            .update(&self.config.collection, identity_key, partial)
            .await?;
        info!("Renamed session {} to {}", identity_key, derived.key);
        Ok(serde_json::from_value(stored)?)
    }

    /// Delete every session whose identity is `folder_path` or lies beneath it.
    /// Deletes run concurrently; failures are collected, not fatal.
    pub async fn delete_entities_by_folder(
        &self,
        folder_path: &str,
        all_entities: &[SessionEntity],
    ) -> FolderDeleteReport {
        self.queue.flush().await;

        let targets: Vec<&SessionEntity> = all_entities
            .iter()
            .filter(|entity| is_within_folder(&entity.key, folder_path))
            .collect();

        let results = join_all(targets.iter().map(|entity| async move {
            self.store
                .delete(&self.config.collection, &entity.key)
                .await
                .map_err(|e| format!("{}: {}", entity.key, e))
        }))
        .await;

        let mut report = FolderDeleteReport {
            total_found: targets.len(),
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(()) => report.deleted_count += 1,
                Err(e) => {
                    warn!("Cascading delete failed for {}", e);
                    report.errors.push(e);
                }
            }
        }
        report.success = report.errors.is_empty();

        info!(
            "Deleted {}/{} sessions under {}",
            report.deleted_count, report.total_found, folder_path
        );
        report
    }

    /// Rebuild file and comment projections from every stored session.
    pub async fn load_reverse(&self) -> Result<ReverseProjection> {
        let entities = self.list_entities().await?;

        let mut projection = ReverseProjection::default();
        for entity in entities {
            let path = entity
                .page_description
                .strip_prefix(DESCRIPTION_PREFIX)
                .filter(|p| !p.is_empty())
                .unwrap_or(&entity.key)
                .to_string();

            let messages = self.normalizer.canonicalize(entity.messages);
            for (index, message) in messages.into_iter().enumerate() {
                projection
                    .comments
                    .push(comment_from_message(&entity.key, index, message));
            }

            projection.files.push(FileEntity {
                name: name_from_path(&path),
                path,
                content: entity.page_content,
                created_at: Some(entity.created_at.into()),
                updated_at: Some(entity.updated_at.into()),
            });
        }

        info!(
            "Reverse-loaded {} files and {} comments",
            projection.files.len(),
            projection.comments.len()
        );
        Ok(projection)
    }

    /// Every stored session, up to the configured listing cap. Records
    /// without an identity key are skipped.
    pub async fn list_entities(&self) -> Result<Vec<SessionEntity>> {
        self.queue.flush().await;

        let page = self
            .store
            .query(&self.config.collection, json!({}), self.config.list_limit)
            .await?;
        Ok(page
            .list
            .into_iter()
            .filter_map(|document| self.parse_stored(document))
            .collect())
    }

    fn parse_stored(&self, document: Value) -> Option<SessionEntity> {
        let has_key = document
            .get("key")
            .and_then(Value::as_str)
            .is_some_and(|key| !key.is_empty());
        if !has_key {
            warn!("Skipping stored session without identity key");
            return None;
        }

        match serde_json::from_value::<SessionEntity>(document) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!("Skipping malformed stored session: {}", e);
                None
            }
        }
    }

    /// Exclusive access to `id` for one read-modify-write cycle. Entries
    /// nobody holds or waits on are pruned on the way in.
    async fn lock_identity(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.identity_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn require_entity(&self, id: &str) -> Result<SessionEntity> {
        self.reads.get_by_identity(id).await.ok_or_else(|| {
            SyncError::NotFound(format!("no session for {}, sync the file first", id))
        })
    }

    async fn create_entity(&self, entity: &SessionEntity) -> Result<SessionEntity> {
        let stored = self
            .store
            .create(&self.config.collection, serde_json::to_value(entity)?)
            .await?;
        debug!("Created session {}", entity.key);
        Ok(serde_json::from_value(stored)?)
    }

    async fn update_entity(&self, entity: &SessionEntity) -> Result<SessionEntity> {
        let stored = self
            .store
            .update(&self.config.collection, &entity.key, serde_json::to_value(entity)?)
            .await?;
        debug!("Updated session {}", entity.key);
        Ok(serde_json::from_value(stored)?)
    }

    fn new_url(&self) -> String {
        format!("{}{}", self.config.url_prefix, uuid::Uuid::new_v4())
    }
}

fn comment_from_message(session_key: &str, index: usize, message: MessageRecord) -> CommentEntity {
    CommentEntity {
        key: format!("{}#{}", session_key, index),
        file_key: session_key.to_string(),
        text: message.message,
        kind: Some(message.kind.as_str().to_string()),
        role: None,
        author: Some(message.kind.as_str().to_string()),
        timestamp: Some(message.timestamp.into()),
        image_data_url: message
            .image_data_url
            .or_else(|| message.image_data_urls.into_iter().next()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{png_data_url, sample_session, CountingUploader, InMemoryStore};
    use crate::types::MessageKind;

    struct Harness {
        engine: SyncEngine,
        store: Arc<InMemoryStore>,
        uploader: Arc<CountingUploader>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let uploader = Arc::new(CountingUploader::new());
        let engine = SyncEngine::new(SyncConfig::default(), store.clone(), uploader.clone());
        Harness {
            engine,
            store,
            uploader,
        }
    }

    fn comment(text: &str, ts: i64) -> CommentEntity {
        CommentEntity {
            key: format!("c-{}", ts),
            text: text.to_string(),
            author: Some("me".to_string()),
            timestamp: Some(ts.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sync_file_derives_tags_and_title() {
        let h = harness();
        let file = FileEntity::new("a/b/c.txt", "body");

        let outcome = h.engine.sync_file_to_entity(&file, true, false).await.unwrap();
        let entity = outcome.entity().unwrap();

        assert_eq!(entity.key, "a/b/c.txt");
        assert_eq!(entity.tags, vec!["a", "b"]);
        assert_eq!(entity.title, "c.txt");
        assert_eq!(entity.page_title, "c.txt");
        assert_eq!(entity.page_description, "Source: a/b/c.txt");
        assert!(entity.url.starts_with("session://"));
        assert_eq!(h.store.create_count(), 1);
    }

    #[tokio::test]
    async fn test_sync_file_rejects_empty_path() {
        let h = harness();
        let file = FileEntity::new("//", "");

        let err = h.engine.sync_file_to_entity(&file, true, false).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_immediate_sync_updates_and_keeps_messages() {
        let h = harness();
        let mut stored = sample_session("notes/todo.md");
        stored.messages = vec![MessageRecord::text(MessageKind::User, "keep me", 10)];
        stored.is_favorite = true;
        h.store.insert("sessions", stored.clone());

        let file = FileEntity::new("notes/todo.md", "new content");
        let outcome = h.engine.sync_file_to_entity(&file, true, false).await.unwrap();
        let entity = outcome.entity().unwrap();

        assert_eq!(h.store.update_count(), 1);
        assert_eq!(entity.page_content, "new content");
        assert_eq!(entity.messages, stored.messages);
        assert_eq!(entity.url, stored.url);
        assert!(entity.is_favorite);
        assert_eq!(entity.created_at, stored.created_at);
    }

    #[tokio::test]
    async fn test_unchanged_sync_skips_write_unless_forced() {
        let h = harness();
        let mut file = FileEntity::new("x/y.md", "same");
        file.created_at = Some(5000.into());
        file.updated_at = Some(6000.into());

        h.engine.sync_file_to_entity(&file, true, false).await.unwrap();
        h.engine.sync_file_to_entity(&file, true, false).await.unwrap();
        assert_eq!(h.store.update_count(), 0);

        h.engine.sync_file_to_entity(&file, true, true).await.unwrap();
        assert_eq!(h.store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_sync_without_timestamps_skips_write() {
        let h = harness();
        let file = FileEntity::new("x/plain.md", "same");

        h.engine.sync_file_to_entity(&file, true, false).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        h.engine.sync_file_to_entity(&file, true, false).await.unwrap();
        assert_eq!(h.store.update_count(), 0);

        h.engine.sync_file_to_entity(&file, true, true).await.unwrap();
        assert_eq!(h.store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_deferred_sync_is_queued() {
        let h = harness();
        let file = FileEntity::new("q/file.md", "");

        let outcome = h.engine.sync_file_to_entity(&file, false, false).await.unwrap();
        assert_eq!(outcome, SyncOutcome::queued("q/file.md"));
        assert_eq!(h.engine.pending_writes().await, 1);
        assert_eq!(h.store.create_count(), 0);

        let report = h.engine.flush().await;
        assert_eq!(report.created, 1);
        assert!(h.store.get("sessions", "q/file.md").is_some());
    }

    #[tokio::test]
    async fn test_comment_without_session_is_not_found() {
        let h = harness();
        let err = h
            .engine
            .sync_comment_to_message(&comment("hi", 1000), "missing/file.md", true)
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().contains("sync the file first"));
        assert!(h.store.is_empty("sessions"));
    }

    #[tokio::test]
    async fn test_comment_upsert_replaces_within_window() {
        let h = harness();
        h.store.insert("sessions", sample_session("a.md"));

        h.engine
            .sync_comment_to_message(&comment("Hello", 1000), "a.md", true)
            .await
            .unwrap();
        let outcome = h
            .engine
            .sync_comment_to_message(&comment("Hello", 3000), "a.md", true)
            .await
            .unwrap();

        let messages = &outcome.entity().unwrap().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].timestamp, 3000);
        assert_eq!(messages[0].kind, MessageKind::User);
    }

    #[tokio::test]
    async fn test_resyncing_image_only_comment_keeps_one_message() {
        let h = harness();
        h.store.insert("sessions", sample_session("a.md"));

        let mut shot = comment("", 1000);
        shot.image_data_url = Some(png_data_url(b"pixels"));
        h.engine.sync_comment_to_message(&shot, "a.md", true).await.unwrap();
        h.engine.sync_comment_to_message(&shot, "a.md", true).await.unwrap();

        let stored = h.store.session("sessions", "a.md").unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert!(stored.messages[0]
            .image_data_url
            .as_deref()
            .unwrap()
            .starts_with("https://cdn.test/images/"));
        assert_eq!(h.uploader.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_identity_locks_are_pruned() {
        let h = harness();
        h.store.insert("sessions", sample_session("a.md"));
        h.store.insert("sessions", sample_session("b.md"));

        h.engine
            .sync_comment_to_message(&comment("one", 1000), "a.md", true)
            .await
            .unwrap();
        h.engine
            .sync_comment_to_message(&comment("two", 1000), "b.md", true)
            .await
            .unwrap();

        let locks = h.engine.identity_locks.lock().await;
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key("b.md"));
    }

    #[tokio::test]
    async fn test_comment_images_are_uploaded_before_write() {
        let h = harness();
        h.store.insert("sessions", sample_session("a.md"));

        let mut with_image = comment("see screenshot", 1000);
        with_image.image_data_url = Some(png_data_url(b"pixels"));
        h.engine
            .sync_comment_to_message(&with_image, "a.md", true)
            .await
            .unwrap();

        let stored = h.store.session("sessions", "a.md").unwrap();
        let url = stored.messages[0].image_data_url.clone().unwrap();
        assert!(url.starts_with("https://cdn.test/images/"));
        assert_eq!(h.uploader.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_comment_upload_failure_propagates() {
        let h = harness();
        h.store.insert("sessions", sample_session("a.md"));
        h.uploader.fail_uploads(true);

        let mut with_image = comment("broken", 1000);
        with_image.image_data_url = Some(png_data_url(b"pixels"));
        let err = h
            .engine
            .sync_comment_to_message(&with_image, "a.md", true)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Upload(_)));
        assert_eq!(h.store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_comment_message() {
        let h = harness();
        let mut stored = sample_session("a.md");
        stored.messages = vec![
            MessageRecord::text(MessageKind::User, "first", 1000),
            MessageRecord::text(MessageKind::Pet, "second", 9000),
        ];
        h.store.insert("sessions", stored);

        let entity = h
            .engine
            .delete_comment_message("c-1", "a.md", Some(&comment("first", 2000)))
            .await
            .unwrap();

        assert_eq!(entity.messages.len(), 1);
        assert_eq!(entity.messages[0].message, "second");
    }

    #[tokio::test]
    async fn test_delete_comment_without_source_removes_nothing() {
        let h = harness();
        let mut stored = sample_session("a.md");
        stored.messages = vec![MessageRecord::text(MessageKind::User, "first", 1000)];
        h.store.insert("sessions", stored);

        let entity = h.engine.delete_comment_message("c-1", "a.md", None).await.unwrap();
        assert_eq!(entity.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_rename_preserves_identity_and_messages() {
        let h = harness();
        let mut stored = sample_session("old/name.md");
        stored.messages = vec![
            MessageRecord::text(MessageKind::User, "one", 1000),
            MessageRecord::text(MessageKind::Pet, "two", 9000),
        ];
        h.store.insert("sessions", stored.clone());

        let renamed = h
            .engine
            .rename_entity("old/name.md", &FileEntity::new("new/dir/renamed.md", ""))
            .await
            .unwrap();

        assert_eq!(renamed.key, "old/name.md");
        assert_eq!(renamed.messages, stored.messages);
        assert_eq!(renamed.title, "renamed.md");
        assert_eq!(renamed.tags, vec!["new", "dir"]);
        assert_eq!(renamed.page_description, "Source: new/dir/renamed.md");
        assert_ne!(renamed.url, stored.url);
        assert_eq!(renamed.created_at, stored.created_at);
    }

    #[tokio::test]
    async fn test_rename_unknown_identity_fails() {
        let h = harness();
        let result = h
            .engine
            .rename_entity("ghost.md", &FileEntity::new("other.md", ""))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_by_folder_matches_identity_prefix() {
        let h = harness();
        let sessions: Vec<SessionEntity> = ["docs", "docs/new.md", "docs2/x.md"]
            .into_iter()
            .map(sample_session)
            .collect();
        for session in &sessions {
            h.store.insert("sessions", session.clone());
        }

        let report = h.engine.delete_entities_by_folder("docs", &sessions).await;

        assert!(report.success);
        assert_eq!(report.total_found, 2);
        assert_eq!(report.deleted_count, 2);
        assert!(h.store.get("sessions", "docs2/x.md").is_some());
        assert!(h.store.get("sessions", "docs/new.md").is_none());
    }

    #[tokio::test]
    async fn test_delete_by_folder_collects_errors() {
        let h = harness();
        let sessions: Vec<SessionEntity> = ["f/a.md", "f/b.md", "f/c.md"]
            .into_iter()
            .map(sample_session)
            .collect();
        for session in &sessions {
            h.store.insert("sessions", session.clone());
        }
        h.store.fail_deletes_for("f/b.md");

        let report = h.engine.delete_entities_by_folder("f", &sessions).await;

        assert!(!report.success);
        assert_eq!(report.total_found, 3);
        assert_eq!(report.deleted_count, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("f/b.md"));
    }

    #[tokio::test]
    async fn test_load_reverse_projects_files_and_comments() {
        let h = harness();
        let mut stored = sample_session("a/b.md");
        stored.page_content = "content".to_string();
        stored.messages = vec![
            MessageRecord::text(MessageKind::Pet, "reply", 9000),
            MessageRecord::text(MessageKind::User, "question", 1000),
        ];
        h.store.insert("sessions", stored);
        h.store.insert_raw("sessions", "broken", json!({ "title": "no key" }));

        let projection = h.engine.load_reverse().await.unwrap();

        assert_eq!(projection.files.len(), 1);
        let file = &projection.files[0];
        assert_eq!(file.path, "a/b.md");
        assert_eq!(file.name, "b.md");
        assert_eq!(file.content, "content");

        assert_eq!(projection.comments.len(), 2);
        assert_eq!(projection.comments[0].text, "question");
        assert_eq!(projection.comments[0].file_key, "a/b.md");
        assert_eq!(projection.comments[1].author.as_deref(), Some("pet"));
    }
}
