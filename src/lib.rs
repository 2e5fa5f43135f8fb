//! Bidirectional synchronization between a file/comment tree and a
//! tag-scoped session/message store.
//!
//! Files map to sessions (directory segments become tags), comments map to
//! messages. Reads are coalesced per identity, inline images are uploaded
//! once per distinct payload, and deferred writes are batched behind a
//! single timer.
//!
//! ```ignore
//! use session_sync::{FileEntity, SyncConfig, SyncEngine};
//!
//! let engine = SyncEngine::new(SyncConfig::default(), store, uploader);
//! engine.sync_file_to_entity(&FileEntity::new("a/b/c.txt", ""), true, false).await?;
//! ```

pub mod config;
pub mod error;
pub mod store;
pub mod sync;
pub mod test_utils;
pub mod types;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use store::{ContentUploader, DocumentStore, QueryPage};
pub use sync::{DrainReport, SyncEngine};
pub use types::{
    CommentEntity, FileEntity, FolderDeleteReport, MessageKind, MessageRecord, RawMessage,
    ReverseProjection, SessionEntity, SyncOutcome, TimeValue,
};
