pub mod dedup;
pub mod engine;
pub mod messages;
pub mod path_tags;
pub mod timestamp;
pub mod upload_cache;
pub mod write_queue;

pub use dedup::RequestDeduplicator;
pub use engine::SyncEngine;
pub use messages::MessageNormalizer;
pub use path_tags::{name_from_path, tags_from_path};
pub use timestamp::normalize_timestamp;
pub use upload_cache::ContentAddressedUploadCache;
pub use write_queue::{CoalescingWriteQueue, DrainReport};
