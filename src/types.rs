//! Entity shapes for both sides of the sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A loosely-typed instant as it arrives from either domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    /// Epoch milliseconds
    Millis(i64),
    /// Fractional epoch milliseconds
    Float(f64),
    /// A date/time string or a numeric string
    Text(String),
}

impl From<i64> for TimeValue {
    fn from(ms: i64) -> Self {
        Self::Millis(ms)
    }
}

impl From<&str> for TimeValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<DateTime<Utc>> for TimeValue {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::Millis(dt.timestamp_millis())
    }
}

/// A file in the hierarchical domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntity {
    /// Slash-delimited path, unique within the file domain
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<TimeValue>,
    #[serde(default)]
    pub updated_at: Option<TimeValue>,
}

impl FileEntity {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let name = crate::sync::path_tags::name_from_path(&path);
        Self {
            path,
            name,
            content: content.into(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// A review comment attached to a file.
///
/// Author information arrives through any of `kind`, `role` or `author`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEntity {
    #[serde(default)]
    pub key: String,
    /// Identity of the owning file's mirrored session
    #[serde(default)]
    pub file_key: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub timestamp: Option<TimeValue>,
    #[serde(default)]
    pub image_data_url: Option<String>,
}

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Pet,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::User => "user",
            MessageKind::Pet => "pet",
        }
    }

    /// Resolve a type/role/author alias. Unknown aliases yield `None`.
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias.trim().to_lowercase().as_str() {
            "user" | "me" => Some(MessageKind::User),
            "assistant" | "bot" | "ai" | "pet" => Some(MessageKind::Pet),
            _ => None,
        }
    }
}

/// A canonical message inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub message: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_data_urls: Vec<String>,
}

impl MessageRecord {
    pub fn text(kind: MessageKind, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp,
            image_data_url: None,
            image_data_urls: Vec::new(),
        }
    }

    pub fn has_images(&self) -> bool {
        self.image_data_url.is_some() || !self.image_data_urls.is_empty()
    }
}

/// Any message- or comment-shaped input, with every alias optional.
///
/// Alias resolution order: type, then role, then author for the kind;
/// message, then content, then text for the body; timestamp, then
/// createdTime, then createdAt for the instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<TimeValue>,
    #[serde(default)]
    pub created_time: Option<TimeValue>,
    #[serde(default)]
    pub created_at: Option<TimeValue>,
    #[serde(default)]
    pub image_data_url: Option<String>,
    #[serde(default)]
    pub image_data_urls: Option<Vec<String>>,
}

impl From<MessageRecord> for RawMessage {
    fn from(record: MessageRecord) -> Self {
        Self {
            kind: Some(record.kind.as_str().to_string()),
            message: Some(record.message),
            timestamp: Some(TimeValue::Millis(record.timestamp)),
            image_data_url: record.image_data_url,
            image_data_urls: Some(record.image_data_urls),
            ..Default::default()
        }
    }
}

impl From<&CommentEntity> for RawMessage {
    fn from(comment: &CommentEntity) -> Self {
        Self {
            kind: comment.kind.clone(),
            role: comment.role.clone(),
            author: comment.author.clone(),
            text: Some(comment.text.clone()),
            timestamp: comment.timestamp.clone(),
            image_data_url: comment.image_data_url.clone(),
            ..Default::default()
        }
    }
}

/// The session-domain mirror of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntity {
    /// Identity key; never changes once created
    pub key: String,
    pub url: String,
    pub title: String,
    pub page_title: String,
    /// Carries the canonical source path
    pub page_description: String,
    #[serde(default)]
    pub page_content: String,
    /// Directory segments of the source path, root first
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_access_time: i64,
}

impl SessionEntity {
    /// True when both carry the same path-derived fields and content.
    pub fn same_derived_state(&self, other: &SessionEntity) -> bool {
        self.title == other.title
            && self.page_title == other.page_title
            && self.page_description == other.page_description
            && self.page_content == other.page_content
            && self.tags == other.tags
    }
}

/// Result of a file or comment sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SyncOutcome {
    /// The entity was written (or already up to date) on the immediate path
    Written(SessionEntity),
    /// The entity was handed to the write queue
    Queued { queued: bool, id: String },
}

impl SyncOutcome {
    pub fn queued(id: impl Into<String>) -> Self {
        Self::Queued {
            queued: true,
            id: id.into(),
        }
    }

    pub fn entity(&self) -> Option<&SessionEntity> {
        match self {
            SyncOutcome::Written(entity) => Some(entity),
            SyncOutcome::Queued { .. } => None,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, SyncOutcome::Queued { .. })
    }
}

/// Summary of a cascading folder delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDeleteReport {
    pub success: bool,
    pub deleted_count: usize,
    pub total_found: usize,
    pub errors: Vec<String>,
}

/// File and comment projections rebuilt from stored sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReverseProjection {
    pub files: Vec<FileEntity>,
    pub comments: Vec<CommentEntity>,
}
