//! Message normalization, deduplication and ordering.
//!
//! Comments and messages share no persisted identity. Two records are
//! treated as the same message when their text is equal and their
//! timestamps are closer than the dedup window. Distinct messages with the
//! same text inside the window therefore collapse into one.

use crate::sync::timestamp::normalize_first;
use crate::types::{MessageKind, MessageRecord, RawMessage};

/// Default dedup window in milliseconds
pub const DEFAULT_DEDUP_WINDOW_MS: i64 = 5000;

/// Canonicalizes raw message shapes into [`MessageRecord`]s.
#[derive(Debug, Clone, Copy)]
pub struct MessageNormalizer {
    dedup_window_ms: i64,
}

impl Default for MessageNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW_MS)
    }
}

impl MessageNormalizer {
    pub fn new(dedup_window_ms: i64) -> Self {
        Self { dedup_window_ms }
    }

    pub fn dedup_window_ms(&self) -> i64 {
        self.dedup_window_ms
    }

    /// Normalize one raw message. Records with neither text nor image are dropped.
    pub fn normalize(&self, raw: &RawMessage) -> Option<MessageRecord> {
        let kind = resolve_kind(raw);

        let message = [&raw.message, &raw.content, &raw.text]
            .into_iter()
            .flatten()
            .next()
            .map(|text| text.trim().to_string())
            .unwrap_or_default();

        let timestamp = normalize_first(&[
            raw.timestamp.as_ref(),
            raw.created_time.as_ref(),
            raw.created_at.as_ref(),
        ]);

        let image_data_url = raw
            .image_data_url
            .as_ref()
            .filter(|url| !url.trim().is_empty())
            .cloned();
        let image_data_urls: Vec<String> = raw
            .image_data_urls
            .iter()
            .flatten()
            .filter(|url| !url.trim().is_empty())
            .cloned()
            .collect();

        let record = MessageRecord {
            kind,
            message,
            timestamp,
            image_data_url,
            image_data_urls,
        };

        if record.message.is_empty() && !record.has_images() {
            return None;
        }
        Some(record)
    }

    /// Normalize, sort ascending by timestamp and drop duplicates.
    ///
    /// Idempotent: feeding the output back in yields the same list.
    pub fn normalize_list<'a, I>(&self, raw: I) -> Vec<MessageRecord>
    where
        I: IntoIterator<Item = &'a RawMessage>,
    {
        let records = raw.into_iter().filter_map(|r| self.normalize(r)).collect();
        self.canonicalize(records)
    }

    /// Sort and dedup already-normalized records. The earliest record of a
    /// duplicate group is kept.
    pub fn canonicalize(&self, mut records: Vec<MessageRecord>) -> Vec<MessageRecord> {
        records.retain(|r| !r.message.is_empty() || r.has_images());
        records.sort_by_key(|r| r.timestamp);

        let mut kept: Vec<MessageRecord> = Vec::with_capacity(records.len());
        for record in records {
            if !kept.iter().any(|existing| self.is_same_message(existing, &record)) {
                kept.push(record);
            }
        }
        kept
    }

    /// Replace the record matching `incoming`, or append it, then canonicalize.
    pub fn upsert_message(
        &self,
        mut list: Vec<MessageRecord>,
        incoming: MessageRecord,
    ) -> Vec<MessageRecord> {
        match list
            .iter()
            .position(|existing| self.is_same_message(existing, &incoming))
        {
            Some(index) => list[index] = incoming,
            None => list.push(incoming),
        }
        self.canonicalize(list)
    }

    /// Remove every record matching `target`. Returns the canonical remainder
    /// and how many records were removed.
    pub fn remove_matching(
        &self,
        list: Vec<MessageRecord>,
        target: &MessageRecord,
    ) -> (Vec<MessageRecord>, usize) {
        let before = list.len();
        let remaining: Vec<MessageRecord> = list
            .into_iter()
            .filter(|existing| !self.is_same_message(existing, target))
            .collect();
        let removed = before - remaining.len();
        (self.canonicalize(remaining), removed)
    }

    /// Equal text inside the dedup window. Image references take no part,
    /// so image-only records match on their empty text.
    pub fn is_same_message(&self, a: &MessageRecord, b: &MessageRecord) -> bool {
        a.message == b.message && (a.timestamp - b.timestamp).abs() < self.dedup_window_ms
    }
}

/// The explicit `type` wins when it names a known kind; an unknown value
/// (e.g. "system") falls through to `role` and then `author`.
fn resolve_kind(raw: &RawMessage) -> MessageKind {
    [&raw.kind, &raw.role, &raw.author]
        .into_iter()
        .flatten()
        .find_map(|alias| MessageKind::from_alias(alias))
        .unwrap_or(MessageKind::User)
}
