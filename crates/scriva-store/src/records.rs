//! Record store interface and in-memory implementation.
//!
//! The pipeline treats persistence as a synchronous key-value-like
//! collaborator with no transactional guarantees across calls. Partial
//! updates use patch structs where `None` leaves a field unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use scriva_core::{
    Attachment, Error, ParentRecord, Result, SummarizationStatus, TranscriptionStatus,
};

/// Partial update for an attachment. `None` fields are left unchanged;
/// the double-`Option` fields distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default)]
pub struct AttachmentPatch {
    pub transcription_status: Option<TranscriptionStatus>,
    pub transcription_text: Option<Option<String>>,
    pub retry_count: Option<i32>,
    pub last_attempt_at: Option<Option<DateTime<Utc>>>,
    pub error_message: Option<Option<String>>,
}

impl AttachmentPatch {
    pub fn status(status: TranscriptionStatus) -> Self {
        Self {
            transcription_status: Some(status),
            ..Default::default()
        }
    }
}

/// Partial update for a parent record.
#[derive(Debug, Clone, Default)]
pub struct ParentPatch {
    pub summarization_status: Option<SummarizationStatus>,
    pub summary_dispatched: Option<bool>,
}

/// CRUD interface over attachments and parent records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_attachment(&self, id: Uuid) -> Result<Attachment>;

    async fn insert_attachment(&self, attachment: Attachment) -> Result<()>;

    async fn update_attachment(&self, id: Uuid, patch: AttachmentPatch) -> Result<()>;

    async fn delete_attachment(&self, id: Uuid) -> Result<()>;

    /// All attachments belonging to one parent, in creation order.
    async fn attachments_for_parent(&self, parent_id: Uuid) -> Result<Vec<Attachment>>;

    async fn get_parent(&self, id: Uuid) -> Result<ParentRecord>;

    async fn insert_parent(&self, parent: ParentRecord) -> Result<()>;

    async fn update_parent(&self, id: Uuid, patch: ParentPatch) -> Result<()>;

    /// Append a formatted transcript block to the parent's aggregate text.
    ///
    /// Implementations must perform the append under their internal write
    /// lock so the aggregate field only ever grows; callers additionally
    /// serialize per-parent, so appends never overwrite each other.
    async fn append_transcript(&self, parent_id: Uuid, block: &str) -> Result<()>;
}

/// In-memory record store over `tokio::sync::RwLock`ed maps.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    attachments: HashMap<Uuid, Attachment>,
    parents: HashMap<Uuid, ParentRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_attachment(&self, id: Uuid) -> Result<Attachment> {
        let inner = self.inner.read().await;
        inner
            .attachments
            .get(&id)
            .cloned()
            .ok_or(Error::AttachmentNotFound(id))
    }

    async fn insert_attachment(&self, attachment: Attachment) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.attachments.insert(attachment.id, attachment);
        Ok(())
    }

    async fn update_attachment(&self, id: Uuid, patch: AttachmentPatch) -> Result<()> {
        let mut inner = self.inner.write().await;
        let att = inner
            .attachments
            .get_mut(&id)
            .ok_or(Error::AttachmentNotFound(id))?;

        if let Some(status) = patch.transcription_status {
            att.transcription_status = status;
        }
        if let Some(text) = patch.transcription_text {
            att.transcription_text = text;
        }
        if let Some(count) = patch.retry_count {
            att.retry_count = count;
        }
        if let Some(at) = patch.last_attempt_at {
            att.last_attempt_at = at;
        }
        if let Some(msg) = patch.error_message {
            att.error_message = msg;
        }
        Ok(())
    }

    async fn delete_attachment(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .attachments
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::AttachmentNotFound(id))
    }

    async fn attachments_for_parent(&self, parent_id: Uuid) -> Result<Vec<Attachment>> {
        let inner = self.inner.read().await;
        let mut atts: Vec<Attachment> = inner
            .attachments
            .values()
            .filter(|a| a.parent_id == parent_id)
            .cloned()
            .collect();
        atts.sort_by_key(|a| a.created_at);
        Ok(atts)
    }

    async fn get_parent(&self, id: Uuid) -> Result<ParentRecord> {
        let inner = self.inner.read().await;
        inner
            .parents
            .get(&id)
            .cloned()
            .ok_or(Error::ParentNotFound(id))
    }

    async fn insert_parent(&self, parent: ParentRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.parents.insert(parent.id, parent);
        Ok(())
    }

    async fn update_parent(&self, id: Uuid, patch: ParentPatch) -> Result<()> {
        let mut inner = self.inner.write().await;
        let parent = inner.parents.get_mut(&id).ok_or(Error::ParentNotFound(id))?;

        if let Some(status) = patch.summarization_status {
            parent.summarization_status = status;
        }
        if let Some(dispatched) = patch.summary_dispatched {
            parent.summary_dispatched = dispatched;
        }
        Ok(())
    }

    async fn append_transcript(&self, parent_id: Uuid, block: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let parent = inner
            .parents
            .get_mut(&parent_id)
            .ok_or(Error::ParentNotFound(parent_id))?;
        parent.aggregate_text.push_str(block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriva_core::ParentKind;

    fn test_attachment(parent_id: Uuid) -> Attachment {
        Attachment::new(parent_id, "call.mp3", "audio/mpeg", 2048, "blobs/aa/call")
    }

    #[tokio::test]
    async fn test_attachment_roundtrip() {
        let store = MemoryRecordStore::new();
        let att = test_attachment(Uuid::new_v4());
        let id = att.id;

        store.insert_attachment(att).await.unwrap();
        let fetched = store.get_attachment(id).await.unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.file_name, "call.mp3");
    }

    #[tokio::test]
    async fn test_get_missing_attachment() {
        let store = MemoryRecordStore::new();
        let err = store.get_attachment(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::AttachmentNotFound(_)));
    }

    #[tokio::test]
    async fn test_patch_updates_only_given_fields() {
        let store = MemoryRecordStore::new();
        let att = test_attachment(Uuid::new_v4());
        let id = att.id;
        store.insert_attachment(att).await.unwrap();

        store
            .update_attachment(id, AttachmentPatch::status(TranscriptionStatus::InProgress))
            .await
            .unwrap();

        let fetched = store.get_attachment(id).await.unwrap();
        assert_eq!(fetched.transcription_status, TranscriptionStatus::InProgress);
        // Untouched fields survive
        assert_eq!(fetched.retry_count, 0);
        assert!(fetched.transcription_text.is_none());
    }

    #[tokio::test]
    async fn test_patch_can_clear_error_message() {
        let store = MemoryRecordStore::new();
        let att = test_attachment(Uuid::new_v4());
        let id = att.id;
        store.insert_attachment(att).await.unwrap();

        store
            .update_attachment(
                id,
                AttachmentPatch {
                    error_message: Some(Some("boom".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            store.get_attachment(id).await.unwrap().error_message.as_deref(),
            Some("boom")
        );

        store
            .update_attachment(
                id,
                AttachmentPatch {
                    error_message: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(store.get_attachment(id).await.unwrap().error_message.is_none());
    }

    #[tokio::test]
    async fn test_attachments_for_parent_filters_and_orders() {
        let store = MemoryRecordStore::new();
        let parent_a = Uuid::new_v4();
        let parent_b = Uuid::new_v4();

        let first = test_attachment(parent_a);
        let mut second = test_attachment(parent_a);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let other = test_attachment(parent_b);

        let (first_id, second_id) = (first.id, second.id);
        store.insert_attachment(second).await.unwrap();
        store.insert_attachment(first).await.unwrap();
        store.insert_attachment(other).await.unwrap();

        let atts = store.attachments_for_parent(parent_a).await.unwrap();
        assert_eq!(atts.len(), 2);
        assert_eq!(atts[0].id, first_id);
        assert_eq!(atts[1].id, second_id);
    }

    #[tokio::test]
    async fn test_attachments_for_unknown_parent_is_empty() {
        let store = MemoryRecordStore::new();
        let atts = store.attachments_for_parent(Uuid::new_v4()).await.unwrap();
        assert!(atts.is_empty());
    }

    #[tokio::test]
    async fn test_delete_attachment() {
        let store = MemoryRecordStore::new();
        let att = test_attachment(Uuid::new_v4());
        let id = att.id;
        store.insert_attachment(att).await.unwrap();

        store.delete_attachment(id).await.unwrap();
        assert!(store.get_attachment(id).await.is_err());
        assert!(store.delete_attachment(id).await.is_err());
    }

    #[tokio::test]
    async fn test_append_transcript_only_grows() {
        let store = MemoryRecordStore::new();
        let parent = ParentRecord::new(ParentKind::Meeting, "Sync");
        let id = parent.id;
        store.insert_parent(parent).await.unwrap();

        store.append_transcript(id, "first").await.unwrap();
        store.append_transcript(id, " second").await.unwrap();

        let fetched = store.get_parent(id).await.unwrap();
        assert_eq!(fetched.aggregate_text, "first second");
    }

    #[tokio::test]
    async fn test_append_transcript_missing_parent() {
        let store = MemoryRecordStore::new();
        let err = store
            .append_transcript(Uuid::new_v4(), "block")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ParentNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_parent_guard_fields() {
        let store = MemoryRecordStore::new();
        let parent = ParentRecord::new(ParentKind::Research, "Study");
        let id = parent.id;
        store.insert_parent(parent).await.unwrap();

        store
            .update_parent(
                id,
                ParentPatch {
                    summarization_status: Some(SummarizationStatus::InProgress),
                    summary_dispatched: Some(true),
                },
            )
            .await
            .unwrap();

        let fetched = store.get_parent(id).await.unwrap();
        assert_eq!(fetched.summarization_status, SummarizationStatus::InProgress);
        assert!(fetched.summary_dispatched);
    }
}
