//! Completion-event envelope and wire format.
//!
//! One event is produced per completion trigger. The key is
//! `"{kind}-{id}"`, so all events for the same parent route to the same
//! partition and a single consumer observes `completed` and subsequent
//! `updated` events in order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use scriva_core::{defaults, ParentKind, ParentRecord, Result, StatusSummary};

/// Action tag carried by a completion event.
///
/// `Completed` on the first dispatch for a parent; `Updated` when a
/// previously-dispatched parent transitions again (e.g. after a manual
/// retry completes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionAction {
    Completed,
    Updated,
}

impl CompletionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionAction::Completed => "completed",
            CompletionAction::Updated => "updated",
        }
    }
}

/// The event published when all of a parent's attachments are terminal
/// and at least one transcription succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ParentKind,
    pub status: String,
    pub action: CompletionAction,
    /// Snapshot of the parent fields relevant to the summarizer.
    pub data: JsonValue,
    /// String-valued metadata, also carried as message headers.
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl CompletionEvent {
    /// Build the event for one parent from its current state.
    pub fn for_parent(parent: &ParentRecord, summary: &StatusSummary) -> Self {
        let action = if parent.summary_dispatched {
            CompletionAction::Updated
        } else {
            CompletionAction::Completed
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "attachment-count".to_string(),
            summary.total.to_string(),
        );
        metadata.insert(
            "transcribed-count".to_string(),
            summary.completed.to_string(),
        );
        metadata.insert("failed-count".to_string(), summary.failed.to_string());
        metadata.insert(
            "linked-record-count".to_string(),
            parent.linked_record_count.to_string(),
        );
        metadata.insert(
            "has-transcript".to_string(),
            (!parent.aggregate_text.is_empty()).to_string(),
        );

        Self {
            id: parent.id,
            kind: parent.kind,
            status: "ready_for_summarization".to_string(),
            action,
            data: serde_json::json!({
                "title": parent.title,
                "aggregate_text": parent.aggregate_text,
                "summarization_status": parent.summarization_status,
            }),
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Partitioning key: all events for one parent share a key.
    pub fn key(&self) -> String {
        format!("{}-{}", self.kind, self.id)
    }

    /// Topic for this event's parent kind.
    pub fn topic(&self) -> &'static str {
        self.kind.topic()
    }

    /// Message headers: `event-type`, `source`, `entity-type`, plus the
    /// string-valued metadata entries.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            (
                "event-type".to_string(),
                format!("summarization.{}", self.action.as_str()),
            ),
            ("source".to_string(), defaults::EVENT_SOURCE.to_string()),
            ("entity-type".to_string(), self.kind.as_str().to_string()),
        ];
        for (k, v) in &self.metadata {
            headers.push((k.clone(), v.clone()));
        }
        headers
    }

    /// Serialize the event body to JSON bytes.
    pub fn payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
