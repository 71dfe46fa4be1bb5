//! Domain models for the transcription pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;

/// Lifecycle status of one attachment's transcription.
///
/// Transition graph: `Pending → InProgress → {Completed | Pending | Failed}`.
/// `Completed` and `Failed` are terminal; `Failed → Pending` is reachable
/// only via an explicit manual retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TranscriptionStatus {
    /// Whether no further automatic transition occurs from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TranscriptionStatus::Completed | TranscriptionStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptionStatus::Pending => "pending",
            TranscriptionStatus::InProgress => "in_progress",
            TranscriptionStatus::Completed => "completed",
            TranscriptionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TranscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Downstream summarization status of a parent record.
///
/// The pipeline only reads this as a re-entrancy guard; the summarizer
/// itself is an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarizationStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

/// The kind of business entity owning attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    Meeting,
    Research,
}

impl ParentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentKind::Meeting => "meeting",
            ParentKind::Research => "research",
        }
    }

    /// Broker topic receiving completion events for this kind.
    pub fn topic(&self) -> &'static str {
        match self {
            ParentKind::Meeting => defaults::TOPIC_MEETINGS,
            ParentKind::Research => defaults::TOPIC_RESEARCHES,
        }
    }
}

impl std::fmt::Display for ParentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded media file tracked through transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    /// Owning parent record (many attachments to one parent).
    pub parent_id: Uuid,
    pub file_name: String,
    pub size_bytes: i64,
    pub media_type: String,
    /// Reference into the blob storage backend.
    pub storage_ref: String,
    pub transcription_status: TranscriptionStatus,
    /// Set if and only if `transcription_status` is `Completed`.
    pub transcription_text: Option<String>,
    /// Number of failed attempts so far. Increases only on failure.
    pub retry_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Present only when failed or awaiting retry.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    /// Create a fresh attachment in `Pending` state, as at upload time.
    pub fn new(
        parent_id: Uuid,
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        size_bytes: i64,
        storage_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id,
            file_name: file_name.into(),
            size_bytes,
            media_type: media_type.into(),
            storage_ref: storage_ref.into(),
            transcription_status: TranscriptionStatus::Pending,
            transcription_text: None,
            retry_count: 0,
            last_attempt_at: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    /// Whether this attachment still has automatic retry budget left.
    pub fn has_retry_budget(&self, max_retries: i32) -> bool {
        self.retry_count < max_retries
    }
}

/// The business entity that owns attachments and accumulates transcripts.
///
/// Owned by an external collaborator; the pipeline only touches the
/// aggregate text (append-only), the summarization guard, and the
/// dispatch bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentRecord {
    pub id: Uuid,
    pub kind: ParentKind,
    pub title: String,
    /// Append target for formatted transcripts. Only ever grows.
    pub aggregate_text: String,
    pub summarization_status: SummarizationStatus,
    /// True once a completion event has been dispatched for this parent.
    /// Subsequent triggers carry the `updated` action instead of `completed`.
    pub summary_dispatched: bool,
    /// Count of linked auxiliary records, carried as event metadata.
    pub linked_record_count: i64,
    pub created_at: DateTime<Utc>,
}

impl ParentRecord {
    pub fn new(kind: ParentKind, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            aggregate_text: String::new(),
            summarization_status: SummarizationStatus::NotStarted,
            summary_dispatched: false,
            linked_record_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Per-status attachment counts for one parent record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusSummary {
    /// Tally statuses over a set of attachments.
    pub fn from_attachments<'a>(attachments: impl IntoIterator<Item = &'a Attachment>) -> Self {
        let mut summary = StatusSummary::default();
        for att in attachments {
            summary.total += 1;
            match att.transcription_status {
                TranscriptionStatus::Pending => summary.pending += 1,
                TranscriptionStatus::InProgress => summary.in_progress += 1,
                TranscriptionStatus::Completed => summary.completed += 1,
                TranscriptionStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

/// Status view of one attachment, as exposed to polling endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentStatusView {
    pub id: Uuid,
    pub status: TranscriptionStatus,
    pub transcription_text: Option<String>,
    pub retry_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<&Attachment> for AttachmentStatusView {
    fn from(att: &Attachment) -> Self {
        Self {
            id: att.id,
            status: att.transcription_status,
            transcription_text: att.transcription_text.clone(),
            retry_count: att.retry_count,
            last_attempt_at: att.last_attempt_at,
            error_message: att.error_message.clone(),
        }
    }
}

/// Format one successful transcript as an aggregate-text block.
///
/// Blocks are delimited so N appended transcripts yield N recognizable
/// sections, each naming its originating file.
pub fn format_transcript_block(file_name: &str, text: &str) -> String {
    format!("\n\n---\n\n**Transcription of {}**\n\n{}", file_name, text)
}
