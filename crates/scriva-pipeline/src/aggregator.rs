//! Cross-attachment completion aggregation.
//!
//! After each attachment reaches a terminal status the orchestrator asks
//! the aggregator whether the owning parent is ready for downstream
//! summarization: every attachment terminal and at least one transcript
//! present. The decision and the dispatch that follows run under the
//! parent's lock, so two attachments finishing at the same instant cannot
//! both fire the initial completion event.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use scriva_core::{Result, StatusSummary, SummarizationStatus, TranscriptionStatus};
use scriva_dispatch::{CompletionDispatcher, CompletionEvent};
use scriva_store::{ParentPatch, RecordStore};

use crate::locks::ParentLocks;

/// Decides per parent whether a completion event is due and publishes it.
pub struct CompletionAggregator {
    store: Arc<dyn RecordStore>,
    dispatcher: Arc<CompletionDispatcher>,
    locks: Arc<ParentLocks>,
}

impl CompletionAggregator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        dispatcher: Arc<CompletionDispatcher>,
        locks: Arc<ParentLocks>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            locks,
        }
    }

    /// Check one parent and dispatch its completion event if due.
    ///
    /// Returns `Ok(true)` when the completion trigger fired (whether or
    /// not the broker accepted the event), `Ok(false)` on every skip path.
    /// Sequentially idempotent: once a parent has triggered, further calls
    /// skip on the summarization guard until the downstream summarizer
    /// moves the guard off `in_progress`.
    pub async fn check_and_trigger(&self, parent_id: Uuid) -> Result<bool> {
        let lock = self.locks.for_parent(parent_id);
        let _guard = lock.lock().await;

        let attachments = self.store.attachments_for_parent(parent_id).await?;
        if attachments.is_empty() {
            debug!(parent_id = %parent_id, "no attachments, nothing to aggregate");
            return Ok(false);
        }

        let summary = StatusSummary::from_attachments(&attachments);
        let outstanding = summary.pending + summary.in_progress;
        if outstanding > 0 {
            debug!(
                parent_id = %parent_id,
                outstanding,
                "attachments still in flight, completion deferred"
            );
            return Ok(false);
        }

        let any_successful = attachments.iter().any(|att| {
            att.transcription_status == TranscriptionStatus::Completed
                && att
                    .transcription_text
                    .as_deref()
                    .is_some_and(|text| !text.is_empty())
        });
        if !any_successful {
            info!(
                parent_id = %parent_id,
                failed = summary.failed,
                "every transcription failed, no completion event"
            );
            return Ok(false);
        }

        let parent = self.store.get_parent(parent_id).await?;
        if parent.summarization_status == SummarizationStatus::InProgress {
            debug!(
                parent_id = %parent_id,
                "summarization already in progress, skipping dispatch"
            );
            return Ok(false);
        }

        let event = CompletionEvent::for_parent(&parent, &summary);
        match self.dispatcher.publish(&event).await {
            Ok(true) => {
                info!(
                    parent_id = %parent_id,
                    parent_kind = %parent.kind,
                    action = event.action.as_str(),
                    "completion trigger fired"
                );
            }
            Ok(false) => {
                // Dispatcher already logged the skip (disabled/disconnected).
            }
            Err(e) => {
                // At-most-once: a failed publish never rolls back the
                // trigger decision. Recovery is a manual resend.
                warn!(
                    parent_id = %parent_id,
                    error = %e,
                    "completion event lost, continuing"
                );
            }
        }

        self.store
            .update_parent(
                parent_id,
                ParentPatch {
                    summarization_status: Some(SummarizationStatus::InProgress),
                    summary_dispatched: Some(true),
                },
            )
            .await?;

        Ok(true)
    }
}
