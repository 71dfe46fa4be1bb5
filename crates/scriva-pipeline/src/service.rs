//! Service facade consumed by the transport layer.
//!
//! Wires the orchestrator, aggregator, and per-parent locks together and
//! exposes the small surface the outside world needs: upload, batch
//! trigger, manual retry, status polling, and health.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use scriva_core::{Attachment, AttachmentStatusView, Result, StatusSummary};
use scriva_dispatch::CompletionDispatcher;
use scriva_inference::TranscriptionBackend;
use scriva_store::{RecordStore, StorageBackend};

use crate::aggregator::CompletionAggregator;
use crate::locks::ParentLocks;
use crate::orchestrator::{Orchestrator, OrchestratorConfig};

/// Health of the service's external collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub transcription_backend_ok: bool,
    pub transcription_model: String,
}

/// Facade over the transcription pipeline.
pub struct TranscriptionService {
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn StorageBackend>,
    transcriber: Arc<dyn TranscriptionBackend>,
    orchestrator: Arc<Orchestrator>,
}

impl TranscriptionService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn StorageBackend>,
        transcriber: Arc<dyn TranscriptionBackend>,
        dispatcher: Arc<CompletionDispatcher>,
        config: OrchestratorConfig,
    ) -> Self {
        let locks = Arc::new(ParentLocks::new());
        let aggregator = Arc::new(CompletionAggregator::new(
            store.clone(),
            dispatcher,
            locks.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            storage.clone(),
            transcriber.clone(),
            aggregator,
            locks,
            config,
        ));
        Self {
            store,
            storage,
            transcriber,
            orchestrator,
        }
    }

    /// The underlying orchestrator, for callers needing synchronous
    /// batch processing.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Upload media bytes and register a pending attachment for a parent.
    pub async fn store_attachment(
        &self,
        parent_id: Uuid,
        file_name: &str,
        media_type: &str,
        data: &[u8],
    ) -> Result<Attachment> {
        let started = Instant::now();
        // Reject uploads against a parent that does not exist.
        self.store.get_parent(parent_id).await?;

        let reference = self.storage.upload(data, file_name).await?;
        let attachment = Attachment::new(
            parent_id,
            file_name,
            media_type,
            data.len() as i64,
            reference,
        );
        self.store.insert_attachment(attachment.clone()).await?;

        info!(
            attachment_id = %attachment.id,
            parent_id = %parent_id,
            size = data.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "attachment stored"
        );
        Ok(attachment)
    }

    /// Kick off transcription of every eligible attachment of a parent.
    /// Fire-and-forget: returns immediately, processing continues in the
    /// background.
    pub async fn start_batch(&self, parent_id: Uuid) -> Result<()> {
        // Fail fast on an unknown parent; everything after is async.
        self.store.get_parent(parent_id).await?;

        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.process_all_pending(parent_id).await {
                error!(parent_id = %parent_id, error = %e, "batch processing failed");
            }
        });
        Ok(())
    }

    /// Manually retry one attachment. `Ok(false)` when the attachment is
    /// not in a retryable state.
    pub async fn retry_one(&self, attachment_id: Uuid) -> Result<bool> {
        self.orchestrator.retry_one(attachment_id).await
    }

    /// Per-status counts for a parent's attachments.
    pub async fn get_summary(&self, parent_id: Uuid) -> Result<StatusSummary> {
        self.orchestrator.summarize(parent_id).await
    }

    /// Current polling view of one attachment.
    pub async fn get_attachment_status(&self, attachment_id: Uuid) -> Result<AttachmentStatusView> {
        let attachment = self.store.get_attachment(attachment_id).await?;
        Ok(AttachmentStatusView::from(&attachment))
    }

    /// Probe the transcription backend.
    pub async fn health(&self) -> HealthStatus {
        let ok = self.transcriber.health_check().await.unwrap_or(false);
        HealthStatus {
            transcription_backend_ok: ok,
            transcription_model: self.transcriber.model_name().to_string(),
        }
    }
}
