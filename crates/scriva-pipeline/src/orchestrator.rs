//! Per-attachment transcription orchestration.
//!
//! Drives one attachment through `pending → in_progress → {completed |
//! pending | failed}`. Every failure during fetch or transcription is
//! treated as retryable until the budget runs out; the retry delay grows
//! linearly with the attempt number (`delay = base_delay * retry_count`).
//! Retries are armed as fire-and-forget sleep tasks that re-check the
//! attachment still exists (and is still pending) when they wake, since a
//! timer cannot be revoked once armed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scriva_core::{
    defaults, format_transcript_block, Attachment, Error, Result, StatusSummary,
    TranscriptionStatus,
};
use scriva_inference::{TranscriptionBackend, TranscriptionResult};
use scriva_store::{AttachmentPatch, RecordStore, StorageBackend};

use crate::aggregator::CompletionAggregator;
use crate::locks::ParentLocks;

/// Tunables for the orchestrator's retry and batch behavior.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum transcription attempts per attachment.
    pub max_retries: i32,
    /// Base retry delay; the n-th retry waits `base_delay * n`.
    pub base_delay: Duration,
    /// Pause between attachments during sequential batch processing.
    pub item_pause: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRY_COUNT,
            base_delay: Duration::from_secs(defaults::BASE_RETRY_DELAY_SECS),
            item_pause: Duration::from_millis(defaults::BATCH_ITEM_PAUSE_MS),
        }
    }
}

impl OrchestratorConfig {
    /// Read overrides from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(max) = env_parse::<i32>(defaults::ENV_MAX_RETRY_COUNT) {
            config.max_retries = max;
        }
        if let Some(secs) = env_parse::<u64>(defaults::ENV_BASE_RETRY_DELAY_SECS) {
            config.base_delay = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>(defaults::ENV_BATCH_ITEM_PAUSE_MS) {
            config.item_pause = Duration::from_millis(ms);
        }
        config
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_item_pause(mut self, item_pause: Duration) -> Self {
        self.item_pause = item_pause;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Drives attachments through their transcription lifecycle.
///
/// Cheap to clone; retry tasks hold a clone.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn StorageBackend>,
    transcriber: Arc<dyn TranscriptionBackend>,
    aggregator: Arc<CompletionAggregator>,
    locks: Arc<ParentLocks>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn StorageBackend>,
        transcriber: Arc<dyn TranscriptionBackend>,
        aggregator: Arc<CompletionAggregator>,
        locks: Arc<ParentLocks>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            storage,
            transcriber,
            aggregator,
            locks,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one transcription attempt for an attachment.
    ///
    /// On success the transcript is stored, appended to the parent's
    /// aggregate text, and the completion aggregator is consulted. On
    /// failure the retry bookkeeping is updated and, if budget remains, a
    /// delayed re-invocation is armed. Errors from the attempt itself
    /// never escape; only a missing attachment or a persistence failure
    /// surfaces as `Err`.
    pub async fn process_one(&self, attachment_id: Uuid) -> Result<()> {
        let started = Instant::now();
        let attachment = self.store.get_attachment(attachment_id).await?;
        let parent_id = attachment.parent_id;

        self.store
            .update_attachment(
                attachment_id,
                AttachmentPatch {
                    transcription_status: Some(TranscriptionStatus::InProgress),
                    last_attempt_at: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )
            .await?;
        debug!(
            attachment_id = %attachment_id,
            parent_id = %parent_id,
            attempt = attachment.retry_count + 1,
            "transcription attempt started"
        );

        match self.attempt(&attachment).await {
            Ok(result) => {
                self.complete(&attachment, result, started).await?;
                self.aggregator.check_and_trigger(parent_id).await?;
                Ok(())
            }
            Err(cause) => self.handle_failure(&attachment, cause).await,
        }
    }

    /// Fetch the stored media and transcribe it.
    async fn attempt(&self, attachment: &Attachment) -> Result<TranscriptionResult> {
        let bytes = self.storage.fetch(&attachment.storage_ref).await?;
        self.transcriber
            .transcribe(&bytes, &attachment.media_type, None)
            .await
    }

    async fn complete(
        &self,
        attachment: &Attachment,
        result: TranscriptionResult,
        started: Instant,
    ) -> Result<()> {
        self.store
            .update_attachment(
                attachment.id,
                AttachmentPatch {
                    transcription_status: Some(TranscriptionStatus::Completed),
                    transcription_text: Some(Some(result.full_text.clone())),
                    error_message: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        let block = format_transcript_block(&attachment.file_name, &result.full_text);
        {
            let lock = self.locks.for_parent(attachment.parent_id);
            let _guard = lock.lock().await;
            self.store
                .append_transcript(attachment.parent_id, &block)
                .await?;
        }

        info!(
            attachment_id = %attachment.id,
            parent_id = %attachment.parent_id,
            duration_ms = started.elapsed().as_millis() as u64,
            text_len = result.full_text.len(),
            "transcription completed"
        );
        Ok(())
    }

    async fn handle_failure(&self, attachment: &Attachment, cause: Error) -> Result<()> {
        let retry_count = attachment.retry_count + 1;

        if retry_count < self.config.max_retries {
            let delay = self.config.base_delay * retry_count as u32;
            warn!(
                attachment_id = %attachment.id,
                retry_count,
                retry_delay_secs = delay.as_secs(),
                error = %cause,
                "transcription failed, retry scheduled"
            );
            self.store
                .update_attachment(
                    attachment.id,
                    AttachmentPatch {
                        transcription_status: Some(TranscriptionStatus::Pending),
                        retry_count: Some(retry_count),
                        error_message: Some(Some(cause.to_string())),
                        ..Default::default()
                    },
                )
                .await?;
            self.schedule_retry(attachment.id, delay);
        } else {
            error!(
                attachment_id = %attachment.id,
                parent_id = %attachment.parent_id,
                retry_count,
                error = %cause,
                "retry budget exhausted, attachment failed"
            );
            self.store
                .update_attachment(
                    attachment.id,
                    AttachmentPatch {
                        transcription_status: Some(TranscriptionStatus::Failed),
                        retry_count: Some(retry_count),
                        error_message: Some(Some(cause.to_string())),
                        ..Default::default()
                    },
                )
                .await?;
            // A terminal failure can be the last outstanding attachment.
            self.aggregator.check_and_trigger(attachment.parent_id).await?;
        }
        Ok(())
    }

    /// Arm a fire-and-forget delayed re-invocation.
    ///
    /// The timer cannot be revoked; on wake the task re-checks that the
    /// attachment still exists and is still pending, and aborts quietly
    /// otherwise (it may have been deleted, or a manual retry may have
    /// already rerun it).
    fn schedule_retry(&self, attachment_id: Uuid, delay: Duration) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            match orchestrator.store.get_attachment(attachment_id).await {
                Ok(att) if att.transcription_status == TranscriptionStatus::Pending => {
                    if let Err(e) = orchestrator.process_one(attachment_id).await {
                        if e.is_not_found() {
                            debug!(
                                attachment_id = %attachment_id,
                                "attachment vanished during retry, dropping"
                            );
                        } else {
                            error!(
                                attachment_id = %attachment_id,
                                error = %e,
                                "retry attempt failed"
                            );
                        }
                    }
                }
                Ok(att) => {
                    debug!(
                        attachment_id = %attachment_id,
                        status = %att.transcription_status,
                        "attachment no longer pending, retry dropped"
                    );
                }
                Err(e) if e.is_not_found() => {
                    debug!(
                        attachment_id = %attachment_id,
                        "attachment deleted before retry fired, dropping"
                    );
                }
                Err(e) => {
                    error!(
                        attachment_id = %attachment_id,
                        error = %e,
                        "retry existence check failed"
                    );
                }
            }
        });
    }

    /// Process every eligible attachment of a parent, strictly in
    /// sequence with a pause between items so the transcription backend
    /// is never saturated. Per-item errors are logged and never abort the
    /// batch. Returns the number of attachments selected.
    pub async fn process_all_pending(&self, parent_id: Uuid) -> Result<usize> {
        let attachments = self.store.attachments_for_parent(parent_id).await?;
        let eligible: Vec<Attachment> = attachments
            .into_iter()
            .filter(|att| match att.transcription_status {
                TranscriptionStatus::Pending => true,
                TranscriptionStatus::Failed => att.has_retry_budget(self.config.max_retries),
                _ => false,
            })
            .collect();

        let total = eligible.len();
        info!(parent_id = %parent_id, count = total, "processing pending attachments");

        for (index, att) in eligible.iter().enumerate() {
            if let Err(e) = self.process_one(att.id).await {
                warn!(
                    attachment_id = %att.id,
                    error = %e,
                    "attachment processing failed, continuing batch"
                );
            }
            if index + 1 < total {
                sleep(self.config.item_pause).await;
            }
        }
        Ok(total)
    }

    /// Manually retry one attachment.
    ///
    /// Only valid from `pending` or `failed`; resets the retry budget and
    /// reruns the attempt immediately. Returns `Ok(false)` without side
    /// effects when the attachment is in any other state.
    pub async fn retry_one(&self, attachment_id: Uuid) -> Result<bool> {
        let attachment = self.store.get_attachment(attachment_id).await?;
        if !matches!(
            attachment.transcription_status,
            TranscriptionStatus::Pending | TranscriptionStatus::Failed
        ) {
            debug!(
                attachment_id = %attachment_id,
                status = %attachment.transcription_status,
                "manual retry rejected"
            );
            return Ok(false);
        }

        info!(
            attachment_id = %attachment_id,
            previous_retries = attachment.retry_count,
            "manual retry, resetting budget"
        );
        self.store
            .update_attachment(
                attachment_id,
                AttachmentPatch {
                    transcription_status: Some(TranscriptionStatus::Pending),
                    retry_count: Some(0),
                    error_message: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        self.process_one(attachment_id).await?;
        Ok(true)
    }

    /// Per-status attachment counts for one parent. Pure read.
    pub async fn summarize(&self, parent_id: Uuid) -> Result<StatusSummary> {
        let attachments = self.store.attachments_for_parent(parent_id).await?;
        Ok(StatusSummary::from_attachments(&attachments))
    }
}
