//! End-to-end pipeline scenarios over the in-memory record store, a
//! tempdir-backed blob store, a scripted transcription backend, and a
//! recording event sink.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::sleep;
use uuid::Uuid;

use scriva_core::{
    format_transcript_block, logging, ParentKind, ParentRecord, SummarizationStatus,
    TranscriptionStatus,
};
use scriva_dispatch::{CompletionDispatcher, MemorySink};
use scriva_inference::mock::{MockOutcome, MockTranscriptionBackend};
use scriva_pipeline::{
    CompletionAggregator, OrchestratorConfig, ParentLocks, TranscriptionService,
};
use scriva_store::{
    AttachmentPatch, FilesystemBackend, MemoryRecordStore, ParentPatch, RecordStore,
    StorageBackend,
};

struct Harness {
    service: TranscriptionService,
    store: MemoryRecordStore,
    sink: MemorySink,
    mock: MockTranscriptionBackend,
    _blobs: TempDir,
}

fn harness(mock: MockTranscriptionBackend, config: OrchestratorConfig) -> Harness {
    logging::init();
    let store = MemoryRecordStore::new();
    let blobs = TempDir::new().unwrap();
    let storage: Arc<dyn StorageBackend> = Arc::new(FilesystemBackend::new(blobs.path()));
    let sink = MemorySink::new();
    let dispatcher = Arc::new(CompletionDispatcher::with_sink(Arc::new(sink.clone())));
    let service = TranscriptionService::new(
        Arc::new(store.clone()),
        storage,
        Arc::new(mock.clone()),
        dispatcher,
        config,
    );
    Harness {
        service,
        store,
        sink,
        mock,
        _blobs: blobs,
    }
}

/// Short delays so exhausting the retry budget takes milliseconds.
fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_base_delay(Duration::from_millis(10))
        .with_item_pause(Duration::from_millis(1))
}

async fn seed_parent(store: &MemoryRecordStore, kind: ParentKind) -> Uuid {
    let parent = ParentRecord::new(kind, "Weekly sync");
    let id = parent.id;
    store.insert_parent(parent).await.unwrap();
    id
}

async fn upload(harness: &Harness, parent_id: Uuid, name: &str) -> Uuid {
    harness
        .service
        .store_attachment(parent_id, name, "audio/wav", b"RIFF....WAVEdata")
        .await
        .unwrap()
        .id
}

async fn wait_for_status(store: &MemoryRecordStore, id: Uuid, status: TranscriptionStatus) {
    for _ in 0..200 {
        if store.get_attachment(id).await.unwrap().transcription_status == status {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("attachment {} never reached {}", id, status);
}

async fn wait_for_sent(sink: &MemorySink, count: usize) {
    for _ in 0..200 {
        if sink.sent_count() >= count {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} dispatched events, saw {}", count, sink.sent_count());
}

// Scenario: three attachments, two transcribe, one exhausts its retries.
// Exactly one completion event fires, with the completed action.
#[tokio::test]
async fn test_mixed_outcomes_dispatch_exactly_once() {
    let mock = MockTranscriptionBackend::new()
        .with_outcome(MockOutcome::success("first transcript"))
        .with_outcome(MockOutcome::success("second transcript"))
        .with_outcome(MockOutcome::failure("backend down"));
    let h = harness(mock, fast_config());

    let parent_id = seed_parent(&h.store, ParentKind::Meeting).await;
    let a1 = upload(&h, parent_id, "one.wav").await;
    let a2 = upload(&h, parent_id, "two.wav").await;
    let a3 = upload(&h, parent_id, "three.wav").await;

    h.service
        .orchestrator()
        .process_all_pending(parent_id)
        .await
        .unwrap();

    wait_for_status(&h.store, a3, TranscriptionStatus::Failed).await;
    wait_for_sent(&h.sink, 1).await;
    // Give any stray retry task time to misbehave.
    sleep(Duration::from_millis(100)).await;

    assert_eq!(h.sink.sent_count(), 1);
    let message = &h.sink.sent()[0];
    assert_eq!(message.topic, "completed-meetings");
    assert_eq!(message.key, format!("meeting-{}", parent_id));
    assert!(message
        .headers
        .iter()
        .any(|(k, v)| k == "event-type" && v == "summarization.completed"));
    assert!(message
        .headers
        .iter()
        .any(|(k, v)| k == "transcribed-count" && v == "2"));
    assert!(message
        .headers
        .iter()
        .any(|(k, v)| k == "failed-count" && v == "1"));

    for id in [a1, a2] {
        let att = h.store.get_attachment(id).await.unwrap();
        assert_eq!(att.transcription_status, TranscriptionStatus::Completed);
        assert!(att.transcription_text.is_some());
        assert!(att.error_message.is_none());
    }
    let parent = h.store.get_parent(parent_id).await.unwrap();
    assert!(parent.summary_dispatched);
    assert!(parent.aggregate_text.contains("**Transcription of one.wav**"));
    assert!(parent.aggregate_text.contains("**Transcription of two.wav**"));
    assert!(!parent.aggregate_text.contains("three.wav"));
}

// Scenario: every attachment fails. No event may ever fire.
#[tokio::test]
async fn test_all_failed_never_dispatches() {
    let mock = MockTranscriptionBackend::always_failing("decode error");
    let h = harness(mock, fast_config());

    let parent_id = seed_parent(&h.store, ParentKind::Research).await;
    let a1 = upload(&h, parent_id, "one.wav").await;
    let a2 = upload(&h, parent_id, "two.wav").await;

    h.service
        .orchestrator()
        .process_all_pending(parent_id)
        .await
        .unwrap();
    wait_for_status(&h.store, a1, TranscriptionStatus::Failed).await;
    wait_for_status(&h.store, a2, TranscriptionStatus::Failed).await;
    sleep(Duration::from_millis(100)).await;

    assert_eq!(h.sink.sent_count(), 0);
    let parent = h.store.get_parent(parent_id).await.unwrap();
    assert!(!parent.summary_dispatched);
    assert!(parent.aggregate_text.is_empty());
}

// Scenario: manual retry of an exhausted attachment resets the budget
// and reruns transcription.
#[tokio::test]
async fn test_manual_retry_resets_budget() {
    let mock = MockTranscriptionBackend::new()
        .with_outcome(MockOutcome::failure("timeout"))
        .with_outcome(MockOutcome::failure("timeout"))
        .with_outcome(MockOutcome::failure("timeout"))
        .with_outcome(MockOutcome::success("recovered"));
    let h = harness(mock, fast_config());

    let parent_id = seed_parent(&h.store, ParentKind::Meeting).await;
    let att_id = upload(&h, parent_id, "call.wav").await;

    h.service.orchestrator().process_one(att_id).await.unwrap();
    wait_for_status(&h.store, att_id, TranscriptionStatus::Failed).await;

    let failed = h.store.get_attachment(att_id).await.unwrap();
    assert_eq!(failed.retry_count, 3);
    assert_eq!(
        failed.error_message.as_deref(),
        Some("Transcription error: timeout")
    );
    assert_eq!(h.sink.sent_count(), 0);

    let retried = h.service.retry_one(att_id).await.unwrap();
    assert!(retried);

    let att = h.store.get_attachment(att_id).await.unwrap();
    assert_eq!(att.transcription_status, TranscriptionStatus::Completed);
    assert_eq!(att.retry_count, 0);
    assert_eq!(att.transcription_text.as_deref(), Some("recovered"));
    assert!(att.error_message.is_none());
    assert_eq!(h.sink.sent_count(), 1);
    assert_eq!(h.mock.call_count(), 4);
}

// A parent that re-completes after its first dispatch publishes an
// updated event on the same partition key.
#[tokio::test]
async fn test_redispatch_carries_updated_action() {
    let mock = MockTranscriptionBackend::new()
        .with_outcome(MockOutcome::success("kept"))
        .with_outcome(MockOutcome::failure("flaky"))
        .with_outcome(MockOutcome::failure("flaky"))
        .with_outcome(MockOutcome::failure("flaky"))
        .with_outcome(MockOutcome::success("second take"));
    let h = harness(mock, fast_config());

    let parent_id = seed_parent(&h.store, ParentKind::Meeting).await;
    let good = upload(&h, parent_id, "good.wav").await;
    let flaky = upload(&h, parent_id, "flaky.wav").await;

    h.service
        .orchestrator()
        .process_all_pending(parent_id)
        .await
        .unwrap();
    wait_for_status(&h.store, flaky, TranscriptionStatus::Failed).await;
    wait_for_sent(&h.sink, 1).await;

    assert_eq!(
        h.store
            .get_attachment(good)
            .await
            .unwrap()
            .transcription_status,
        TranscriptionStatus::Completed
    );

    // Downstream summarizer finishes, releasing the re-entrancy guard.
    h.store
        .update_parent(
            parent_id,
            ParentPatch {
                summarization_status: Some(SummarizationStatus::Completed),
                summary_dispatched: None,
            },
        )
        .await
        .unwrap();

    assert!(h.service.retry_one(flaky).await.unwrap());
    wait_for_sent(&h.sink, 2).await;

    let messages = h.sink.sent();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].key, messages[1].key);
    assert!(messages[0]
        .headers
        .iter()
        .any(|(k, v)| k == "event-type" && v == "summarization.completed"));
    assert!(messages[1]
        .headers
        .iter()
        .any(|(k, v)| k == "event-type" && v == "summarization.updated"));
}

// Sequential re-checks after a dispatch are no-ops while the
// summarization guard is raised.
#[tokio::test]
async fn test_sequential_check_is_idempotent() {
    let mock = MockTranscriptionBackend::always_succeeding("text");
    let h = harness(mock, fast_config());

    let parent_id = seed_parent(&h.store, ParentKind::Meeting).await;
    let att_id = upload(&h, parent_id, "only.wav").await;
    h.service.orchestrator().process_one(att_id).await.unwrap();
    assert_eq!(h.sink.sent_count(), 1);

    let aggregator = CompletionAggregator::new(
        Arc::new(h.store.clone()),
        Arc::new(CompletionDispatcher::with_sink(Arc::new(h.sink.clone()))),
        Arc::new(ParentLocks::new()),
    );
    assert!(!aggregator.check_and_trigger(parent_id).await.unwrap());
    assert!(!aggregator.check_and_trigger(parent_id).await.unwrap());
    assert_eq!(h.sink.sent_count(), 1);
}

// N successful transcripts appended in processing order yield N
// delimited blocks, each naming its file.
#[tokio::test]
async fn test_transcript_blocks_append_in_order() {
    let mock = MockTranscriptionBackend::new()
        .with_outcome(MockOutcome::success("alpha"))
        .with_outcome(MockOutcome::success("beta"))
        .with_outcome(MockOutcome::success("gamma"));
    let h = harness(mock, fast_config());

    let parent_id = seed_parent(&h.store, ParentKind::Research).await;
    let names = ["a.wav", "b.wav", "c.wav"];
    for name in names {
        upload(&h, parent_id, name).await;
    }

    h.service
        .orchestrator()
        .process_all_pending(parent_id)
        .await
        .unwrap();

    let parent = h.store.get_parent(parent_id).await.unwrap();
    let expected: String = names
        .iter()
        .zip(["alpha", "beta", "gamma"])
        .map(|(name, text)| format_transcript_block(name, text))
        .collect();
    assert_eq!(parent.aggregate_text, expected);
    assert_eq!(parent.aggregate_text.matches("\n\n---\n\n").count(), 3);
}

#[tokio::test]
async fn test_zero_attachments_batch_is_noop() {
    let mock = MockTranscriptionBackend::always_succeeding("unused");
    let h = harness(mock, fast_config());

    let parent_id = seed_parent(&h.store, ParentKind::Meeting).await;
    h.service.start_batch(parent_id).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(h.sink.sent_count(), 0);
    assert_eq!(h.mock.call_count(), 0);
    let summary = h.service.get_summary(parent_id).await.unwrap();
    assert_eq!(summary.total, 0);
}

// retry_count never exceeds the budget, and failed implies an exhausted
// budget with the last error preserved.
#[tokio::test]
async fn test_retry_budget_invariants() {
    let mock = MockTranscriptionBackend::always_failing("backend down");
    let config = fast_config().with_max_retries(2);
    let h = harness(mock, config);

    let parent_id = seed_parent(&h.store, ParentKind::Meeting).await;
    let att_id = upload(&h, parent_id, "call.wav").await;

    h.service.orchestrator().process_one(att_id).await.unwrap();
    wait_for_status(&h.store, att_id, TranscriptionStatus::Failed).await;

    let att = h.store.get_attachment(att_id).await.unwrap();
    assert_eq!(att.retry_count, 2);
    assert!(att.last_attempt_at.is_some());
    assert!(att
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("backend down")));
    assert!(att.transcription_text.is_none());
    assert_eq!(h.mock.call_count(), 2);
}

// Only pending and failed attachments accept a manual retry.
#[tokio::test]
async fn test_manual_retry_rejected_outside_retryable_states() {
    let mock = MockTranscriptionBackend::always_succeeding("text");
    let h = harness(mock, fast_config());

    let parent_id = seed_parent(&h.store, ParentKind::Meeting).await;
    let att_id = upload(&h, parent_id, "call.wav").await;

    h.store
        .update_attachment(
            att_id,
            AttachmentPatch::status(TranscriptionStatus::InProgress),
        )
        .await
        .unwrap();
    assert!(!h.service.retry_one(att_id).await.unwrap());

    h.store
        .update_attachment(
            att_id,
            AttachmentPatch::status(TranscriptionStatus::Completed),
        )
        .await
        .unwrap();
    assert!(!h.service.retry_one(att_id).await.unwrap());
    assert_eq!(h.mock.call_count(), 0);
}

// A deletion cannot cancel an armed retry timer; the timer must notice
// the attachment is gone and do nothing.
#[tokio::test]
async fn test_deleted_attachment_aborts_retry_quietly() {
    let mock = MockTranscriptionBackend::always_failing("timeout");
    let config = fast_config().with_base_delay(Duration::from_millis(100));
    let h = harness(mock, config);

    let parent_id = seed_parent(&h.store, ParentKind::Meeting).await;
    let att_id = upload(&h, parent_id, "call.wav").await;

    h.service.orchestrator().process_one(att_id).await.unwrap();
    assert_eq!(h.mock.call_count(), 1);

    // Delete before the 100ms retry timer fires.
    h.store.delete_attachment(att_id).await.unwrap();
    sleep(Duration::from_millis(300)).await;

    assert_eq!(h.mock.call_count(), 1);
    assert_eq!(h.sink.sent_count(), 0);
}

#[tokio::test]
async fn test_store_attachment_registers_pending_upload() {
    let mock = MockTranscriptionBackend::always_succeeding("unused");
    let h = harness(mock, fast_config());

    let parent_id = seed_parent(&h.store, ParentKind::Meeting).await;
    let att = h
        .service
        .store_attachment(parent_id, "standup.mp3", "audio/mpeg", b"ID3audio")
        .await
        .unwrap();

    assert_eq!(att.transcription_status, TranscriptionStatus::Pending);
    assert!(att.storage_ref.starts_with("blobs/"));
    assert!(att.storage_ref.ends_with("standup.mp3"));
    assert_eq!(att.size_bytes, 8);

    let view = h.service.get_attachment_status(att.id).await.unwrap();
    assert_eq!(view.status, TranscriptionStatus::Pending);
    assert_eq!(view.retry_count, 0);
    assert!(view.transcription_text.is_none());
}

#[tokio::test]
async fn test_unknown_parent_is_rejected() {
    let mock = MockTranscriptionBackend::always_succeeding("unused");
    let h = harness(mock, fast_config());

    let missing = Uuid::new_v4();
    let err = h
        .service
        .store_attachment(missing, "a.wav", "audio/wav", b"x")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = h.service.start_batch(missing).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_start_batch_drives_to_dispatch() {
    let mock = MockTranscriptionBackend::always_succeeding("hands-free");
    let h = harness(mock, fast_config());

    let parent_id = seed_parent(&h.store, ParentKind::Meeting).await;
    let att_id = upload(&h, parent_id, "one.wav").await;

    h.service.start_batch(parent_id).await.unwrap();
    wait_for_status(&h.store, att_id, TranscriptionStatus::Completed).await;
    wait_for_sent(&h.sink, 1).await;

    let summary = h.service.get_summary(parent_id).await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.total, 1);
}

#[tokio::test]
async fn test_health_reports_backend_state() {
    let mock = MockTranscriptionBackend::new().with_health(false);
    let h = harness(mock, fast_config());

    let health = h.service.health().await;
    assert!(!health.transcription_backend_ok);
    assert_eq!(health.transcription_model, "mock-transcriber");
}
