//! Centralized default constants for the scriva pipeline.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates should reference these constants instead of defining
//! their own magic numbers.

// =============================================================================
// RETRY POLICY
// =============================================================================

/// Maximum transcription attempts per attachment before it is marked failed.
pub const MAX_RETRY_COUNT: i32 = 3;

/// Base retry delay in seconds. The effective delay grows linearly with
/// the attempt number: `delay = BASE_RETRY_DELAY_SECS * retry_count`.
pub const BASE_RETRY_DELAY_SECS: u64 = 5;

/// Pause between items when processing a parent's pending attachments
/// sequentially, to avoid saturating the transcription backend.
pub const BATCH_ITEM_PAUSE_MS: u64 = 500;

/// Environment variable overriding [`MAX_RETRY_COUNT`].
pub const ENV_MAX_RETRY_COUNT: &str = "TRANSCRIPTION_MAX_RETRIES";

/// Environment variable overriding [`BASE_RETRY_DELAY_SECS`].
pub const ENV_BASE_RETRY_DELAY_SECS: &str = "TRANSCRIPTION_RETRY_DELAY_SECS";

/// Environment variable overriding [`BATCH_ITEM_PAUSE_MS`].
pub const ENV_BATCH_ITEM_PAUSE_MS: &str = "TRANSCRIPTION_BATCH_PAUSE_MS";

// =============================================================================
// TRANSCRIPTION BACKEND
// =============================================================================

/// Environment variable selecting the transcription backend ("mock" or "whisper").
pub const ENV_TRANSCRIPTION_BACKEND: &str = "TRANSCRIPTION_BACKEND";

/// Environment variable for the Whisper transcription server URL.
pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";

/// Default Whisper transcription server URL.
pub const DEFAULT_WHISPER_BASE_URL: &str = "http://localhost:8000";

/// Environment variable for the Whisper model name.
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";

/// Default Whisper model.
pub const DEFAULT_WHISPER_MODEL: &str = "Systran/faster-distil-whisper-large-v3";

/// Timeout for transcription requests in seconds (long audio takes a while).
pub const TRANSCRIBE_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// BLOB STORAGE
// =============================================================================

/// Environment variable selecting the storage backend ("filesystem" or "http").
pub const ENV_STORAGE_BACKEND: &str = "STORAGE_BACKEND";

/// Environment variable for the filesystem storage base directory.
pub const ENV_STORAGE_PATH: &str = "STORAGE_PATH";

/// Default filesystem storage base directory.
pub const DEFAULT_STORAGE_PATH: &str = "/var/scriva/blobs";

/// Environment variable for the HTTP object store base URL.
pub const ENV_OBJECT_STORE_URL: &str = "OBJECT_STORE_URL";

/// Environment variable for the HTTP object store access token.
pub const ENV_OBJECT_STORE_TOKEN: &str = "OBJECT_STORE_TOKEN";

/// Timeout for object store requests in seconds.
pub const OBJECT_STORE_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// EVENT DISPATCH
// =============================================================================

/// Environment variable enabling completion-event dispatch.
pub const ENV_DISPATCH_ENABLED: &str = "KAFKA_ENABLED";

/// Environment variable for the broker address list (comma-separated).
pub const ENV_DISPATCH_BROKERS: &str = "KAFKA_BROKERS";

/// Default broker address list.
pub const DEFAULT_DISPATCH_BROKERS: &str = "localhost:9092";

/// Environment variable for the producer client identifier.
pub const ENV_DISPATCH_CLIENT_ID: &str = "KAFKA_CLIENT_ID";

/// Default producer client identifier.
pub const DEFAULT_DISPATCH_CLIENT_ID: &str = "scriva-pipeline";

/// Environment variable selecting the broker security mode
/// ("plaintext", "tls", "sasl", "kerberos").
pub const ENV_DISPATCH_SECURITY: &str = "KAFKA_SECURITY_MODE";

/// Topic receiving completed-meeting events.
pub const TOPIC_MEETINGS: &str = "completed-meetings";

/// Topic receiving completed-research events.
pub const TOPIC_RESEARCHES: &str = "completed-researches";

/// `source` header value stamped on every dispatched event.
pub const EVENT_SOURCE: &str = "scriva-pipeline";

/// Timeout for a single produce call in seconds.
pub const DISPATCH_SEND_TIMEOUT_SECS: u64 = 10;
