//! Tracing subscriber setup and the logging conventions shared by every
//! scriva crate.
//!
//! Structured fields use stable snake_case names (`attachment_id`,
//! `parent_id`, `retry_count`, `duration_ms`, `topic`, `event_key`,
//! `error`) so log aggregation tools can query across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, operation completions |
//! | DEBUG | Decision points, skipped work, quiet aborts |

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with env-filter support.
///
/// Honors `RUST_LOG`; defaults to `info`. Safe to call more than once
/// (subsequent calls are no-ops), so tests can call it freely.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
