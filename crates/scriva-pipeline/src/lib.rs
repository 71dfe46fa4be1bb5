//! # scriva-pipeline
//!
//! The core of the scriva transcription pipeline: the per-attachment
//! orchestrator (lifecycle, retries, backoff), the cross-attachment
//! completion aggregator, the per-parent lock registry that keeps both
//! race-free, and the service facade the transport layer talks to.
//!
//! Control flow: upload → [`Orchestrator::process_one`] per attachment →
//! storage fetch → transcription backend → status update →
//! [`CompletionAggregator::check_and_trigger`] → completion event
//! dispatch.

pub mod aggregator;
pub mod locks;
pub mod orchestrator;
pub mod service;

pub use aggregator::CompletionAggregator;
pub use locks::ParentLocks;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use service::{HealthStatus, TranscriptionService};

// Re-export core types
pub use scriva_core::{Error, Result};
