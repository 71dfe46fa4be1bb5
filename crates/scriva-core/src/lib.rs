//! # scriva-core
//!
//! Core types, traits, and abstractions for the scriva transcription
//! pipeline.
//!
//! This crate provides the foundational data structures and error taxonomy
//! that the other scriva crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::{
    format_transcript_block, Attachment, AttachmentStatusView, ParentKind, ParentRecord,
    StatusSummary, SummarizationStatus, TranscriptionStatus,
};
