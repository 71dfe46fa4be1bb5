//! # scriva-inference
//!
//! Speech-to-text capability behind a narrow backend trait.
//!
//! The pipeline consumes transcription through [`TranscriptionBackend`];
//! the real network-backed [`WhisperBackend`] and the deterministic
//! [`MockTranscriptionBackend`] are interchangeable, selected by
//! configuration.

pub mod mock;
pub mod transcription;

pub use mock::MockTranscriptionBackend;
pub use transcription::{
    backend_from_env, TranscriptionBackend, TranscriptionResult, TranscriptionSegment,
    WhisperBackend,
};

// Re-export core types
pub use scriva_core::{Error, Result};
