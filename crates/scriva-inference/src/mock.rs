//! Deterministic mock transcription backend for testing.
//!
//! Outcomes are scripted per call: the mock pops the next scripted outcome
//! on each `transcribe` invocation and repeats the last one once the
//! script is exhausted. Every call is recorded for assertions.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let backend = MockTranscriptionBackend::new()
//!     .with_outcome(MockOutcome::failure("network timeout"))
//!     .with_outcome(MockOutcome::success("second try worked"));
//!
//! let err = backend.transcribe(b"x", "audio/wav", None).await.unwrap_err();
//! let ok = backend.transcribe(b"x", "audio/wav", None).await.unwrap();
//! assert_eq!(backend.call_count(), 2);
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use scriva_core::{Error, Result};

use crate::transcription::{TranscriptionBackend, TranscriptionResult};

/// One scripted outcome for a `transcribe` call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Succeed with the given full text.
    Success(TranscriptionResult),
    /// Fail with a retryable transcription error.
    Failure(String),
}

impl MockOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        MockOutcome::Success(TranscriptionResult::text_only(text))
    }

    pub fn failure(message: impl Into<String>) -> Self {
        MockOutcome::Failure(message.into())
    }
}

/// A recorded `transcribe` invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub media_type: String,
    pub language: Option<String>,
    pub byte_len: usize,
}

/// Scripted, deterministic transcription backend.
#[derive(Clone)]
pub struct MockTranscriptionBackend {
    script: Arc<Mutex<Vec<MockOutcome>>>,
    cursor: Arc<Mutex<usize>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    health_ok: bool,
}

impl MockTranscriptionBackend {
    /// Create an empty mock; with no script, every call fails.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Vec::new())),
            cursor: Arc::new(Mutex::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            health_ok: true,
        }
    }

    /// A mock where every call succeeds with the same text.
    pub fn always_succeeding(text: impl Into<String>) -> Self {
        Self::new().with_outcome(MockOutcome::success(text))
    }

    /// A mock where every call fails with the same message.
    pub fn always_failing(message: impl Into<String>) -> Self {
        Self::new().with_outcome(MockOutcome::failure(message))
    }

    /// Append an outcome to the script.
    pub fn with_outcome(self, outcome: MockOutcome) -> Self {
        self.script.lock().unwrap().push(outcome);
        self
    }

    /// Set the health-check response.
    pub fn with_health(mut self, ok: bool) -> Self {
        self.health_ok = ok;
        self
    }

    /// Number of `transcribe` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_outcome(&self) -> Option<MockOutcome> {
        let script = self.script.lock().unwrap();
        if script.is_empty() {
            return None;
        }
        let mut cursor = self.cursor.lock().unwrap();
        let idx = (*cursor).min(script.len() - 1);
        *cursor += 1;
        Some(script[idx].clone())
    }
}

impl Default for MockTranscriptionBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptionBackend for MockTranscriptionBackend {
    async fn transcribe(
        &self,
        media_data: &[u8],
        media_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        self.calls.lock().unwrap().push(MockCall {
            media_type: media_type.to_string(),
            language: language.map(String::from),
            byte_len: media_data.len(),
        });

        match self.next_outcome() {
            Some(MockOutcome::Success(result)) => Ok(result),
            Some(MockOutcome::Failure(message)) => Err(Error::Transcription(message)),
            None => Err(Error::Transcription("mock has no scripted outcome".into())),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.health_ok)
    }

    fn model_name(&self) -> &str {
        "mock-transcriber"
    }
}
