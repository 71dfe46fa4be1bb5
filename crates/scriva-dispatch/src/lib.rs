//! # scriva-dispatch
//!
//! Completion-event publication to the message broker.
//!
//! Owns the producer connection lifecycle (disabled / disconnected /
//! connected), the typed security configuration (plaintext, TLS, SASL
//! credentials, Kerberos tickets), and the event envelope format. Delivery
//! is at-most-once by design: publish attempts while the producer is
//! unavailable are logged and dropped, never queued.

pub mod config;
pub mod dispatcher;
pub mod envelope;

pub use config::{DispatchConfig, SaslMechanism, SecurityMode, TlsParams};
pub use dispatcher::{CompletionDispatcher, DispatchState, EventSink, KafkaSink, MemorySink};
pub use envelope::{CompletionAction, CompletionEvent};

// Re-export core types
pub use scriva_core::{Error, Result};
