//! Completion dispatcher and event sinks.
//!
//! The dispatcher is constructed once at process start from a validated
//! [`DispatchConfig`] and injected where needed. Publishing while the
//! producer is disabled or disconnected logs and drops the event; nothing
//! is queued or retried. Recovery from a dropped event is external
//! (manual resend).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{debug, error, info, warn};

use scriva_core::{defaults, Error, Result};

use crate::config::DispatchConfig;
use crate::envelope::CompletionEvent;

/// Where produced events go. The seam between dispatch logic and the
/// broker client, so the state machine is testable without a broker.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &[(String, String)],
    ) -> Result<()>;
}

/// Kafka-backed sink over an rdkafka `FutureProducer`.
pub struct KafkaSink {
    producer: FutureProducer,
}

impl KafkaSink {
    /// Build a producer from the dispatch configuration.
    pub fn connect(config: &DispatchConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", config.brokers.join(","))
            .set("client.id", &config.client_id)
            .set("message.timeout.ms", "30000");

        for (key, value) in config.security.client_config_pairs() {
            client_config.set(key, value);
        }

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| Error::Dispatch(format!("failed to create producer: {}", e)))?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventSink for KafkaSink {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &[(String, String)],
    ) -> Result<()> {
        let mut owned_headers = OwnedHeaders::new();
        for (k, v) in headers {
            owned_headers = owned_headers.insert(Header {
                key: k,
                value: Some(v.as_bytes()),
            });
        }

        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload)
            .headers(owned_headers);

        self.producer
            .send(
                record,
                Duration::from_secs(defaults::DISPATCH_SEND_TIMEOUT_SECS),
            )
            .await
            .map_err(|(e, _)| Error::Dispatch(format!("produce to {} failed: {}", topic, e)))?;

        Ok(())
    }
}

/// Recording sink for tests: captures every sent message, optionally
/// failing all sends.
#[derive(Clone, Default)]
pub struct MemorySink {
    sent: Arc<std::sync::Mutex<Vec<SentMessage>>>,
    fail_sends: bool,
}

/// One message captured by [`MemorySink`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every send fails with a dispatch error.
    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &[(String, String)],
    ) -> Result<()> {
        if self.fail_sends {
            return Err(Error::Dispatch("memory sink configured to fail".into()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
            headers: headers.to_vec(),
        });
        Ok(())
    }
}

/// Connection lifecycle state of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Feature flag off; every operation is a logged no-op.
    Disabled,
    /// Configured but the producer could not be created.
    Disconnected,
    /// Producer ready.
    Connected,
}

/// Publishes completion events to the broker.
pub struct CompletionDispatcher {
    state: DispatchState,
    sink: Option<Arc<dyn EventSink>>,
}

impl CompletionDispatcher {
    /// Initialize from configuration. Invalid configuration is fatal;
    /// a broker connection failure is not — it leaves the dispatcher
    /// `Disconnected` and publishing becomes a logged drop.
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        config.validate()?;

        if !config.enabled {
            info!("dispatch disabled by configuration");
            return Ok(Self {
                state: DispatchState::Disabled,
                sink: None,
            });
        }

        match KafkaSink::connect(config) {
            Ok(sink) => {
                info!(
                    brokers = %config.brokers.join(","),
                    protocol = config.security.protocol(),
                    "dispatch producer connected"
                );
                Ok(Self {
                    state: DispatchState::Connected,
                    sink: Some(Arc::new(sink)),
                })
            }
            Err(e) => {
                warn!(error = %e, "dispatch producer unavailable, events will be dropped");
                Ok(Self {
                    state: DispatchState::Disconnected,
                    sink: None,
                })
            }
        }
    }

    /// A dispatcher with the feature flag off.
    pub fn disabled() -> Self {
        Self {
            state: DispatchState::Disabled,
            sink: None,
        }
    }

    /// A connected dispatcher over an explicit sink (used by tests and
    /// by callers injecting a non-Kafka sink).
    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: DispatchState::Connected,
            sink: Some(sink),
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Publish one completion event.
    ///
    /// Returns `Ok(true)` when the event was handed to the sink,
    /// `Ok(false)` when it was skipped because the dispatcher is disabled
    /// or disconnected, and `Err(Error::Dispatch)` when the sink itself
    /// failed. In every non-`Ok(true)` case the event is dropped.
    pub async fn publish(&self, event: &CompletionEvent) -> Result<bool> {
        let sink = match (self.state, &self.sink) {
            (DispatchState::Connected, Some(sink)) => sink,
            (DispatchState::Disabled, _) => {
                debug!(event_key = %event.key(), "dispatch disabled, skipping event");
                return Ok(false);
            }
            _ => {
                warn!(
                    event_key = %event.key(),
                    topic = event.topic(),
                    "dispatch disconnected, dropping event"
                );
                return Ok(false);
            }
        };

        let payload = event.payload()?;
        let key = event.key();
        let topic = event.topic();

        match sink.send(topic, &key, &payload, &event.headers()).await {
            Ok(()) => {
                info!(
                    topic,
                    event_key = %key,
                    action = event.action.as_str(),
                    "completion event published"
                );
                Ok(true)
            }
            Err(e) => {
                error!(
                    topic,
                    event_key = %key,
                    error = %e,
                    "completion event dropped"
                );
                Err(e)
            }
        }
    }
}
