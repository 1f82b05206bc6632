//! Audit Sinks
//!
//! Console, in-memory, webhook and fan-out implementations of [`AuditSink`],
//! plus a queue that moves delivery off the answer path.

use crate::audit::{AuditEvent, AuditEventKind, AuditSink};
use crate::client::HttpClient;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Upper bound on one background delivery
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Events waiting for delivery beyond this are dropped
const QUEUE_CAPACITY: usize = 256;

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        match &event.kind {
            AuditEventKind::AttemptFailed { .. } | AuditEventKind::DispatchFailed { .. } => {
                warn!(event = event.name(), at = %event.at, "{}", event);
            }
            _ => info!(event = event.name(), at = %event.at, "{}", event),
        }
        Ok(())
    }
}

/// Keeps events in memory, in arrival order
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Event names in arrival order
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(AuditEvent::name).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Remove and return everything recorded so far
    pub fn drain(&self) -> Vec<AuditEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Posts each event as a chat message to a private webhook
pub struct WebhookAuditSink {
    http: HttpClient,
    url: String,
}

impl WebhookAuditSink {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AuditSink for WebhookAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        let body = serde_json::json!({
            "content": format!("`{}` {}", event.at.format("%Y-%m-%d %H:%M:%S UTC"), event),
        });

        self.http
            .post(&self.url, &body, &HeaderMap::new())
            .await
            .map(|_| ())
            .map_err(|e| RelayError::Sink(format!("webhook delivery failed: {}", e)))
    }
}

/// Delivers each event to every inner sink; one failing sink does not stop the rest
#[derive(Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait]
impl AuditSink for FanoutAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        let mut failures = Vec::new();

        for sink in &self.sinks {
            if let Err(e) = sink.record(event).await {
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RelayError::Sink(failures.join("; ")))
        }
    }
}

enum Queued {
    Event(AuditEvent),
    Flush(oneshot::Sender<()>),
}

/// Hands events to a background task that delivers them, in order, to an inner sink.
///
/// `record` never waits on the inner sink. A full queue drops the event.
pub struct QueuedAuditSink {
    tx: mpsc::Sender<Queued>,
}

impl QueuedAuditSink {
    /// Spawn the delivery task; must be called inside a tokio runtime
    pub fn spawn(inner: Arc<dyn AuditSink>) -> Self {
        Self::with_delivery_timeout(inner, DEFAULT_DELIVERY_TIMEOUT)
    }

    pub fn with_delivery_timeout(inner: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(deliver(inner, rx, timeout));
        Self { tx }
    }

    /// Wait until every event queued so far was delivered or dropped
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Queued::Flush(done_tx)).await.is_ok() {
            done_rx.await.ok();
        }
    }
}

async fn deliver(inner: Arc<dyn AuditSink>, mut rx: mpsc::Receiver<Queued>, timeout: Duration) {
    while let Some(item) = rx.recv().await {
        match item {
            Queued::Event(event) => {
                match tokio::time::timeout(timeout, inner.record(&event)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(event = event.name(), error = %e, "audit sink failed, event dropped");
                    }
                    Err(_) => {
                        warn!(
                            event = event.name(),
                            timeout_ms = timeout.as_millis() as u64,
                            "audit delivery timed out, event dropped"
                        );
                    }
                }
            }
            Queued::Flush(done) => {
                done.send(()).ok();
            }
        }
    }
    debug!("audit queue closed");
}

#[async_trait]
impl AuditSink for QueuedAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        self.tx
            .try_send(Queued::Event(event.clone()))
            .map_err(|e| match e {
                TrySendError::Full(_) => RelayError::Sink("audit queue full".to_string()),
                TrySendError::Closed(_) => RelayError::Sink("audit worker stopped".to_string()),
            })
    }
}
