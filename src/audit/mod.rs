//! Audit Trail
//!
//! Structured records of every dispatch attempt and outcome, delivered
//! best-effort to a side channel.

pub mod sinks;

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

pub use sinks::{
    FanoutAuditSink, MemoryAuditSink, QueuedAuditSink, TracingAuditSink, WebhookAuditSink,
    DEFAULT_DELIVERY_TIMEOUT,
};

/// Who asked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    pub name: String,
}

/// One failed attempt as reported in `dispatch_failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptError {
    pub credential: String,
    pub kind: ErrorKind,
    pub detail: String,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEventKind {
    PoolInitialized {
        usable: usize,
    },
    AttemptStarted {
        credential: String,
    },
    AttemptFailed {
        credential: String,
        error_kind: ErrorKind,
        detail: String,
    },
    DispatchSucceeded {
        credential: String,
        result_locator: Option<String>,
        answer_chars: usize,
    },
    DispatchFailed {
        errors: Vec<AttemptError>,
    },
}

/// A timestamped audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<Requester>,

    #[serde(flatten)]
    pub kind: AuditEventKind,
}

impl AuditEvent {
    pub fn now(kind: AuditEventKind, requester: Option<Requester>) -> Self {
        Self {
            at: Utc::now(),
            requester,
            kind,
        }
    }

    /// Short event name, as used in the serialized `event` tag
    pub fn name(&self) -> &'static str {
        match self.kind {
            AuditEventKind::PoolInitialized { .. } => "pool_initialized",
            AuditEventKind::AttemptStarted { .. } => "attempt_started",
            AuditEventKind::AttemptFailed { .. } => "attempt_failed",
            AuditEventKind::DispatchSucceeded { .. } => "dispatch_succeeded",
            AuditEventKind::DispatchFailed { .. } => "dispatch_failed",
        }
    }

    /// Credential the event refers to, if any
    pub fn credential(&self) -> Option<&str> {
        match &self.kind {
            AuditEventKind::AttemptStarted { credential }
            | AuditEventKind::AttemptFailed { credential, .. }
            | AuditEventKind::DispatchSucceeded { credential, .. } => Some(credential),
            AuditEventKind::PoolInitialized { .. } | AuditEventKind::DispatchFailed { .. } => None,
        }
    }
}

/// Human-readable one-liner for chat-style side channels
impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = self
            .requester
            .as_ref()
            .map(|r| format!(" [{} ({})]", r.name, r.id))
            .unwrap_or_default();

        match &self.kind {
            AuditEventKind::PoolInitialized { usable } => {
                write!(f, "pool initialized: {} usable credential(s)", usable)
            }
            AuditEventKind::AttemptStarted { credential } => {
                write!(f, "attempt started with {}{}", credential, who)
            }
            AuditEventKind::AttemptFailed {
                credential,
                error_kind,
                detail,
            } => write!(
                f,
                "attempt with {} failed ({}): {}{}",
                credential, error_kind, detail, who
            ),
            AuditEventKind::DispatchSucceeded {
                credential,
                result_locator,
                answer_chars,
            } => {
                write!(f, "answered with {} ({} chars)", credential, answer_chars)?;
                if let Some(locator) = result_locator {
                    write!(f, " at {}", locator)?;
                }
                write!(f, "{}", who)
            }
            AuditEventKind::DispatchFailed { errors } => {
                if errors.is_empty() {
                    return write!(f, "dispatch failed: no usable credentials{}", who);
                }
                let summary = errors
                    .iter()
                    .map(|e| format!("{}={}", e.credential, e.kind))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "dispatch failed: {}{}", summary, who)
            }
        }
    }
}

/// Receives audit events. Implementations may fail; callers must not care.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Deliver `event` to `sink`, logging and discarding any failure
pub async fn emit(sink: &dyn AuditSink, event: AuditEvent) {
    if let Err(e) = sink.record(&event).await {
        warn!(event = event.name(), error = %e, "audit sink failed, event dropped");
    }
}
