//! Dispatch request and outcome types.

use crate::audit::{AttemptError, Requester};

/// One user query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    /// Free text, forwarded verbatim inside the instruction template
    pub prompt: String,

    pub requester: Requester,

    /// Where the answer will be posted (message link, interaction id)
    pub reply_locator: Option<String>,
}

impl DispatchRequest {
    pub fn new(
        prompt: impl Into<String>,
        requester_id: impl Into<String>,
        requester_name: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            requester: Requester {
                id: requester_id.into(),
                name: requester_name.into(),
            },
            reply_locator: None,
        }
    }

    pub fn with_reply_locator(mut self, locator: impl Into<String>) -> Self {
        self.reply_locator = Some(locator.into());
        self
    }
}

/// Why a dispatch produced no answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No credential was ever bound
    EmptyPool,

    /// Every credential was tried once and failed
    PoolExhausted,
}

/// Terminal result of a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success {
        /// Trimmed, non-empty answer
        text: String,
        credential_used: String,
    },
    Failure {
        /// Credentials in the order they were tried
        attempted_credentials: Vec<String>,
        errors: Vec<AttemptError>,
    },
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success { .. })
    }

    /// Answer text on success
    pub fn text(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Success { text, .. } => Some(text),
            DispatchOutcome::Failure { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            DispatchOutcome::Success { .. } => None,
            DispatchOutcome::Failure {
                attempted_credentials,
                ..
            } if attempted_credentials.is_empty() => Some(FailureReason::EmptyPool),
            DispatchOutcome::Failure { .. } => Some(FailureReason::PoolExhausted),
        }
    }
}
