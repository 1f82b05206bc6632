//! Relaybot - chat relay agent
//!
//! Answers chat questions through an LLM, trying a fixed priority list of API
//! credentials until one answers, splitting long answers into platform-sized
//! messages and reporting every attempt to a side-channel audit trail.

use std::sync::Arc;

pub mod api;
pub mod audit;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod messenger;
pub mod reaction;
pub mod segment;

use audit::{
    AuditSink, FanoutAuditSink, QueuedAuditSink, TracingAuditSink, WebhookAuditSink,
    DEFAULT_DELIVERY_TIMEOUT,
};
use client::{GeminiBinder, HttpClient};
use config::AgentConfig;
use dispatch::{
    priority_label, CredentialPool, DispatchOutcome, DispatchRequest, PromptTemplate,
    QueryDispatcher,
};
use error::Result;
use messenger::Messenger;
use segment::ResponseSegmenter;
use tracing::warn;

/// Default notice shown when no credential could answer
pub const DEFAULT_FAILURE_NOTICE: &str =
    "Sorry, I couldn't get an answer right now. Please try again later.";

/// Default "working" placeholder
pub const DEFAULT_WORKING_NOTICE: &str = "Thinking...";

/// What the visible channel receives for one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Rendered segments, in posting order
    Answer {
        segments: Vec<String>,
        credential: String,
    },

    /// The generic failure notice; details went to the audit channel
    Unavailable { notice: String },
}

impl Reply {
    /// Messages to post, in order
    pub fn messages(&self) -> Vec<&str> {
        match self {
            Reply::Answer { segments, .. } => segments.iter().map(String::as_str).collect(),
            Reply::Unavailable { notice } => vec![notice.as_str()],
        }
    }
}

/// The question-answering agent
pub struct RelayAgent {
    dispatcher: QueryDispatcher,
    segmenter: ResponseSegmenter,
    failure_notice: String,
    working_notice: String,
}

impl RelayAgent {
    /// Create an agent with the default notices
    pub fn new(dispatcher: QueryDispatcher, segmenter: ResponseSegmenter) -> Self {
        Self {
            dispatcher,
            segmenter,
            failure_notice: DEFAULT_FAILURE_NOTICE.to_string(),
            working_notice: DEFAULT_WORKING_NOTICE.to_string(),
        }
    }

    /// Set the failure and working notices
    pub fn with_notices(
        mut self,
        failure_notice: impl Into<String>,
        working_notice: impl Into<String>,
    ) -> Self {
        self.failure_notice = failure_notice.into();
        self.working_notice = working_notice.into();
        self
    }

    /// Bind every configured credential against Gemini and wire the agent
    pub fn from_config(config: &AgentConfig, audit: Arc<dyn AuditSink>) -> Result<Self> {
        let http = HttpClient::new(config.request_timeout(), config.connect_timeout())?;
        let binder = GeminiBinder::new(
            http,
            config.effective_base_url(),
            config.model.clone(),
            config.generation_config(),
        );

        let named = config
            .credential_secrets()
            .into_iter()
            .enumerate()
            .map(|(i, (name, secret))| (name.unwrap_or_else(|| priority_label(i)), secret))
            .collect();
        let pool = Arc::new(CredentialPool::from_named(named, &binder));

        let dispatcher = QueryDispatcher::new(pool, audit)
            .with_template(PromptTemplate::new(config.prompt_template.clone())?);
        let segmenter = ResponseSegmenter::new(config.message_limit, config.continuation_margin);

        Ok(Self::new(dispatcher, segmenter)
            .with_notices(config.failure_notice.clone(), config.working_notice.clone()))
    }

    /// Shared credential pool (read by the liveness endpoint)
    pub fn pool(&self) -> &Arc<CredentialPool> {
        self.dispatcher.pool()
    }

    pub fn dispatcher(&self) -> &QueryDispatcher {
        &self.dispatcher
    }

    /// Report readiness to the audit channel
    pub async fn start(&self) {
        if self.pool().is_empty() {
            warn!("no usable credentials, questions will get the failure notice");
        }
        self.dispatcher.announce().await;
    }

    /// Dispatch and shape the visible reply
    pub async fn answer(&self, request: &DispatchRequest) -> Reply {
        match self.dispatcher.dispatch(request).await {
            DispatchOutcome::Success {
                text,
                credential_used,
            } => Reply::Answer {
                segments: self.segmenter.render(&text),
                credential: credential_used,
            },
            DispatchOutcome::Failure { .. } => Reply::Unavailable {
                notice: self.failure_notice.clone(),
            },
        }
    }

    /// Acknowledge, answer and post the reply through `messenger`.
    ///
    /// A failed acknowledgement is logged and ignored; a failed post stops the
    /// remaining segments.
    pub async fn handle_question(
        &self,
        request: &DispatchRequest,
        messenger: &dyn Messenger,
    ) -> Result<Reply> {
        if let Err(e) = messenger.acknowledge(&self.working_notice).await {
            warn!(error = %e, "failed to acknowledge question");
        }

        let reply = self.answer(request).await;
        for message in reply.messages() {
            messenger.send(message).await?;
        }

        Ok(reply)
    }
}

/// Console logging plus the webhook side channel when one is configured,
/// delivered by a background task. Must be called inside a tokio runtime.
pub fn audit_sink_from_config(config: &AgentConfig) -> Result<Arc<QueuedAuditSink>> {
    let console: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let mut fanout = FanoutAuditSink::new(vec![console]);

    if let Some(url) = config.audit_webhook_url() {
        let http = HttpClient::new(DEFAULT_DELIVERY_TIMEOUT, config.connect_timeout())?;
        fanout.push(Arc::new(WebhookAuditSink::new(http, url)));
    }

    Ok(Arc::new(QueuedAuditSink::spawn(Arc::new(fanout))))
}
