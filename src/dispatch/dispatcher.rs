//! Query Dispatcher
//!
//! Tries each credential of the pool in order until one answers.

use crate::audit::{emit, AttemptError, AuditEvent, AuditEventKind, AuditSink};
use crate::config::PROMPT_PLACEHOLDER;
use crate::dispatch::outcome::{DispatchOutcome, DispatchRequest};
use crate::dispatch::pool::{Credential, CredentialPool};
use crate::error::{RelayError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default instruction wrapped around every prompt
pub const DEFAULT_TEMPLATE: &str = "User question/request: {prompt}";

/// Instruction template with a `{prompt}` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(PROMPT_PLACEHOLDER) {
            return Err(RelayError::Config(format!(
                "prompt template '{}' has no {} placeholder",
                template, PROMPT_PLACEHOLDER
            )));
        }
        Ok(Self(template))
    }

    /// Substitute the prompt verbatim
    pub fn render(&self, prompt: &str) -> String {
        self.0.replace(PROMPT_PLACEHOLDER, prompt)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self(DEFAULT_TEMPLATE.to_string())
    }
}

/// Result of one credential attempt
enum Attempt {
    Answered(String),
    Failed(RelayError),
}

impl Attempt {
    /// Blank answers count as failures
    fn classify(result: Result<String>) -> Self {
        match result {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Attempt::Failed(RelayError::EmptyAnswer)
                } else {
                    Attempt::Answered(trimmed.to_string())
                }
            }
            Err(e) => Attempt::Failed(e),
        }
    }
}

/// Sequential fallback dispatcher over a shared credential pool
pub struct QueryDispatcher {
    pool: Arc<CredentialPool>,
    audit: Arc<dyn AuditSink>,
    template: PromptTemplate,
}

impl QueryDispatcher {
    pub fn new(pool: Arc<CredentialPool>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            pool,
            audit,
            template: PromptTemplate::default(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Report the pool size to the audit channel
    pub async fn announce(&self) {
        emit(
            self.audit.as_ref(),
            AuditEvent::now(
                AuditEventKind::PoolInitialized {
                    usable: self.pool.size(),
                },
                None,
            ),
        )
        .await;
    }

    /// Answer one request, falling back through the pool on failure
    pub async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome {
        let prompt = self.template.render(&request.prompt);
        let mut attempted = Vec::with_capacity(self.pool.size());
        let mut errors = Vec::new();

        for credential in self.pool.entries() {
            attempted.push(credential.name().to_string());
            self.record(request, AuditEventKind::AttemptStarted {
                credential: credential.name().to_string(),
            })
            .await;

            match self.attempt(credential, &prompt).await {
                Attempt::Answered(text) => {
                    info!(
                        credential = %credential.name(),
                        requester = %request.requester.id,
                        chars = text.chars().count(),
                        "dispatch succeeded"
                    );
                    self.record(request, AuditEventKind::DispatchSucceeded {
                        credential: credential.name().to_string(),
                        result_locator: request.reply_locator.clone(),
                        answer_chars: text.chars().count(),
                    })
                    .await;

                    return DispatchOutcome::Success {
                        text,
                        credential_used: credential.name().to_string(),
                    };
                }
                Attempt::Failed(e) => {
                    let kind = e.kind();
                    warn!(
                        credential = %credential.name(),
                        kind = %kind,
                        error = %e,
                        "attempt failed, falling back"
                    );
                    self.record(request, AuditEventKind::AttemptFailed {
                        credential: credential.name().to_string(),
                        error_kind: kind,
                        detail: e.to_string(),
                    })
                    .await;

                    errors.push(AttemptError {
                        credential: credential.name().to_string(),
                        kind,
                        detail: e.to_string(),
                    });
                }
            }
        }

        if attempted.is_empty() {
            warn!(requester = %request.requester.id, "no usable credentials, dispatch skipped");
        } else {
            warn!(
                requester = %request.requester.id,
                attempts = attempted.len(),
                "every credential failed"
            );
        }

        self.record(request, AuditEventKind::DispatchFailed {
            errors: errors.clone(),
        })
        .await;

        DispatchOutcome::Failure {
            attempted_credentials: attempted,
            errors,
        }
    }

    async fn attempt(&self, credential: &Credential, prompt: &str) -> Attempt {
        debug!(
            credential = %credential.name(),
            backend = %credential.handle().describe(),
            "attempting credential"
        );
        Attempt::classify(credential.handle().generate(prompt).await)
    }

    async fn record(&self, request: &DispatchRequest, kind: AuditEventKind) {
        emit(
            self.audit.as_ref(),
            AuditEvent::now(kind, Some(request.requester.clone())),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{MemoryAuditSink, QueuedAuditSink, TracingAuditSink};
    use crate::client::ModelBackend;
    use crate::dispatch::outcome::FailureReason;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted response for a fake backend
    #[derive(Clone)]
    enum Script {
        Answer(&'static str),
        Quota,
        Network,
    }

    struct ScriptedBackend {
        script: Script,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn describe(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().push(prompt.to_string());
            match self.script {
                Script::Answer(text) => Ok(text.to_string()),
                Script::Quota => Err(RelayError::RateLimited(
                    "RESOURCE_EXHAUSTED: quota exceeded".to_string(),
                )),
                Script::Network => Err(RelayError::Request("connection reset".to_string())),
            }
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl crate::audit::AuditSink for BrokenSink {
        async fn record(&self, _event: &AuditEvent) -> Result<()> {
            Err(RelayError::Sink("dm channel closed".to_string()))
        }
    }

    fn pool_of(backends: &[(&str, Arc<ScriptedBackend>)]) -> Arc<CredentialPool> {
        Arc::new(CredentialPool::from_credentials(
            backends
                .iter()
                .map(|(name, b)| Credential::new(*name, b.clone() as Arc<dyn ModelBackend>))
                .collect(),
        ))
    }

    fn request() -> DispatchRequest {
        DispatchRequest::new("What is the answer?", "42", "alice")
    }

    fn trail(sink: &MemoryAuditSink) -> Vec<(&'static str, Option<String>)> {
        sink.events()
            .iter()
            .map(|e| (e.name(), e.credential().map(str::to_string)))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_pool_fails_without_calls() {
        let sink = Arc::new(MemoryAuditSink::new());
        let dispatcher = QueryDispatcher::new(Arc::new(CredentialPool::default()), sink.clone());

        let outcome = dispatcher.dispatch(&request()).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Failure {
                attempted_credentials: vec![],
                errors: vec![],
            }
        );
        assert_eq!(outcome.failure_reason(), Some(FailureReason::EmptyPool));
        assert_eq!(sink.names(), vec!["dispatch_failed"]);
    }

    #[tokio::test]
    async fn test_fallback_to_secondary_after_quota_error() {
        let primary = ScriptedBackend::new(Script::Quota);
        let secondary = ScriptedBackend::new(Script::Answer(" The answer is 42. "));
        let sink = Arc::new(MemoryAuditSink::new());
        let dispatcher = QueryDispatcher::new(
            pool_of(&[("Primary", primary.clone()), ("Secondary", secondary.clone())]),
            sink.clone(),
        );

        let outcome = dispatcher.dispatch(&request()).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Success {
                text: "The answer is 42.".to_string(),
                credential_used: "Secondary".to_string(),
            }
        );
        assert_eq!(
            trail(&sink),
            vec![
                ("attempt_started", Some("Primary".to_string())),
                ("attempt_failed", Some("Primary".to_string())),
                ("attempt_started", Some("Secondary".to_string())),
                ("dispatch_succeeded", Some("Secondary".to_string())),
            ]
        );
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);

        match &sink.events()[1].kind {
            AuditEventKind::AttemptFailed { error_kind, .. } => {
                assert_eq!(*error_kind, ErrorKind::ApiError)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_success_stops_iteration() {
        let backends = [
            ("Primary", ScriptedBackend::new(Script::Network)),
            ("Secondary", ScriptedBackend::new(Script::Quota)),
            ("Tertiary", ScriptedBackend::new(Script::Answer("ok"))),
            ("Backup 1", ScriptedBackend::new(Script::Answer("never"))),
        ];
        let sink = Arc::new(MemoryAuditSink::new());
        let dispatcher = QueryDispatcher::new(pool_of(&backends), sink.clone());

        let outcome = dispatcher.dispatch(&request()).await;
        assert_eq!(outcome.text(), Some("ok"));

        let events = sink.events();
        for name in ["Primary", "Secondary"] {
            let failed = events
                .iter()
                .filter(|e| e.name() == "attempt_failed" && e.credential() == Some(name))
                .count();
            assert_eq!(failed, 1, "{name} should fail exactly once");
        }
        let tertiary: Vec<_> = events
            .iter()
            .filter(|e| e.credential() == Some("Tertiary"))
            .map(|e| e.name())
            .collect();
        assert_eq!(tertiary, vec!["attempt_started", "dispatch_succeeded"]);

        assert!(events.iter().all(|e| e.credential() != Some("Backup 1")));
        assert_eq!(backends[3].1.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_api_errors_exhaust_pool() {
        let backends = [
            ("Primary", ScriptedBackend::new(Script::Quota)),
            ("Secondary", ScriptedBackend::new(Script::Quota)),
            ("Tertiary", ScriptedBackend::new(Script::Quota)),
        ];
        let sink = Arc::new(MemoryAuditSink::new());
        let dispatcher = QueryDispatcher::new(pool_of(&backends), sink.clone());

        let outcome = dispatcher.dispatch(&request()).await;

        match &outcome {
            DispatchOutcome::Failure {
                attempted_credentials,
                errors,
            } => {
                assert_eq!(attempted_credentials, &["Primary", "Secondary", "Tertiary"]);
                assert!(errors.iter().all(|e| e.kind == ErrorKind::ApiError));
                assert_eq!(errors.len(), 3);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(outcome.failure_reason(), Some(FailureReason::PoolExhausted));
        assert_eq!(sink.names().last(), Some(&"dispatch_failed"));
        assert!(!sink.names().contains(&"dispatch_succeeded"));
        assert!(backends.iter().all(|(_, b)| b.calls() == 1));
    }

    #[tokio::test]
    async fn test_blank_answer_is_unexpected_failure() {
        let primary = ScriptedBackend::new(Script::Answer("   \n "));
        let secondary = ScriptedBackend::new(Script::Answer("real answer"));
        let sink = Arc::new(MemoryAuditSink::new());
        let dispatcher = QueryDispatcher::new(
            pool_of(&[("Primary", primary), ("Secondary", secondary)]),
            sink.clone(),
        );

        let outcome = dispatcher.dispatch(&request()).await;
        assert_eq!(outcome.text(), Some("real answer"));

        match &sink.events()[1].kind {
            AuditEventKind::AttemptFailed { error_kind, .. } => {
                assert_eq!(*error_kind, ErrorKind::UnexpectedError)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prompt_is_wrapped_in_template() {
        let backend = ScriptedBackend::new(Script::Answer("fine"));
        let dispatcher = QueryDispatcher::new(
            pool_of(&[("Primary", backend.clone())]),
            Arc::new(TracingAuditSink),
        );

        let empty = DispatchRequest::new("", "1", "bob");
        dispatcher.dispatch(&request()).await;
        dispatcher.dispatch(&empty).await;

        assert_eq!(
            *backend.prompts.lock(),
            vec![
                "User question/request: What is the answer?".to_string(),
                "User question/request: ".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_custom_template() {
        let backend = ScriptedBackend::new(Script::Answer("fine"));
        let dispatcher = QueryDispatcher::new(
            pool_of(&[("Primary", backend.clone())]),
            Arc::new(TracingAuditSink),
        )
        .with_template(PromptTemplate::new("Answer briefly.\n{prompt}").unwrap());

        dispatcher.dispatch(&request()).await;
        assert_eq!(
            backend.prompts.lock()[0],
            "Answer briefly.\nWhat is the answer?"
        );
        assert!(PromptTemplate::new("missing").is_err());
    }

    #[tokio::test]
    async fn test_broken_audit_sink_does_not_change_outcome() {
        let dispatcher = QueryDispatcher::new(
            pool_of(&[
                ("Primary", ScriptedBackend::new(Script::Quota)),
                ("Secondary", ScriptedBackend::new(Script::Answer("still here"))),
            ]),
            Arc::new(BrokenSink),
        );

        let outcome = dispatcher.dispatch(&request()).await;
        assert_eq!(outcome.text(), Some("still here"));
    }

    struct SlowSink {
        delay: std::time::Duration,
        seen: MemoryAuditSink,
    }

    #[async_trait]
    impl crate::audit::AuditSink for SlowSink {
        async fn record(&self, event: &AuditEvent) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.seen.record(event).await
        }
    }

    #[tokio::test]
    async fn test_slow_audit_channel_does_not_delay_answer() {
        let slow = Arc::new(SlowSink {
            delay: std::time::Duration::from_millis(300),
            seen: MemoryAuditSink::new(),
        });
        let queued = Arc::new(QueuedAuditSink::spawn(slow.clone()));
        let dispatcher = QueryDispatcher::new(
            pool_of(&[("Primary", ScriptedBackend::new(Script::Answer("fast")))]),
            queued.clone(),
        );

        let started = std::time::Instant::now();
        let outcome = dispatcher.dispatch(&request()).await;
        assert_eq!(outcome.text(), Some("fast"));
        assert!(started.elapsed() < std::time::Duration::from_millis(250));

        queued.flush().await;
        assert_eq!(slow.seen.names(), vec!["attempt_started", "dispatch_succeeded"]);
    }

    #[tokio::test]
    async fn test_success_event_carries_locator() {
        let sink = Arc::new(MemoryAuditSink::new());
        let dispatcher = QueryDispatcher::new(
            pool_of(&[("Primary", ScriptedBackend::new(Script::Answer("abc")))]),
            sink.clone(),
        );

        let req = request().with_reply_locator("channel/7/message/9");
        dispatcher.dispatch(&req).await;

        let events = sink.events();
        assert_eq!(
            events[1].kind,
            AuditEventKind::DispatchSucceeded {
                credential: "Primary".to_string(),
                result_locator: Some("channel/7/message/9".to_string()),
                answer_chars: 3,
            }
        );
        assert_eq!(events[1].requester.as_ref().map(|r| r.name.as_str()), Some("alice"));
    }

    #[tokio::test]
    async fn test_announce_reports_pool_size() {
        let sink = Arc::new(MemoryAuditSink::new());
        let dispatcher = QueryDispatcher::new(
            pool_of(&[
                ("Primary", ScriptedBackend::new(Script::Quota)),
                ("Secondary", ScriptedBackend::new(Script::Quota)),
            ]),
            sink.clone(),
        );

        dispatcher.announce().await;
        assert_eq!(
            sink.events()[0].kind,
            AuditEventKind::PoolInitialized { usable: 2 }
        );
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_share_pool() {
        let backend = ScriptedBackend::new(Script::Answer("shared"));
        let dispatcher = Arc::new(QueryDispatcher::new(
            pool_of(&[("Primary", backend.clone())]),
            Arc::new(MemoryAuditSink::new()),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let request = DispatchRequest::new(format!("q{i}"), i.to_string(), "user");
                    dispatcher.dispatch(&request).await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_success());
        }
        assert_eq!(backend.calls(), 8);
    }
}
