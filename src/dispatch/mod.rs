//! Dispatch Module
//!
//! Credential pool management and ordered fallback dispatch.

pub mod dispatcher;
pub mod outcome;
pub mod pool;

pub use dispatcher::{PromptTemplate, QueryDispatcher, DEFAULT_TEMPLATE};
pub use outcome::{DispatchOutcome, DispatchRequest, FailureReason};
pub use pool::{priority_label, Credential, CredentialPool};
