//! API Module
//!
//! Wire types for the upstream model API.

pub mod generate;

pub use generate::{
    ApiErrorBody, ApiErrorDetail, Candidate, Content, GenerateRequest, GenerateResponse,
    GenerationConfig, Part, PromptFeedback, UsageMetadata,
};
