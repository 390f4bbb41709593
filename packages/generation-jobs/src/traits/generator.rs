//! Abstract generation collaborator.
//!
//! Implementations wrap a specific model provider and own the prompt text,
//! including the stricter output-format instructions requested through
//! `harden_output`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GenerationError;

/// Parameters of one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u32,

    pub model: String,

    /// Character budget for this attempt
    pub chunk_size: usize,

    /// Ask the model for strict structured output
    pub harden_output: bool,
}

/// Everything a generator needs for one call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest<'a> {
    pub job_type: &'a str,
    pub input: &'a str,
    pub attempt: &'a Attempt,
}

/// A model call that may fail.
///
/// Generators carry their own deadline and report it as
/// [`GenerationError::Timeout`]; the retry layer does not time calls out.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<Value, GenerationError>;
}
