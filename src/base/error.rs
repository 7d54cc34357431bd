//! Typed errors for the relay pipeline.
//!
//! Plumbing errors use `anyhow` (see [`crate::base::types::Err`]); the errors here are the ones
//! the orchestrator needs to match on.

use thiserror::Error;

/// Errors surfaced by a completion call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// The backend could not be reached (connection failure or timeout).
    #[error("Completion backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with an error.
    #[error("Completion backend error: {0}")]
    Backend(String),

    /// The backend output was empty after post-processing.
    #[error("Completion backend returned no usable text")]
    Empty,
}

/// Errors surfaced while assembling a prompt.
#[derive(Debug, Error)]
pub enum PromptError {
    /// The assembled prompt does not fit in the context budget.
    #[error("Prompt is {tokens} tokens, over the budget of {budget}")]
    ContextOverflow { tokens: usize, budget: usize },

    /// The tokenizer failed to count the prompt.
    #[error("Failed to count prompt tokens: {0}")]
    Tokenizer(#[source] anyhow::Error),
}

/// A non-success response from the homeserver.
#[derive(Debug, Error)]
#[error("Matrix request failed ({status}): {body}")]
pub struct MatrixApiError {
    /// HTTP status code.
    pub status: u16,
    /// Response body, usually a JSON object with `errcode` and `error`.
    pub body: String,
}

impl MatrixApiError {
    /// Whether repeating the same request cannot succeed.
    ///
    /// Client errors are permanent (bad credentials, unknown token, forbidden), except for
    /// request timeouts and rate limiting.
    pub fn is_permanent(&self) -> bool {
        (400..500).contains(&self.status) && self.status != 408 && self.status != 429
    }
}
