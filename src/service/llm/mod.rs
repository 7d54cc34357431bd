pub mod openai;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::{error::CompletionError, types::PromptRequest};

// Traits.

/// Generic LLM client trait that clients must implement.
///
/// This trait defines the core functionality for interacting with a completion backend.
/// Implementing this trait allows different LLM providers to be used with the relay.
#[async_trait]
pub trait GenericLlmClient: Send + Sync + 'static {
    /// Generate raw text for an assembled prompt.
    ///
    /// Temperature, max tokens, and stop markers are taken from the request unchanged. The
    /// returned text is not post-processed. Implementations must not retry.
    async fn complete(&self, request: &PromptRequest) -> Result<String, CompletionError>;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    pub fn new(inner: Arc<dyn GenericLlmClient>) -> Self {
        Self { inner }
    }
}
