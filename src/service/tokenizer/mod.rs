pub mod estimate;
pub mod llama;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::{config::Config, types::Res};

// Traits.

/// Generic tokenizer trait that clients must implement.
///
/// Used to measure an assembled prompt against the context budget before it is sent to the
/// completion backend.
#[async_trait]
pub trait GenericTokenizer: Send + Sync + 'static {
    /// Count the tokens in `text`.
    async fn count_tokens(&self, text: &str) -> Res<usize>;
}

// Structs.

/// Tokenizer for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Tokenizer {
    inner: Arc<dyn GenericTokenizer>,
}

impl Deref for Tokenizer {
    type Target = dyn GenericTokenizer;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl Tokenizer {
    pub fn new(inner: Arc<dyn GenericTokenizer>) -> Self {
        Self { inner }
    }

    /// Pick a tokenizer from the configuration.
    ///
    /// Uses the llama.cpp server when `tokenizer_endpoint` is set, and the character estimate otherwise.
    pub fn from_config(config: &Config) -> Self {
        match &config.tokenizer_endpoint {
            Some(endpoint) => Self::llama(endpoint),
            None => Self::estimate(),
        }
    }
}
