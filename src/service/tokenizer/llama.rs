//! Token counts from a llama.cpp server.
//!
//! The server exposes `POST /tokenize`, which takes `{"content": "..."}` and answers with
//! `{"tokens": [...]}` using the loaded model's vocabulary.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::base::types::Res;

use super::{GenericTokenizer, Tokenizer};

impl Tokenizer {
    /// Creates a tokenizer backed by a llama.cpp server at `endpoint`.
    pub fn llama(endpoint: &str) -> Self {
        Self {
            inner: Arc::new(LlamaServerTokenizer::new(endpoint)),
        }
    }
}

#[derive(Serialize)]
struct TokenizeRequest<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct TokenizeResponse {
    tokens: Vec<serde_json::Value>,
}

/// Tokenizer backed by a llama.cpp server.
#[derive(Clone)]
pub struct LlamaServerTokenizer {
    client: reqwest::Client,
    url: String,
}

impl LlamaServerTokenizer {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: tokenize_url(endpoint),
        }
    }
}

#[async_trait]
impl GenericTokenizer for LlamaServerTokenizer {
    #[instrument(name = "LlamaServerTokenizer::count_tokens", skip_all)]
    async fn count_tokens(&self, text: &str) -> Res<usize> {
        let response = self
            .client
            .post(&self.url)
            .json(&TokenizeRequest { content: text })
            .send()
            .await?
            .error_for_status()?
            .json::<TokenizeResponse>()
            .await?;

        Ok(response.tokens.len())
    }
}

/// Build the `/tokenize` URL, tolerating a trailing slash or an OpenAI-style `/v1` suffix.
fn tokenize_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);

    format!("{base}/tokenize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_url() {
        assert_eq!(tokenize_url("http://localhost:8000"), "http://localhost:8000/tokenize");
        assert_eq!(tokenize_url("http://localhost:8000/"), "http://localhost:8000/tokenize");
        assert_eq!(tokenize_url("http://localhost:8000/v1"), "http://localhost:8000/tokenize");
        assert_eq!(tokenize_url("http://localhost:8000/v1/"), "http://localhost:8000/tokenize");
    }

    #[test]
    fn test_tokenize_response_shape() {
        let response: TokenizeResponse = serde_json::from_str(r#"{"tokens": [1, 15043, 3186]}"#).unwrap();

        assert_eq!(response.tokens.len(), 3);
    }
}
