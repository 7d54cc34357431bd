//! Character-count token estimate.

use std::sync::Arc;

use async_trait::async_trait;

use crate::base::types::Res;

use super::{GenericTokenizer, Tokenizer};

impl Tokenizer {
    /// Creates a tokenizer that estimates one token per four characters.
    pub fn estimate() -> Self {
        Self { inner: Arc::new(EstimateTokenizer) }
    }
}

/// Estimates token counts without a model vocabulary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimateTokenizer;

#[async_trait]
impl GenericTokenizer for EstimateTokenizer {
    async fn count_tokens(&self, text: &str) -> Res<usize> {
        Ok(estimate_tokens(text))
    }
}

/// One token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_estimate_tokens_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[tokio::test]
    async fn test_tokenizer_estimate() {
        let tokenizer = Tokenizer::estimate();

        assert_eq!(tokenizer.count_tokens("hello world!").await.unwrap(), 3);
    }
}
