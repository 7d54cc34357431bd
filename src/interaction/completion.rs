//! Completion calls and reply post-processing.

use tracing::{debug, instrument};

use crate::{
    base::{error::CompletionError, types::PromptRequest},
    service::llm::LlmClient,
};

/// Calls the completion backend and turns its raw output into a publishable reply.
#[derive(Clone)]
pub struct CompletionInvoker {
    llm: LlmClient,
    bot_user_id: String,
}

impl CompletionInvoker {
    pub fn new(llm: LlmClient, bot_user_id: impl Into<String>) -> Self {
        Self {
            llm,
            bot_user_id: bot_user_id.into(),
        }
    }

    /// Generate a reply for `request`.
    ///
    /// Errors are returned as-is; there is no retry.
    #[instrument(name = "CompletionInvoker::invoke", skip_all)]
    pub async fn invoke(&self, request: &PromptRequest) -> Result<String, CompletionError> {
        let raw = self.llm.complete(request).await?;
        debug!("Raw completion: {raw:?}");

        post_process(&raw, &request.render(), &self.bot_user_id).ok_or(CompletionError::Empty)
    }
}

/// Strip an echoed prompt and a leading `"{bot_user_id}:"` label, then trim.
///
/// Returns `None` when nothing is left.
pub fn post_process(raw: &str, prompt: &str, bot_user_id: &str) -> Option<String> {
    let text = raw.strip_prefix(prompt).unwrap_or(raw).trim();

    let label = format!("{bot_user_id}:");
    let text = text.strip_prefix(label.as_str()).unwrap_or(text).trim();

    if text.is_empty() { None } else { Some(text.to_string()) }
}
