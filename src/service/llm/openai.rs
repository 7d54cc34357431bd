//! Integration with OpenAI-compatible completion backends.
//!
//! This module sends assembled prompts to a chat completions endpoint. The endpoint is
//! configurable, so the same client works against OpenAI and against local servers such as
//! llama.cpp that speak the same API.

use std::sync::Arc;

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse, Stop,
    },
};
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    error::CompletionError,
    types::{PromptRequest, Role},
};

use super::{GenericLlmClient, LlmClient};

// Extra methods on `LlmClient` applied by the openai implementation.

impl LlmClient {
    pub fn openai(config: &Config) -> Self {
        let client = OpenAiLlmClient::new(config);
        Self { inner: Arc::new(client) }
    }
}

// Specific implementations.

/// OpenAI LLM client implementation.
#[derive(Clone)]
pub struct OpenAiLlmClient {
    client: Client<OpenAIConfig>,
    config: Config,
}

impl OpenAiLlmClient {
    /// Create a new OpenAI LLM client.
    #[instrument(name = "OpenAiLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Self {
        let cfg = OpenAIConfig::new().with_api_base(config.openai_api_endpoint.clone()).with_api_key(config.openai_api_key.clone());

        Self {
            client: Client::with_config(cfg),
            config: config.clone(),
        }
    }

    /// Build the chat completion request.
    #[instrument(name = "OpenAiLlmClient::build_request", skip_all)]
    #[allow(deprecated)]
    fn build_request(&self, request: &PromptRequest) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(request.turns.len() + 1);

        messages.push(ChatCompletionRequestSystemMessageArgs::default().content(request.system.clone()).build()?.into());

        for turn in &request.turns {
            let message: ChatCompletionRequestMessage = match turn.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default().content(turn.text.clone()).build()?.into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default().content(turn.text.clone()).build()?.into(),
            };

            messages.push(message);
        }

        let mut builder = CreateChatCompletionRequestArgs::default();

        builder
            .model(&self.config.openai_model)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens);

        if !request.stop.is_empty() {
            builder.stop(Stop::StringArray(request.stop.clone()));
        }

        builder.build()
    }
}

#[async_trait]
impl GenericLlmClient for OpenAiLlmClient {
    #[instrument(name = "OpenAiLlmClient::complete", skip_all)]
    async fn complete(&self, request: &PromptRequest) -> Result<String, CompletionError> {
        let request = self.build_request(request).map_err(classify_openai_error)?;
        let limit = self.config.openai_timeout();

        let response = match timeout(limit, self.client.chat().create(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(classify_openai_error(err)),
            Err(_) => return Err(CompletionError::Unreachable(format!("Timed out after {}s", limit.as_secs()))),
        };

        debug!("Generated response: {response:?}");

        let text = first_choice_text(&response).ok_or(CompletionError::Empty)?;

        info!("Completion returned {} characters.", text.len());

        Ok(text)
    }
}

/// Map a client error onto the completion error taxonomy.
fn classify_openai_error(err: OpenAIError) -> CompletionError {
    match err {
        OpenAIError::Reqwest(err) => CompletionError::Unreachable(err.to_string()),
        OpenAIError::ApiError(err) => CompletionError::Backend(err.message),
        other => CompletionError::Backend(other.to_string()),
    }
}

/// Extract the text of the first choice, if any.
fn first_choice_text(response: &CreateChatCompletionResponse) -> Option<String> {
    response.choices.first().and_then(|choice| choice.message.content.clone())
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{
        config::ConfigInner,
        types::Turn,
    };

    fn create_test_config() -> Config {
        Config {
            inner: Arc::new(ConfigInner {
                openai_api_endpoint: "http://127.0.0.1:9/v1".to_string(),
                openai_model: "test-model".to_string(),
                openai_timeout_secs: 5,
                ..Default::default()
            }),
        }
    }

    fn create_test_request() -> PromptRequest {
        PromptRequest {
            system: "Be brief.".to_string(),
            turns: vec![
                Turn { role: Role::User, text: "@alice:example.org: hello".to_string() },
                Turn { role: Role::Assistant, text: "@relay:example.org: hi".to_string() },
            ],
            stop: vec!["\n@relay:example.org:".to_string(), "<|im_end|>".to_string()],
            temperature: 0.2,
            max_tokens: 32,
        }
    }

    #[test]
    fn test_build_request_carries_parameters() {
        let client = OpenAiLlmClient::new(&create_test_config());

        let request = client.build_request(&create_test_request()).unwrap();
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "test-model");
        assert_eq!(value["max_tokens"], 32);
        assert_eq!(value["stop"], serde_json::json!(["\n@relay:example.org:", "<|im_end|>"]));
        assert!((value["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);

        let messages = value["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Be brief.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "@alice:example.org: hello");
        assert_eq!(messages[2]["role"], "assistant");
    }

    #[test]
    fn test_build_request_without_stop_markers() {
        let client = OpenAiLlmClient::new(&create_test_config());
        let mut request = create_test_request();
        request.stop.clear();

        let value = serde_json::to_value(client.build_request(&request).unwrap()).unwrap();

        assert!(value.get("stop").is_none_or(|stop| stop.is_null()));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let client = LlmClient::openai(&create_test_config());

        let result = client.complete(&create_test_request()).await;

        assert!(matches!(result, Err(CompletionError::Unreachable(_))), "got {result:?}");
    }
}
