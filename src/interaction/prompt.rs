//! Prompt assembly from the preprompt and conversation history.

use tracing::{debug, instrument};

use crate::{
    base::{
        config::Config,
        error::PromptError,
        types::{Event, PromptRequest, Role, Turn},
    },
    service::tokenizer::Tokenizer,
};

/// Builds completion requests for one bot identity.
///
/// Building is deterministic: the same preprompt, history, and identity always produce the
/// same request.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    preprompt: String,
    bot_user_id: String,
    end_of_turn_marker: String,
    temperature: f32,
    max_tokens: u32,
    context_token_budget: usize,
}

impl PromptAssembler {
    pub fn new(config: &Config, bot_user_id: impl Into<String>) -> Self {
        Self {
            preprompt: config.preprompt.clone(),
            bot_user_id: bot_user_id.into(),
            end_of_turn_marker: config.end_of_turn_marker.clone(),
            temperature: config.openai_temperature,
            max_tokens: config.openai_max_tokens,
            context_token_budget: config.context_token_budget,
        }
    }

    /// Build a request with one turn per history entry.
    ///
    /// Events from the bot become assistant turns; everything else is a user turn. Each turn
    /// reads `"{sender}: {body}"`.
    pub fn build<'a>(&self, history: impl IntoIterator<Item = &'a Event>) -> PromptRequest {
        let turns = history
            .into_iter()
            .map(|event| Turn {
                role: if event.sender == self.bot_user_id { Role::Assistant } else { Role::User },
                text: format!("{}: {}", event.sender, event.body),
            })
            .collect();

        PromptRequest {
            system: self.preprompt.clone(),
            turns,
            stop: self.stop_markers(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Build a request and check it against the context budget.
    #[instrument(name = "PromptAssembler::assemble", skip_all)]
    pub async fn assemble<'a>(&self, history: impl IntoIterator<Item = &'a Event>, tokenizer: &Tokenizer) -> Result<PromptRequest, PromptError> {
        let request = self.build(history);
        let tokens = tokenizer.count_tokens(&request.render()).await.map_err(PromptError::Tokenizer)?;

        debug!("Prompt has {} turns and {} tokens.", request.turns.len(), tokens);

        if tokens > self.context_token_budget {
            return Err(PromptError::ContextOverflow {
                tokens,
                budget: self.context_token_budget,
            });
        }

        Ok(request)
    }

    /// Stop when the model starts speaking as the bot again, or emits the end-of-turn marker.
    fn stop_markers(&self) -> Vec<String> {
        let mut stop = vec![format!("\n{}:", self.bot_user_id)];

        if !self.end_of_turn_marker.is_empty() {
            stop.push(self.end_of_turn_marker.clone());
        }

        stop
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::base::config::ConfigInner;

    const BOT: &str = "@relay:example.org";

    fn config(budget: usize) -> Config {
        Config {
            inner: Arc::new(ConfigInner {
                preprompt: "Be brief.".to_string(),
                context_token_budget: budget,
                openai_temperature: 0.3,
                openai_max_tokens: 64,
                ..Default::default()
            }),
        }
    }

    fn event(sender: &str, body: &str) -> Event {
        Event::new("$e", sender, body, Utc::now(), "!room:example.org", json!({ "body": body }))
    }

    #[test]
    fn test_build_roles_and_text() {
        let assembler = PromptAssembler::new(&config(1000), BOT);
        let history = [event("@alice:example.org", "hello"), event(BOT, "hi alice"), event("@bob:example.org", "yo")];

        let request = assembler.build(&history);

        assert_eq!(request.system, "Be brief.");
        assert_eq!(
            request.turns,
            vec![
                Turn { role: Role::User, text: "@alice:example.org: hello".to_string() },
                Turn { role: Role::Assistant, text: format!("{BOT}: hi alice") },
                Turn { role: Role::User, text: "@bob:example.org: yo".to_string() },
            ]
        );
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.max_tokens, 64);
    }

    #[test]
    fn test_build_stop_markers() {
        let assembler = PromptAssembler::new(&config(1000), BOT);

        let request = assembler.build(std::iter::empty());

        assert!(request.stop.iter().any(|s| s.contains(BOT)));
        assert!(request.stop.contains(&"<|im_end|>".to_string()));
    }

    #[test]
    fn test_build_is_deterministic() {
        let assembler = PromptAssembler::new(&config(1000), BOT);
        let history = [event("@alice:example.org", "one"), event(BOT, "two")];

        assert_eq!(assembler.build(&history), assembler.build(&history));
        assert_eq!(assembler.build(&history).render(), assembler.build(&history).render());
    }

    #[tokio::test]
    async fn test_assemble_within_budget() {
        let assembler = PromptAssembler::new(&config(1000), BOT);
        let history = [event("@alice:example.org", "hello")];

        let request = assembler.assemble(&history, &Tokenizer::estimate()).await.unwrap();

        assert_eq!(request.turns.len(), 1);
    }

    #[tokio::test]
    async fn test_assemble_reports_overflow() {
        let assembler = PromptAssembler::new(&config(5), BOT);
        let history = [event("@alice:example.org", &"word ".repeat(50))];

        let result = assembler.assemble(&history, &Tokenizer::estimate()).await;

        assert!(matches!(result, Err(PromptError::ContextOverflow { budget: 5, tokens }) if tokens > 5));
    }
}
