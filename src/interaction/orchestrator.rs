//! Per-event pipeline for the monitored room.
//!
//! Each event is classified, recorded, and (when the bot is mentioned) answered:
//! filter -> history -> prompt -> heartbeat start -> completion -> heartbeat stop -> publish.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        error::PromptError,
        types::{AdmissionDecision, Event, Outcome, Relation, Res},
    },
    interaction::{completion::CompletionInvoker, filter::EventFilter, heartbeat::TypingHeartbeat, history::ConversationHistory, prompt::PromptAssembler},
    service::{chat::ChatClient, llm::LlmClient, tokenizer::Tokenizer},
};

/// Pipeline state for one room.
///
/// Events must be handled one at a time; `handle_event` takes `&mut self`, so there is at most
/// one generation (and one heartbeat) in flight.
pub struct Orchestrator {
    config: Config,
    room_id: String,
    chat: ChatClient,
    tokenizer: Tokenizer,
    filter: EventFilter,
    history: ConversationHistory,
    assembler: PromptAssembler,
    invoker: CompletionInvoker,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create a pipeline for `room_id`, ignoring events older than `spawn_time`.
    pub fn new(config: &Config, room_id: impl Into<String>, spawn_time: DateTime<Utc>, chat: ChatClient, llm: LlmClient, tokenizer: Tokenizer) -> Self {
        let room_id = room_id.into();
        let bot_user_id = chat.bot_user_id().to_string();

        Self {
            config: config.clone(),
            filter: EventFilter::new(room_id.clone(), bot_user_id.clone(), spawn_time),
            history: ConversationHistory::new(config.history_size),
            assembler: PromptAssembler::new(config, bot_user_id.clone()),
            invoker: CompletionInvoker::new(llm, bot_user_id),
            room_id,
            chat,
            tokenizer,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the pipeline.
    ///
    /// Cancelling it abandons an in-flight completion (the typing indicator is still cleared)
    /// and makes [`crate::runtime::process_events`] return before the next event.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The recorded conversation.
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Handle a single incoming event.
    ///
    /// Completion failures and context overflow are reported through the [`Outcome`]; errors
    /// from publishing to the room (or from the tokenizer) are returned.
    #[instrument(skip_all, fields(event_id = %event.event_id))]
    pub async fn handle_event(&mut self, event: Event) -> Res<Outcome> {
        debug!("New event from {}: {:?}", event.sender, event.body);

        let decision = self.filter.classify(&event);

        if let AdmissionDecision::Ignore(reason) = decision {
            let related = event.relation.as_ref().and_then(Relation::target);
            debug!("Ignoring event: {reason:?} (related to {related:?}).");
            return Ok(Outcome::FilteredOut(reason));
        }

        // The triggering event is part of its own context.

        let event_id = event.event_id.clone();
        self.history.record(event);
        debug!("History has {} of {} events.", self.history.len(), self.history.capacity());

        if let Err(err) = self.chat.mark_read(&self.room_id, &event_id).await {
            warn!("Failed to update read markers: {err}");
        }

        if decision != AdmissionDecision::RecordAndRespond {
            debug!("Recorded without responding.");
            return Ok(Outcome::Recorded);
        }

        // Assemble the prompt.

        let request = match self.assembler.assemble(self.history.snapshot(), &self.tokenizer).await {
            Ok(request) => request,
            Err(PromptError::ContextOverflow { tokens, budget }) => {
                info!("Prompt is {tokens} tokens (budget {budget}), sending overflow notice.");
                self.chat.send_emote(&self.room_id, &self.config.overflow_notice).await?;
                return Ok(Outcome::Overflowed);
            }
            Err(err) => return Err(err.into()),
        };

        // Generate with the typing indicator up; it comes down before anything else happens.

        let mut heartbeat = TypingHeartbeat::new(self.chat.clone(), self.room_id.clone(), self.config.heartbeat_interval(), self.config.typing_timeout());
        heartbeat.start()?;

        let result = tokio::select! {
            result = self.invoker.invoke(&request) => Some(result),
            _ = self.shutdown.cancelled() => None,
        };

        heartbeat.stop().await;

        let Some(result) = result else {
            info!("Shutting down, abandoning completion.");
            return Ok(Outcome::Cancelled);
        };

        match result {
            Ok(reply) => {
                self.chat.send_message(&self.room_id, &reply).await?;
                info!("Sent reply ({} characters).", reply.len());
                Ok(Outcome::Replied(reply))
            }
            Err(err) => {
                warn!("Dropping turn: {err}");
                Ok(Outcome::CompletionFailed(err))
            }
        }
    }
}
