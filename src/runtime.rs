//! Runtime services and shared state for the relay.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Event, Res, Void},
    },
    interaction::orchestrator::Orchestrator,
    service::{chat::ChatClient, llm::LlmClient, tokenizer::Tokenizer},
};

/// Number of events buffered between the listener and the pipeline.
const EVENT_BUFFER: usize = 256;

/// Runtime service context that can be shared across the application.
///
/// This struct holds the chat, LLM, and tokenizer clients plus the configuration.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The LLM client instance.
    pub llm: LlmClient,
    /// The tokenizer instance.
    pub tokenizer: Tokenizer,
    /// The chat client instance.
    pub chat: ChatClient,
    /// Events older than this are never answered.
    pub spawn_time: DateTime<Utc>,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        let spawn_time = Utc::now();

        // Initialize the LLM client.
        let llm = LlmClient::openai(&config);

        // Initialize the tokenizer.
        let tokenizer = Tokenizer::from_config(&config);

        // Initialize the matrix client (this logs in).
        let chat = ChatClient::matrix(&config).await?;

        Ok(Self {
            config,
            llm,
            tokenizer,
            chat,
            spawn_time,
        })
    }

    /// Join the configured room and relay events until Ctrl-C or the listener stops.
    pub async fn start(&self) -> Void {
        let room_id = self.chat.join(&self.config.room).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let chat = self.chat.clone();
        let listener = tokio::spawn(async move { chat.listen(tx).await }.in_current_span());

        let mut orchestrator = Orchestrator::new(&self.config, room_id, self.spawn_time, self.chat.clone(), self.llm.clone(), self.tokenizer.clone());

        // Ctrl-C cancels the shutdown token; the in-flight event still clears its typing indicator.

        let shutdown = orchestrator.shutdown_token();
        let signal = tokio::spawn(
            async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Received Ctrl-C, shutting down ..."),
                    Err(err) => error!("Failed to listen for Ctrl-C, shutting down: {err}"),
                }

                shutdown.cancel();
            }
            .in_current_span(),
        );

        process_events(&mut orchestrator, rx).await;

        signal.abort();
        listener.abort();

        match listener.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Feed events to the orchestrator one at a time.
///
/// Returns when the event stream closes or the orchestrator's shutdown token is cancelled. A
/// failure while handling one event is logged and does not affect the next.
pub async fn process_events(orchestrator: &mut Orchestrator, mut events: mpsc::Receiver<Event>) {
    let shutdown = orchestrator.shutdown_token();

    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };

        let Some(event) = event else {
            warn!("Event stream closed.");
            break;
        };

        if let Err(err) = orchestrator.handle_event(event).await {
            error!("Error while handling: {}", err);
        }
    }
}
