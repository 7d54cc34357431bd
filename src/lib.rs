//! Library root for `llm-relay`.
//!
//! The relay watches a single Matrix room and answers messages that mention it, using an
//! OpenAI-compatible completion backend (for example a local llama.cpp server):
//! - Filters incoming events (backlog, other rooms, edits, threads, self-authored)
//! - Keeps a bounded history of recent messages as context
//! - Shows a typing indicator while a reply is generated
//! - Publishes the cleaned-up reply to the room
//!
//! The chat, LLM, and tokenizer integrations sit behind traits, so each can be swapped or
//! mocked independently of the pipeline.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the relay runtime:
/// - Creates the runtime context with chat, LLM, and tokenizer clients
/// - Joins the configured room
/// - Starts the main event loop for processing messages
pub async fn start(config: Config) -> Void {
    info!("Starting llm-relay ...");

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
