//! Event handling for the relay.
//!
//! This module provides the message pipeline for the monitored room:
//! - Admission of incoming events
//! - Bounded conversation history and prompt assembly
//! - Completion calls with a typing heartbeat
//! - Coordinating responses between services (LLM, tokenizer, chat)

pub mod completion;
pub mod filter;
pub mod heartbeat;
pub mod history;
pub mod orchestrator;
pub mod prompt;
