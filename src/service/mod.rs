//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for various services used by the relay:
//! - Chat services (e.g., Matrix)
//! - LLM services (e.g., OpenAI-compatible endpoints)
//! - Tokenizers (e.g., llama.cpp server, character estimate)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod llm;
pub mod tokenizer;
