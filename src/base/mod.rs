//! Core components, types, and utilities for the relay.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Default prompt and notice texts.
//! - Common types, typed errors, and result handling.

pub mod config;
pub mod error;
pub mod prompts;
pub mod types;
