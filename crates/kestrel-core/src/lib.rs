//! # Kestrel Core
//!
//! Session state management for the OpenRouter chat-completion API.
//! Owns the conversation history, model catalog, and usage accounting;
//! the CLI crate is a thin shell over this one.

pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod model;
pub mod session;
