//! Chatrelay - streaming chat relay with web enrichment
//!
//! Accepts a conversation over `POST /api/chat`, optionally enriches it with
//! search results when the latest user turn mentions a trigger term, and
//! streams the model's reply back as server-sent events.

pub mod chat;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod generation;
pub mod relay;
pub mod testing;

pub use error::RelayError;
