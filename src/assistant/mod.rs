//! Conversational support assistant.
//!
//! [`AssistantClient`] owns the chat history and the retry policy; the wire
//! protocol lives behind [`ChatBackend`] so the retry logic can be tested
//! without a network.

mod client;
mod gemini;

pub use client::{
    AssistantClient, MemoryScope, Reply, RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
    FALLBACK_REPLY,
};
pub use gemini::{
    GeminiBackend, GenerationSettings, HarmThreshold, SafetySetting, DEFAULT_MODEL, SUPPORT_PERSONA,
};

#[cfg(test)]
pub(crate) use client::testing;

use thiserror::Error;

use crate::conversation::ConversationTurn;

/// Errors from a chat backend
#[derive(Debug, Error)]
pub enum ChatError {
    /// Overload or quota exhaustion; worth retrying after a pause
    #[error("Service temporarily unavailable: {0}")]
    Transient(String),

    #[error("Chat request failed: {0}")]
    Fatal(String),
}

impl ChatError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// One request/response exchange with a remote text-generation model
pub trait ChatBackend {
    /// Generate a reply to `user_text`, given the prior turns of the session
    fn generate(&self, history: &[ConversationTurn], user_text: &str) -> Result<String, ChatError>;
}
