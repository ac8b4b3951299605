//! Assistant backend trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::state::ConversationState;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Conversation state error: {0}")]
    State(String),

    #[error("Timeout")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

impl From<crate::error::Error> for ProviderError {
    fn from(e: crate::error::Error) -> Self {
        ProviderError::State(e.to_string())
    }
}

/// Turns one user message into one reply.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Provider name.
    fn name(&self) -> &str;

    /// Ask `assistant_id` to answer `message`, continuing the conversation
    /// kept in `state`.
    async fn ask(
        &self,
        assistant_id: &str,
        message: &str,
        state: &ConversationState,
    ) -> Result<String>;
}
