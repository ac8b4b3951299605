//! Chat transports: where messages come from and where replies go.

use async_trait::async_trait;
use thiserror::Error;

pub mod console;
pub mod meta;
pub mod telegram;

pub use console::ConsoleTransport;
pub use meta::MetaTransport;
pub use telegram::{run_polling, TelegramTransport};

use crate::core::{InboundEvent, OutboundChunk};

/// Both Telegram and WhatsApp cap text messages at 4096 characters.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4096;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name.
    fn name(&self) -> &str;

    /// Longest text a single message may carry.
    fn max_message_len(&self) -> usize {
        DEFAULT_MAX_MESSAGE_LEN
    }

    /// Deliver one chunk to `to`.
    async fn send(&self, to: &str, chunk: &OutboundChunk) -> Result<(), TransportError>;

    /// Tell the sender of `event` that a reply is being composed.
    async fn notify_composing(&self, event: &InboundEvent) -> Result<(), TransportError>;
}
