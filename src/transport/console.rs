//! Stdout transport for local runs.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{Transport, TransportError};
use crate::core::{InboundEvent, OutboundChunk};

/// Prints every chunk to stdout, one block per chunk.
pub struct ConsoleTransport {
    out: Mutex<tokio::io::Stdout>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    fn max_message_len(&self) -> usize {
        usize::MAX
    }

    async fn send(&self, _to: &str, chunk: &OutboundChunk) -> Result<(), TransportError> {
        let mut out = self.out.lock().await;
        out.write_all(format!("{}\n\n", chunk.body).as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }

    async fn notify_composing(&self, event: &InboundEvent) -> Result<(), TransportError> {
        tracing::debug!("Composing reply for {}", event.sender_id);
        Ok(())
    }
}
