//! Message dispatcher: one turn in, one (possibly multi-part) reply out.

use std::sync::Arc;
use thiserror::Error;

use super::splitter::{fit_to_limit, split_reply};
use super::turn::{OutboundChunk, PendingTurn};
use crate::providers::{Assistant, ProviderError};
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Backend error: {0}")]
    Backend(#[from] ProviderError),

    #[error("Send failed after {sent} chunk(s): {source}")]
    Transport {
        sent: usize,
        #[source]
        source: TransportError,
    },
}

/// What one successful turn did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub turn_id: String,
    pub reply_len: usize,
    pub chunks_sent: usize,
}

pub struct Dispatcher {
    assistant: Arc<dyn Assistant>,
    assistant_id: String,
}

impl Dispatcher {
    pub fn new(assistant: Arc<dyn Assistant>, assistant_id: impl Into<String>) -> Self {
        Self {
            assistant,
            assistant_id: assistant_id.into(),
        }
    }

    /// Process one turn: typing signal, backend call, split, ordered sends.
    pub async fn dispatch(&self, turn: PendingTurn) -> Result<DispatchReport, DispatchError> {
        let PendingTurn {
            id,
            event,
            state,
            replier,
            transport,
        } = turn;

        if let Err(e) = transport.notify_composing(&event).await {
            tracing::warn!("Presence signal failed for turn {}: {}", id, e);
        }

        let reply = self
            .assistant
            .ask(&self.assistant_id, &event.body, &state)
            .await?;
        tracing::debug!("Got reply for turn {} ({} bytes)", id, reply.len());

        let limit = replier.max_message_len();
        let mut sent = 0;
        for chunk in split_reply(&reply) {
            for piece in fit_to_limit(&chunk, limit) {
                replier
                    .send(&OutboundChunk::new(piece))
                    .await
                    .map_err(|source| DispatchError::Transport { sent, source })?;
                sent += 1;
            }
        }

        Ok(DispatchReport {
            turn_id: id,
            reply_len: reply.len(),
            chunks_sent: sent,
        })
    }
}
