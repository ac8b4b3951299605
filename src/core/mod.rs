//! Core module - per-user queueing, dispatch, and reply splitting.
//!
//! This module contains the heart of the relay's message processing:
//! - Per-user FIFO queues with one drain loop per user
//! - The dispatcher that turns one message into one reply
//! - Reply splitting into chat-sized chunks

pub mod dispatcher;
pub mod queue;
pub mod splitter;
pub mod turn;

pub use dispatcher::{DispatchError, DispatchReport, Dispatcher};
pub use queue::{QueueManager, QueueStats};
pub use splitter::{fit_to_limit, split_reply, Chunks};
pub use turn::{InboundEvent, OutboundChunk, PendingTurn, Replier, UserId};
