//! API endpoints module.

pub mod queue;
pub mod webhook;

pub use queue::queue_stats;
pub use webhook::{receive_webhook, verify_webhook};
