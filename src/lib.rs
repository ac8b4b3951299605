//! Assistant Relay library root.

pub mod cli;
pub mod config;
pub mod core;
pub mod daemon;
pub mod error;
pub mod ingress;
pub mod logging;
pub mod providers;
pub mod state;
pub mod transport;
pub mod web;

#[cfg(test)]
mod testing;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use core::{split_reply, Dispatcher, QueueManager, UserId};
pub use daemon::run_relay;
pub use error::{Error, Result};
pub use ingress::Ingress;
pub use providers::{Assistant, ProviderError};
pub use transport::{Transport, TransportError};
