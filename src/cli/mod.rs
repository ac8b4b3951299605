//! CLI commands using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{self, Settings};
use crate::core::{split_reply, InboundEvent, PendingTurn, Replier, UserId};
use crate::daemon::{build_dispatcher, open_store, run_relay};
use crate::state::ConversationState;
use crate::transport::{ConsoleTransport, Transport};

/// Assistant Relay - chat channels in front of an AI assistant.
#[derive(Parser)]
#[command(name = "assistant-relay")]
#[command(version)]
#[command(about = "Relay chat messages to an AI assistant, one turn per user at a time", long_about = None)]
pub struct Commands {
    /// Settings file (defaults to ~/.assistant-relay/settings.json)
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the relay (web server plus the configured channel)
    Start,

    /// Send one message through the assistant and print the reply chunks
    Ask {
        /// Message to send
        message: String,

        /// Conversation to continue
        #[arg(long, default_value = "cli")]
        user: String,
    },

    /// Split text from stdin into reply chunks
    Split,

    /// Show effective settings with secrets masked
    Config,
}

impl Commands {
    /// Settings from `--config` (or the default file) plus the environment.
    pub fn load_settings(&self) -> Result<Settings> {
        Ok(config::load_settings(self.config.as_deref())?)
    }

    /// Run the command.
    pub async fn run(&self, settings: Settings) -> Result<()> {
        match &self.command {
            Command::Start => cmd_start(settings).await,
            Command::Ask { message, user } => cmd_ask(settings, message, user).await,
            Command::Split => cmd_split(),
            Command::Config => cmd_config(&settings),
        }
    }
}

// Command implementations

async fn cmd_start(settings: Settings) -> Result<()> {
    tracing::info!(
        "Starting relay on {}:{} ({:?} channel)",
        settings.server.host,
        settings.server.port,
        settings.channel.kind
    );
    run_relay(settings).await?;
    tracing::info!("Relay stopped");
    Ok(())
}

async fn cmd_ask(settings: Settings, message: &str, user: &str) -> Result<()> {
    let dispatcher = build_dispatcher(&settings)?;
    let store = open_store(&settings)?;

    let transport: Arc<dyn Transport> = Arc::new(ConsoleTransport::new());
    let event = InboundEvent::new("cli", user, user, message);
    let state = ConversationState::new(UserId::from(user), store);
    let replier = Replier::new(transport.clone(), user);
    let turn = PendingTurn::new(event, state, replier, transport);

    let report = dispatcher.dispatch(turn).await?;
    tracing::debug!(
        "Turn {} done: {} chunk(s) from {} bytes",
        report.turn_id,
        report.chunks_sent,
        report.reply_len
    );
    if report.chunks_sent == 0 {
        eprintln!("(empty reply)");
    }
    Ok(())
}

fn cmd_split() -> Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    let chunks: Vec<String> = split_reply(&input).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        println!("--- chunk {}/{} ---", i + 1, chunks.len());
        println!("{}", chunk);
    }
    Ok(())
}

fn cmd_config(settings: &Settings) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
    Ok(())
}
