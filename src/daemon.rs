//! Relay daemon: wires backend, queue, transport and web server together.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ChannelKind, Settings};
use crate::core::{Dispatcher, QueueManager};
use crate::error::{Error, Result};
use crate::ingress::Ingress;
use crate::providers::create_assistant;
use crate::state::StateStore;
use crate::transport::{run_polling, MetaTransport, TelegramTransport, Transport};
use crate::web::{run_server, AppState, WebServerConfig, WebhookState};

/// Build the dispatch pipeline shared by the daemon and one-shot commands.
pub fn build_dispatcher(settings: &Settings) -> Result<Arc<Dispatcher>> {
    settings.validate_assistant()?;
    let assistant = create_assistant(&settings.assistant)?;
    tracing::info!(
        "Using {} backend (assistant '{}')",
        assistant.name(),
        settings.assistant.assistant_id
    );
    Ok(Arc::new(Dispatcher::new(
        assistant,
        settings.assistant.assistant_id.clone(),
    )))
}

/// Open the configured state store.
pub fn open_store(settings: &Settings) -> Result<Arc<StateStore>> {
    let path = settings.storage.resolved_path()?;
    Ok(Arc::new(StateStore::open(&path)?))
}

/// Run until Ctrl-C, then give queued turns a grace period to finish.
pub async fn run_relay(settings: Settings) -> Result<()> {
    settings.validate_channel()?;

    let store = open_store(&settings)?;
    let queue = QueueManager::new(build_dispatcher(&settings)?);

    let web_config = WebServerConfig::from(&settings.server);
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown requested");
    };

    match settings.channel.kind {
        ChannelKind::Meta => {
            let meta = &settings.channel.meta;
            let transport: Arc<dyn Transport> = Arc::new(MetaTransport::new(meta)?);
            let ingress = Ingress::new(queue.clone(), store, transport);
            let state = AppState {
                queue: queue.clone(),
                webhook: Some(WebhookState {
                    ingress,
                    verify_token: meta.verify_token.clone().unwrap_or_default(),
                }),
            };
            tracing::info!("Relay listening for Meta webhooks");
            run_server(web_config, state, shutdown).await?;
        }
        ChannelKind::Telegram => {
            let token = settings
                .channel
                .telegram
                .bot_token
                .clone()
                .ok_or_else(|| Error::Config("Telegram bot token missing".to_string()))?;
            let telegram = Arc::new(TelegramTransport::new(token));
            let bot = telegram.bot();
            let transport: Arc<dyn Transport> = telegram;
            let ingress = Ingress::new(queue.clone(), store, transport);
            let state = AppState {
                queue: queue.clone(),
                webhook: None,
            };

            tokio::select! {
                result = run_server(web_config, state, shutdown) => result?,
                _ = run_polling(bot, ingress) => {
                    tracing::info!("Telegram polling stopped");
                }
            }
        }
    }

    drain_with_grace(&queue, Duration::from_secs(settings.server.shutdown_grace_secs)).await;
    Ok(())
}

async fn drain_with_grace(queue: &QueueManager, grace: Duration) {
    let stats = queue.stats().await;
    if stats.active_users == 0 {
        return;
    }
    tracing::info!(
        "Waiting up to {}s for {} active user(s), {} pending turn(s)",
        grace.as_secs(),
        stats.active_users,
        stats.pending_turns
    );
    if tokio::time::timeout(grace, queue.wait_idle()).await.is_err() {
        let stats = queue.stats().await;
        tracing::warn!(
            "Grace period elapsed; abandoning {} queued turn(s) across {} user(s)",
            stats.pending_turns,
            stats.active_users
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UserId;
    use crate::testing::{turn_for, RecordingTransport, ScriptedAssistant};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drain_waits_for_queued_turns() {
        let assistant = ScriptedAssistant::with_delay(
            |m| Ok(m.to_string()),
            Duration::from_millis(20),
        );
        let queue = QueueManager::new(Arc::new(Dispatcher::new(assistant, "asst")));
        let transport = RecordingTransport::new();
        for body in ["a", "b", "c"] {
            queue
                .enqueue(UserId::from("u"), turn_for("u", body, transport.clone()))
                .await;
        }

        drain_with_grace(&queue, Duration::from_secs(10)).await;
        assert_eq!(transport.bodies(), vec!["a", "b", "c"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drain_gives_up_after_grace() {
        let assistant = ScriptedAssistant::with_delay(
            |m| Ok(m.to_string()),
            Duration::from_secs(5),
        );
        let queue = QueueManager::new(Arc::new(Dispatcher::new(assistant, "asst")));
        let transport = RecordingTransport::new();
        queue
            .enqueue(UserId::from("u"), turn_for("u", "slow", transport.clone()))
            .await;

        drain_with_grace(&queue, Duration::from_millis(50)).await;
        assert!(transport.bodies().is_empty());
    }

    #[tokio::test]
    async fn test_meta_channel_requires_credentials() {
        let err = run_relay(Settings::default()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
