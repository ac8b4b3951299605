//! Telegram transport - simple polling version.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatAction;

use super::{Transport, TransportError};
use crate::core::{InboundEvent, OutboundChunk};
use crate::ingress::Ingress;

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }
}

fn parse_chat_id(raw: &str) -> Result<ChatId, TransportError> {
    raw.trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| TransportError::InvalidRecipient(raw.to_string()))
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, to: &str, chunk: &OutboundChunk) -> Result<(), TransportError> {
        let chat_id = parse_chat_id(to)?;
        self.bot.send_message(chat_id, chunk.body.clone()).await?;
        Ok(())
    }

    async fn notify_composing(&self, event: &InboundEvent) -> Result<(), TransportError> {
        let chat_id = parse_chat_id(&event.reply_to)?;
        self.bot.send_chat_action(chat_id, ChatAction::Typing).await?;
        Ok(())
    }
}

/// Long-poll Telegram and hand every text message to `ingress`.
///
/// Returns when the dispatcher stops (Ctrl-C).
pub async fn run_polling(bot: Bot, ingress: Ingress) {
    tracing::info!("Starting Telegram polling...");

    teloxide::repl(bot, move |msg: Message| {
        let ingress = ingress.clone();
        async move {
            match event_from_message(&msg) {
                Some(event) => ingress.handle(event).await,
                None => tracing::debug!("Ignoring non-text Telegram message {}", msg.id.0),
            }
            respond(())
        }
    })
    .await;
}

fn event_from_message(msg: &Message) -> Option<InboundEvent> {
    let user = msg.from.as_ref()?;
    event_from_parts(
        user.id.0,
        Some(user.full_name()),
        msg.chat.id.0,
        msg.id.0,
        msg.text()?,
    )
}

fn event_from_parts(
    sender_id: u64,
    sender_name: Option<String>,
    chat_id: i64,
    message_id: i32,
    text: &str,
) -> Option<InboundEvent> {
    if text.trim().is_empty() {
        return None;
    }
    let mut event = InboundEvent::new(
        "telegram",
        &sender_id.to_string(),
        &chat_id.to_string(),
        text,
    );
    event.sender_name = sender_name;
    event.message_id = Some(message_id.to_string());
    Some(event)
}
