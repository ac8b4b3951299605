//! WhatsApp Cloud API (Meta Graph) transport.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Transport, TransportError};
use crate::config::MetaConfig;
use crate::core::{InboundEvent, OutboundChunk};
use crate::error::Error;

pub struct MetaTransport {
    client: Client,
    messages_url: String,
    token: String,
}

#[derive(Serialize)]
struct TextMessage<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Serialize)]
struct TextBody<'a> {
    preview_url: bool,
    body: &'a str,
}

#[derive(Serialize)]
struct TypingIndicator<'a> {
    messaging_product: &'static str,
    status: &'static str,
    message_id: &'a str,
    typing_indicator: IndicatorKind,
}

#[derive(Serialize)]
struct IndicatorKind {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl MetaTransport {
    pub fn new(config: &MetaConfig) -> Result<Self, Error> {
        let token = config
            .jwt_token
            .clone()
            .ok_or_else(|| Error::Config("Meta JWT token is not configured".to_string()))?;
        let number_id = config
            .number_id
            .as_deref()
            .ok_or_else(|| Error::Config("Meta number id is not configured".to_string()))?;

        Ok(Self {
            client: Client::new(),
            messages_url: messages_url(&config.graph_url, &config.version, number_id),
            token,
        })
    }

    async fn post<T: Serialize>(&self, payload: &T) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.messages_url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Api(format!("{}: {}", status, body)))
    }
}

fn messages_url(graph_url: &str, version: &str, number_id: &str) -> String {
    format!(
        "{}/{}/{}/messages",
        graph_url.trim_end_matches('/'),
        version,
        number_id
    )
}

#[async_trait]
impl Transport for MetaTransport {
    fn name(&self) -> &str {
        "meta"
    }

    async fn send(&self, to: &str, chunk: &OutboundChunk) -> Result<(), TransportError> {
        if to.trim().is_empty() {
            return Err(TransportError::InvalidRecipient(to.to_string()));
        }
        self.post(&TextMessage {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            kind: "text",
            text: TextBody {
                preview_url: false,
                body: &chunk.body,
            },
        })
        .await
    }

    async fn notify_composing(&self, event: &InboundEvent) -> Result<(), TransportError> {
        // The typing indicator rides on a read receipt, which needs the id.
        let Some(message_id) = event.message_id.as_deref() else {
            return Ok(());
        };
        self.post(&TypingIndicator {
            messaging_product: "whatsapp",
            status: "read",
            message_id,
            typing_indicator: IndicatorKind { kind: "text" },
        })
        .await
    }
}
