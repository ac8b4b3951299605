//! WhatsApp Cloud API webhook: subscription handshake and message delivery.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::core::InboundEvent;
use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Answer the subscription handshake with the challenge when the token matches.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<String, StatusCode> {
    let webhook = state.webhook.as_ref().ok_or(StatusCode::NOT_FOUND)?;

    let subscribing = query.mode.as_deref() == Some("subscribe");
    let token_ok = query.verify_token.as_deref() == Some(webhook.verify_token.as_str());
    match (subscribing && token_ok, query.challenge) {
        (true, Some(challenge)) => {
            tracing::info!("Webhook verified");
            Ok(challenge)
        }
        _ => {
            tracing::warn!("Webhook verification rejected");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// Queue every text message in the delivery. Acknowledges before any reply is produced.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    let Some(webhook) = state.webhook.as_ref() else {
        return StatusCode::NOT_FOUND;
    };

    let events = extract_events(&payload);
    if events.is_empty() {
        tracing::debug!("Webhook delivery carried no text messages");
    }
    for event in events {
        webhook.ingress.handle(event).await;
    }
    StatusCode::OK
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub from: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<TextBody>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// Text messages in delivery order. Status updates and media are skipped.
pub fn extract_events(payload: &WebhookPayload) -> Vec<InboundEvent> {
    let mut events = Vec::new();
    for value in payload
        .entry
        .iter()
        .flat_map(|entry| entry.changes.iter())
        .map(|change| &change.value)
    {
        for message in &value.messages {
            if message.kind.as_deref().is_some_and(|kind| kind != "text") {
                continue;
            }
            let Some(text) = &message.text else {
                continue;
            };

            let mut event = InboundEvent::new("meta", &message.from, &message.from, &text.body);
            event.message_id = message.id.clone();
            event.sender_name = value
                .contacts
                .iter()
                .find(|contact| contact.wa_id == message.from)
                .and_then(|contact| contact.profile.as_ref())
                .and_then(|profile| profile.name.clone());
            events.push(event);
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> WebhookPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_extract_text_messages() {
        let payload = payload(
            r#"{
                "object": "whatsapp_business_account",
                "entry": [{"changes": [{"value": {
                    "contacts": [{"wa_id": "5511999", "profile": {"name": "Ana"}}],
                    "messages": [
                        {"from": "5511999", "id": "wamid.1", "type": "text", "text": {"body": "hola"}},
                        {"from": "5511999", "id": "wamid.2", "type": "image", "image": {"id": "x"}},
                        {"from": "5511999", "id": "wamid.3", "type": "text", "text": {"body": "otra"}}
                    ]
                }}]}]
            }"#,
        );

        let events = extract_events(&payload);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].body, "hola");
        assert_eq!(events[0].sender_id, "5511999");
        assert_eq!(events[0].reply_to, "5511999");
        assert_eq!(events[0].message_id.as_deref(), Some("wamid.1"));
        assert_eq!(events[0].sender_name.as_deref(), Some("Ana"));
        assert_eq!(events[1].body, "otra");
    }

    #[test]
    fn test_status_only_delivery_has_no_events() {
        let payload = payload(
            r#"{"entry": [{"changes": [{"value": {"statuses": [{"id": "wamid.1", "status": "read"}]}}]}]}"#,
        );
        assert!(extract_events(&payload).is_empty());
    }

    #[test]
    fn test_message_without_contact_has_no_name() {
        let payload = payload(
            r#"{"entry": [{"changes": [{"value": {"messages": [{"from": "42", "text": {"body": "hi"}}]}}]}]}"#,
        );
        let events = extract_events(&payload);
        assert_eq!(events.len(), 1);
        assert!(events[0].sender_name.is_none());
        assert!(events[0].message_id.is_none());
    }
}
