//! Ollama HTTP provider.
//!
//! Ollama's chat API is stateless, so recent messages are replayed from the
//! conversation state on every turn.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::check_status;
use super::provider::{Assistant, Result};
use crate::config::AssistantConfig;
use crate::state::ConversationState;

/// Conversation state key holding the replayed history.
pub const HISTORY_KEY: &str = "ollama.history";

pub struct OllamaAssistant {
    client: Client,
    base_url: String,
    default_model: String,
    history_limit: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct Message {
    role: String,
    content: String,
}

impl Message {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaAssistant {
    pub fn new(client: Client, config: &AssistantConfig) -> Self {
        Self {
            client,
            base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
            default_model: config.model.clone(),
            history_limit: config.history_limit,
        }
    }

    fn model<'a>(&'a self, assistant_id: &'a str) -> &'a str {
        if assistant_id.trim().is_empty() {
            &self.default_model
        } else {
            assistant_id
        }
    }
}

/// Keep only the newest `limit` messages.
fn trim_history(history: &mut Vec<Message>, limit: usize) {
    if history.len() > limit {
        history.drain(..history.len() - limit);
    }
}

#[async_trait]
impl Assistant for OllamaAssistant {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn ask(
        &self,
        assistant_id: &str,
        message: &str,
        state: &ConversationState,
    ) -> Result<String> {
        let mut history: Vec<Message> = state.get_json(HISTORY_KEY)?.unwrap_or_default();
        history.push(Message::new("user", message));
        trim_history(&mut history, self.history_limit.max(1));

        let request = ChatRequest {
            model: self.model(assistant_id),
            messages: &history,
            stream: false,
        };

        let response = check_status(
            self.client
                .post(format!("{}/api/chat", self.base_url))
                .json(&request)
                .send()
                .await?,
        )
        .await?;
        let chat_response: ChatResponse = response.json().await?;
        let reply = chat_response.message.content;

        history.push(Message::new("assistant", &reply));
        trim_history(&mut history, self.history_limit);
        state.set_json(HISTORY_KEY, &history)?;

        Ok(reply)
    }
}
