//! OpenAI Assistants (v2) provider.
//!
//! Each user gets one thread, remembered in their conversation state. A turn
//! posts the message, starts a run and polls it until it settles.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::check_status;
use super::provider::{Assistant, ProviderError, Result};
use crate::config::AssistantConfig;
use crate::state::ConversationState;

/// Conversation state key holding the user's thread id.
pub const THREAD_KEY: &str = "openai.thread_id";

pub struct OpenAiAssistant {
    client: Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_run_wait: Duration,
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateRun<'a> {
    assistant_id: &'a str,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    RequiresAction,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    fn is_pending(self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling)
    }

    /// Statuses after which the run may still hold the thread.
    fn holds_thread(self) -> bool {
        matches!(self, RunStatus::RequiresAction | RunStatus::Unknown)
    }
}

#[derive(Deserialize)]
struct Run {
    id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Deserialize)]
struct RunError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TextValue {
    value: String,
}

impl OpenAiAssistant {
    pub fn new(client: Client, config: &AssistantConfig) -> Self {
        Self {
            client,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            poll_interval: Duration::from_millis(config.run_poll_interval_ms),
            max_run_wait: Duration::from_secs(config.max_run_wait_secs),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn thread_for(&self, state: &ConversationState) -> Result<String> {
        if let Some(thread_id) = state.get(THREAD_KEY)? {
            return Ok(thread_id);
        }

        let response = check_status(self.post("/threads").json(&serde_json::json!({})).send().await?).await?;
        let thread: Created = response.json().await?;
        state.set(THREAD_KEY, &thread.id)?;
        tracing::debug!("Created thread {} for {}", thread.id, state.user());
        Ok(thread.id)
    }

    async fn wait_for_run(&self, thread_id: &str, mut run: Run) -> Result<Run> {
        let started = Instant::now();
        while run.status.is_pending() {
            if started.elapsed() >= self.max_run_wait {
                return Err(ProviderError::Timeout);
            }
            tokio::time::sleep(self.poll_interval).await;

            let response = check_status(
                self.get(&format!("/threads/{}/runs/{}", thread_id, run.id))
                    .send()
                    .await?,
            )
            .await?;
            run = response.json().await?;
        }
        Ok(run)
    }

    /// Best-effort cancel so the thread accepts the user's next message.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) {
        let result = match self
            .post(&format!("/threads/{}/runs/{}/cancel", thread_id, run_id))
            .send()
            .await
        {
            Ok(response) => check_status(response).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => tracing::info!("Cancelled run {} on thread {}", run_id, thread_id),
            Err(e) => tracing::warn!("Failed to cancel run {} on thread {}: {}", run_id, thread_id, e),
        }
    }

    async fn run_reply(&self, thread_id: &str, run_id: &str) -> Result<String> {
        let response = check_status(
            self.get(&format!("/threads/{}/messages", thread_id))
                .query(&[("run_id", run_id), ("order", "asc"), ("limit", "100")])
                .send()
                .await?,
        )
        .await?;
        let list: MessageList = response.json().await?;

        collect_reply(&list.data)
            .ok_or_else(|| ProviderError::ParseError("run produced no assistant text".to_string()))
    }
}

/// Join the text of every assistant message, oldest first.
fn collect_reply(messages: &[ThreadMessage]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "assistant")
        .flat_map(|m| m.content.iter())
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.value.as_str()),
            ContentBlock::Other => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    fn name(&self) -> &str {
        "openai"
    }

    async fn ask(
        &self,
        assistant_id: &str,
        message: &str,
        state: &ConversationState,
    ) -> Result<String> {
        let thread_id = self.thread_for(state).await?;

        check_status(
            self.post(&format!("/threads/{}/messages", thread_id))
                .json(&CreateMessage {
                    role: "user",
                    content: message,
                })
                .send()
                .await?,
        )
        .await?;

        let response = check_status(
            self.post(&format!("/threads/{}/runs", thread_id))
                .json(&CreateRun { assistant_id })
                .send()
                .await?,
        )
        .await?;
        let run: Run = response.json().await?;
        tracing::debug!("Started run {} on thread {}", run.id, thread_id);

        let run_id = run.id.clone();
        let run = match self.wait_for_run(&thread_id, run).await {
            Ok(run) => run,
            Err(e) => {
                self.cancel_run(&thread_id, &run_id).await;
                return Err(e);
            }
        };
        if run.status != RunStatus::Completed {
            if run.status.holds_thread() {
                self.cancel_run(&thread_id, &run.id).await;
            }
            let detail = run.last_error.map(|e| e.message).unwrap_or_default();
            return Err(ProviderError::ApiError(format!(
                "run {} ended as {:?} {}",
                run.id, run.status, detail
            )));
        }

        self.run_reply(&thread_id, &run.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UserId;
    use crate::state::StateStore;
    use axum::extract::{Path, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    /// In-process stand-in for the Assistants API.
    struct FakeApi {
        /// Status every run reports, from creation through polling.
        run_status: &'static str,
        requests: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn log(&self, request: String) {
            self.requests.lock().unwrap().push(request);
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn serve_fake(run_status: &'static str) -> (Arc<FakeApi>, String) {
        let api = Arc::new(FakeApi {
            run_status,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(
                "/threads",
                post(|State(api): State<Arc<FakeApi>>| async move {
                    api.log("POST /threads".to_string());
                    Json(json!({"id": "th_1"}))
                }),
            )
            .route(
                "/threads/:thread/messages",
                post(
                    |State(api): State<Arc<FakeApi>>, Path(thread): Path<String>| async move {
                        api.log(format!("POST /threads/{}/messages", thread));
                        Json(json!({"id": "msg_1"}))
                    },
                )
                .get(|State(api): State<Arc<FakeApi>>| async move {
                    api.log("GET messages".to_string());
                    Json(json!({"data": [
                        {"role": "assistant", "content": [{"type": "text", "text": {"value": "Hi there."}}]}
                    ]}))
                }),
            )
            .route(
                "/threads/:thread/runs",
                post(|State(api): State<Arc<FakeApi>>| async move {
                    api.log("POST run".to_string());
                    Json(json!({"id": "run_1", "status": api.run_status}))
                }),
            )
            .route(
                "/threads/:thread/runs/:run",
                get(|State(api): State<Arc<FakeApi>>| async move {
                    Json(json!({"id": "run_1", "status": api.run_status}))
                }),
            )
            .route(
                "/threads/:thread/runs/:run/cancel",
                post(
                    |State(api): State<Arc<FakeApi>>,
                     Path((thread, run)): Path<(String, String)>| async move {
                        api.log(format!("CANCEL {} {}", thread, run));
                        Json::<Value>(json!({"id": run, "status": "cancelling"}))
                    },
                ),
            )
            .with_state(api.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (api, format!("http://{}", addr))
    }

    fn assistant(base_url: String, max_run_wait_secs: u64) -> OpenAiAssistant {
        let config = AssistantConfig {
            api_key: Some("sk-test".to_string()),
            openai_base_url: base_url,
            run_poll_interval_ms: 5,
            max_run_wait_secs,
            ..AssistantConfig::default()
        };
        OpenAiAssistant::new(Client::new(), &config)
    }

    fn state() -> ConversationState {
        ConversationState::new(
            UserId::from("u1"),
            Arc::new(StateStore::open_in_memory().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_completed_run_returns_reply_and_keeps_thread() {
        let (api, url) = serve_fake("completed").await;
        let openai = assistant(url, 5);
        let state = state();

        let reply = openai.ask("asst_1", "hello", &state).await.unwrap();
        assert_eq!(reply, "Hi there.");
        assert_eq!(state.get(THREAD_KEY).unwrap().as_deref(), Some("th_1"));

        openai.ask("asst_1", "again", &state).await.unwrap();
        let threads_created = api.requests().iter().filter(|r| *r == "POST /threads").count();
        assert_eq!(threads_created, 1);
        assert!(!api.requests().iter().any(|r| r.starts_with("CANCEL")));
    }

    #[tokio::test]
    async fn test_timed_out_run_is_cancelled() {
        let (api, url) = serve_fake("in_progress").await;
        let openai = assistant(url, 0);

        let err = openai.ask("asst_1", "hello", &state()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout));
        assert!(api.requests().contains(&"CANCEL th_1 run_1".to_string()));
    }

    #[tokio::test]
    async fn test_run_requiring_action_is_cancelled() {
        let (api, url) = serve_fake("requires_action").await;
        let openai = assistant(url, 5);

        let err = openai.ask("asst_1", "hello", &state()).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError(_)));
        assert!(api.requests().contains(&"CANCEL th_1 run_1".to_string()));
    }

    #[tokio::test]
    async fn test_failed_run_is_not_cancelled() {
        let (api, url) = serve_fake("failed").await;
        let openai = assistant(url, 5);

        assert!(openai.ask("asst_1", "hello", &state()).await.is_err());
        assert!(!api.requests().iter().any(|r| r.starts_with("CANCEL")));
    }

    #[test]
    fn test_collect_reply_joins_assistant_text() {
        let list: MessageList = serde_json::from_value(serde_json::json!({
            "data": [
                {"role": "user", "content": [{"type": "text", "text": {"value": "question"}}]},
                {"role": "assistant", "content": [
                    {"type": "text", "text": {"value": "First.", "annotations": []}},
                    {"type": "image_file", "image_file": {"file_id": "f1"}}
                ]},
                {"role": "assistant", "content": [{"type": "text", "text": {"value": "Second."}}]}
            ]
        }))
        .unwrap();

        assert_eq!(collect_reply(&list.data).as_deref(), Some("First.\n\nSecond."));
    }

    #[test]
    fn test_collect_reply_without_text() {
        let list: MessageList = serde_json::from_value(serde_json::json!({
            "data": [{"role": "assistant", "content": []}]
        }))
        .unwrap();
        assert!(collect_reply(&list.data).is_none());
    }

    #[test]
    fn test_run_status_parsing() {
        let run: Run =
            serde_json::from_value(serde_json::json!({"id": "run_1", "status": "in_progress"})).unwrap();
        assert!(run.status.is_pending());

        let run: Run = serde_json::from_value(serde_json::json!({
            "id": "run_2", "status": "failed", "last_error": {"code": "x", "message": "quota"}
        }))
        .unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.last_error.unwrap().message, "quota");

        let run: Run =
            serde_json::from_value(serde_json::json!({"id": "run_3", "status": "brand_new"})).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.status.is_pending());
    }
}
