//! Assistant backends.

use std::sync::Arc;
use std::time::Duration;

pub mod ollama;
pub mod openai;
pub mod provider;

pub use provider::{Assistant, ProviderError, Result};

use crate::config::{AssistantConfig, ProviderKind};

/// Build the configured backend.
pub fn create_assistant(config: &AssistantConfig) -> Result<Arc<dyn Assistant>> {
    let client = http_client(config.request_timeout_secs)?;
    let assistant: Arc<dyn Assistant> = match config.provider {
        ProviderKind::Openai => Arc::new(openai::OpenAiAssistant::new(client, config)),
        ProviderKind::Ollama => Arc::new(ollama::OllamaAssistant::new(client, config)),
    };
    tracing::debug!("Using assistant provider: {}", assistant.name());
    Ok(assistant)
}

fn http_client(timeout_secs: Option<u64>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

/// Turn a non-2xx response into an API error carrying the body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::ApiError(format!("{}: {}", status, body)))
}
