//! Web server using Axum.

use std::future::Future;
use std::net::SocketAddr;

use super::router::{create_app_router, AppState};
use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// Web server configuration.
pub struct WebServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            port: 3008,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl From<&ServerConfig> for WebServerConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            port: server.port,
            host: server.host.clone(),
        }
    }
}

/// Run the web server until `shutdown` resolves. In-flight requests finish first.
pub async fn run_server<F>(config: WebServerConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Web(format!("Invalid address: {}", e)))?;

    tracing::info!("Starting web server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
