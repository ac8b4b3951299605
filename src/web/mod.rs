//! Web server module (Axum): webhook ingress, health, and queue stats.

pub mod api;
pub mod router;
pub mod server;

pub use router::{create_app_router, AppState, WebhookState};
pub use server::{run_server, WebServerConfig};
