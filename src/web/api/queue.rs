//! Queue statistics endpoint.

use axum::{extract::State, Json};

use crate::core::QueueStats;
use crate::web::AppState;

/// Current queue depth and counters.
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.queue.stats().await)
}
