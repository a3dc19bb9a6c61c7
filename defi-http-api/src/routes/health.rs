use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::HubApiState;

pub fn router() -> Router<Arc<HubApiState>> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<Arc<HubApiState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "network": state.session.network(),
        "scheduler_running": state.scheduler.is_running().await,
    }))
}
