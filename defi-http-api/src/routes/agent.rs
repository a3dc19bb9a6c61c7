use axum::{Json, Router, extract::State, routing::post};
use serde::Deserialize;
use std::sync::Arc;

use defi_runtime::strategy::AgentReply;

use crate::HubApiState;
use crate::error::{ApiError, automation_error};

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

pub fn router() -> Router<Arc<HubApiState>> {
    Router::new().route("/agent/message", post(message))
}

async fn message(
    State(state): State<Arc<HubApiState>>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<AgentReply>, ApiError> {
    state
        .proposer
        .classify_message(&request.message)
        .await
        .map(Json)
        .map_err(automation_error)
}
