//! Relay for the popup wallet: the UI polls for windows to open and posts
//! back the messages those windows send.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;

use defi_runtime::wallet::popup::OpenPopup;
use defi_runtime::wallet::{PopupMessage, RelayPopupHost};

use crate::HubApiState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct DeliveryResponse {
    pub delivered: usize,
}

pub fn router() -> Router<Arc<HubApiState>> {
    Router::new()
        .route("/popups", get(open_popups))
        .route("/popups/message", post(post_message))
}

fn relay(state: &HubApiState) -> Result<&Arc<RelayPopupHost>, ApiError> {
    state
        .popups
        .as_ref()
        .ok_or((StatusCode::NOT_FOUND, "Popup relay is disabled".to_string()))
}

async fn open_popups(State(state): State<Arc<HubApiState>>) -> Result<Json<Vec<OpenPopup>>, ApiError> {
    Ok(Json(relay(&state)?.open_popups()))
}

async fn post_message(
    State(state): State<Arc<HubApiState>>,
    Json(message): Json<PopupMessage>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    let delivered = relay(&state)?.post_message(message);
    Ok(Json(DeliveryResponse { delivered }))
}
