use axum::{Json, Router, extract::State, routing::{get, post}};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use defi_runtime::{SessionSnapshot, WalletKind};

use crate::HubApiState;
use crate::error::{ApiError, wallet_error};

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    /// Omitted: connect to the recommended installed wallet.
    #[serde(default)]
    pub wallet: Option<WalletKind>,
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub envelope: String,
    /// Also submit the signed envelope to the network.
    #[serde(default)]
    pub submit: bool,
}

#[derive(Debug, Serialize)]
pub struct SignResponse {
    pub signed_envelope: Option<String>,
    pub transaction_hash: Option<String>,
}

pub fn router() -> Router<Arc<HubApiState>> {
    Router::new()
        .route("/session", get(snapshot))
        .route("/session/connect", post(connect))
        .route("/session/disconnect", post(disconnect))
        .route("/session/sign", post(sign))
}

async fn snapshot(State(state): State<Arc<HubApiState>>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot().await)
}

async fn connect(
    State(state): State<Arc<HubApiState>>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .session
        .connect(request.wallet)
        .await
        .map_err(wallet_error)?;
    Ok(Json(state.session.snapshot().await))
}

async fn disconnect(State(state): State<Arc<HubApiState>>) -> Result<Json<SessionSnapshot>, ApiError> {
    state.session.disconnect().await.map_err(wallet_error)?;
    Ok(Json(state.session.snapshot().await))
}

async fn sign(
    State(state): State<Arc<HubApiState>>,
    Json(request): Json<SignRequest>,
) -> Result<Json<SignResponse>, ApiError> {
    if request.submit {
        let result = state
            .session
            .sign_and_submit(&request.envelope)
            .await
            .map_err(wallet_error)?;
        return Ok(Json(SignResponse {
            signed_envelope: None,
            transaction_hash: Some(result.transaction_hash),
        }));
    }

    let signed = state
        .session
        .sign(&request.envelope)
        .await
        .map_err(wallet_error)?;
    Ok(Json(SignResponse {
        signed_envelope: Some(signed),
        transaction_hash: None,
    }))
}
