use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;

use defi_runtime::WalletDescriptor;

use crate::HubApiState;

#[derive(Serialize)]
pub struct WalletsResponse {
    pub available: Vec<WalletDescriptor>,
    pub recommended: Option<WalletDescriptor>,
}

pub fn router() -> Router<Arc<HubApiState>> {
    Router::new().route("/wallets", get(list_wallets))
}

async fn list_wallets(State(state): State<Arc<HubApiState>>) -> Json<WalletsResponse> {
    let registry = state.session.registry();
    Json(WalletsResponse {
        available: registry.available_descriptors(),
        recommended: registry.recommend().map(|w| w.descriptor()),
    })
}
