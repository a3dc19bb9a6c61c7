pub mod auth;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use defi_runtime::automation::{AutomationScheduler, StrategyStore};
use defi_runtime::profile::ProfileStore;
use defi_runtime::session::ConnectionSession;
use defi_runtime::strategy::StrategyProposer;
use defi_runtime::wallet::RelayPopupHost;

/// Everything the handlers reach. Built once by the binary and shared.
pub struct HubApiState {
    pub session: Arc<ConnectionSession>,
    pub store: Arc<StrategyStore>,
    pub scheduler: Arc<AutomationScheduler>,
    pub proposer: Arc<dyn StrategyProposer>,
    pub profiles: ProfileStore,
    /// Present when the popup wallet is driven through this API.
    pub popups: Option<Arc<RelayPopupHost>>,
    pub api_token: String,
    /// Comma separated allow-list; empty or `*` allows any origin.
    pub cors_origins: String,
}

pub fn build_router(state: Arc<HubApiState>) -> Router {
    let cors = cors_layer(&state.cors_origins);
    Router::new()
        .merge(routes::health::router())
        .merge(routes::wallets::router())
        .merge(routes::session::router())
        .merge(routes::popups::router())
        .merge(routes::automation::router())
        .merge(routes::agent::router())
        .merge(routes::profile::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &str) -> CorsLayer {
    let origins = origins.trim();
    if origins == "*" || origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let parsed: Vec<_> = origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
