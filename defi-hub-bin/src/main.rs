//! Binary runner for the Stellar DeFi hub.
//!
//! Builds every component explicitly from [`config::HubConfig`]: persisted
//! client storage, the wallet registry and connection session, market data,
//! the action executor and automation scheduler. Then serves the HTTP API
//! until Ctrl-C and stops the scheduler after the server drains.

mod config;

use std::sync::Arc;

use defi_http_api::{HubApiState, build_router};
use defi_runtime::automation::{
    AutomationScheduler, ConditionEvaluator, SchedulerConfig, StrategyStore,
};
use defi_runtime::chain::HorizonClient;
use defi_runtime::clock::{Clock, SystemClock};
use defi_runtime::executor::{
    ActionExecutor, JsonEnvelopeBuilder, PaperActionExecutor, WalletActionExecutor,
};
use defi_runtime::market_data::{MarketDataClient, MarketDataProvider, StaticMarketData};
use defi_runtime::profile::ProfileStore;
use defi_runtime::storage::{JsonFileStore, KeyValueStore};
use defi_runtime::strategy::KeywordStrategyProposer;
use defi_runtime::wallet::{PopupConfig, RelayPopupHost};
use defi_runtime::{ConnectionSession, WalletEnvironment, WalletRegistry};

use config::HubConfig;

#[tokio::main]
async fn main() -> Result<(), String> {
    dotenvy::dotenv().ok();
    setup_log();

    let config = HubConfig::load()?;
    tracing::info!(
        network = ?config.network,
        state_dir = %config.state_dir.display(),
        live_execution = config.live_execution,
        "Starting DeFi hub"
    );

    // ── 1. Persisted client storage ──────────────────────────────────────────
    let storage: Arc<dyn KeyValueStore> = Arc::new(
        JsonFileStore::open(config.storage_path())
            .map_err(|e| format!("Failed to open client storage: {e}"))?,
    );

    // ── 2. Wallet environment, registry and session ──────────────────────────
    // A server process has no injected extension globals; the popup wallet
    // is driven by the UI through the relay routes.
    let popups = Arc::new(RelayPopupHost::new(config.popup_origin.clone()));
    let env = WalletEnvironment::new().with_popup_host(popups.clone());
    let registry = Arc::new(WalletRegistry::from_environment(
        &env,
        storage.clone(),
        PopupConfig {
            timeout: config.popup_timeout(),
        },
    ));

    let horizon = Arc::new(HorizonClient::new(config.horizon_url()));
    tracing::info!(horizon = %horizon.base_url(), "Using Horizon endpoint");
    let session = Arc::new(
        ConnectionSession::new(registry, storage.clone(), config.network)
            .with_network_client(horizon),
    );

    if session.restore_session().await {
        let snapshot = session.snapshot().await;
        tracing::info!(public_key = ?snapshot.public_key, "Restored previous wallet session");
    }

    // ── 3. Automation engine ─────────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let market: Arc<dyn MarketDataProvider> = match &config.market_data_url {
        Some(url) => {
            tracing::info!(%url, "Using market data service");
            Arc::new(MarketDataClient::new(url.clone()))
        }
        None => {
            tracing::warn!("No market data URL configured, using static price table");
            Arc::new(StaticMarketData::default())
        }
    };

    let executor: Arc<dyn ActionExecutor> = if config.live_execution {
        Arc::new(WalletActionExecutor::new(
            session.clone(),
            Arc::new(JsonEnvelopeBuilder),
        ))
    } else {
        Arc::new(PaperActionExecutor)
    };

    let store = Arc::new(StrategyStore::new(
        clock.clone(),
        config.execution_history_cap,
    ));
    let scheduler = Arc::new(AutomationScheduler::new(
        store.clone(),
        ConditionEvaluator::new(clock.clone(), market),
        executor,
        SchedulerConfig {
            interval: config.scheduler_interval(),
        },
    ));
    scheduler.start().await;

    // ── 4. HTTP API ──────────────────────────────────────────────────────────
    let state = Arc::new(HubApiState {
        session,
        store,
        scheduler: scheduler.clone(),
        proposer: Arc::new(KeywordStrategyProposer::new(clock)),
        profiles: ProfileStore::new(storage),
        popups: Some(popups),
        api_token: config.api_token.clone(),
        cors_origins: config.cors_origins.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.api_bind)
        .await
        .map_err(|e| format!("API bind on {} failed: {e}", config.api_bind))?;
    tracing::info!("Hub API listening on {}", config.api_bind);

    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // ── 5. Shutdown ──────────────────────────────────────────────────────────
    scheduler.stop().await;
    if let Err(e) = served {
        tracing::error!("Hub API server error: {e}");
        return Err(e.to_string());
    }
    tracing::info!("DeFi hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down DeFi hub");
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}
