use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use defi_runtime::automation::{ExecutionPage, ExecutionStats, TickReport};
use defi_runtime::{ActionSpec, AutomationStrategy};

use crate::HubApiState;
use crate::error::{ApiError, automation_error};

/// Either a fully specified strategy or a description for the proposer.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CreateStrategyRequest {
    Explicit {
        name: String,
        #[serde(default)]
        description: String,
        conditions: Vec<String>,
        actions: Vec<ActionSpec>,
    },
    Describe {
        description: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConditionsRequest {
    pub conditions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExecutionQuery {
    pub strategy_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: ExecutionStats,
    pub scheduler_running: bool,
}

pub fn router() -> Router<Arc<HubApiState>> {
    Router::new()
        .route("/automation/strategies", get(list_strategies).post(create_strategy))
        .route(
            "/automation/strategies/{id}",
            get(get_strategy).delete(delete_strategy),
        )
        .route("/automation/strategies/{id}/active", post(set_active))
        .route("/automation/strategies/{id}/conditions", put(update_conditions))
        .route("/automation/executions", get(list_executions))
        .route("/automation/stats", get(stats))
        .route("/automation/tick", post(tick))
}

async fn list_strategies(State(state): State<Arc<HubApiState>>) -> Json<Vec<AutomationStrategy>> {
    Json(state.store.list().await)
}

async fn create_strategy(
    State(state): State<Arc<HubApiState>>,
    Json(request): Json<CreateStrategyRequest>,
) -> Result<(StatusCode, Json<AutomationStrategy>), ApiError> {
    let created = match request {
        CreateStrategyRequest::Explicit {
            name,
            description,
            conditions,
            actions,
        } => state
            .store
            .create_from_parts(name, description, conditions, actions)
            .await,
        CreateStrategyRequest::Describe { description } => {
            let proposed = state
                .proposer
                .propose(&description)
                .await
                .map_err(automation_error)?;
            state.store.add(proposed).await
        }
    }
    .map_err(automation_error)?;

    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_strategy(
    State(state): State<Arc<HubApiState>>,
    Path(id): Path<String>,
) -> Result<Json<AutomationStrategy>, ApiError> {
    state
        .store
        .get(&id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("Strategy not found: {id}")))
}

async fn delete_strategy(
    State(state): State<Arc<HubApiState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.remove(&id).await.map_err(automation_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_active(
    State(state): State<Arc<HubApiState>>,
    Path(id): Path<String>,
    Json(request): Json<ActiveRequest>,
) -> Result<Json<AutomationStrategy>, ApiError> {
    state
        .store
        .set_active(&id, request.active)
        .await
        .map(Json)
        .map_err(automation_error)
}

async fn update_conditions(
    State(state): State<Arc<HubApiState>>,
    Path(id): Path<String>,
    Json(request): Json<ConditionsRequest>,
) -> Result<Json<AutomationStrategy>, ApiError> {
    state
        .store
        .update_conditions(&id, request.conditions)
        .await
        .map(Json)
        .map_err(automation_error)
}

async fn list_executions(
    State(state): State<Arc<HubApiState>>,
    Query(query): Query<ExecutionQuery>,
) -> Json<ExecutionPage> {
    let limit = query.limit.unwrap_or(50).min(500);
    let offset = query.offset.unwrap_or(0);
    Json(
        state
            .store
            .history(query.strategy_id.as_deref(), limit, offset)
            .await,
    )
}

async fn stats(State(state): State<Arc<HubApiState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        stats: state.store.stats().await,
        scheduler_running: state.scheduler.is_running().await,
    })
}

async fn tick(State(state): State<Arc<HubApiState>>) -> Json<TickReport> {
    Json(state.scheduler.tick().await)
}
