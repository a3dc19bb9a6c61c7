use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;

use defi_runtime::profile::{ProfileUpdate, UserProfile};

use crate::HubApiState;
use crate::error::{ApiError, storage_error};

#[derive(Serialize)]
pub struct ProfileResponse {
    pub onboarding_completed: bool,
    pub profile: Option<UserProfile>,
}

pub fn router() -> Router<Arc<HubApiState>> {
    Router::new().route(
        "/profile",
        get(get_profile)
            .put(complete_onboarding)
            .patch(update_profile)
            .delete(reset_profile),
    )
}

fn current(state: &HubApiState) -> Result<ProfileResponse, ApiError> {
    Ok(ProfileResponse {
        onboarding_completed: state.profiles.is_onboarded().map_err(storage_error)?,
        profile: state.profiles.load().map_err(storage_error)?,
    })
}

async fn get_profile(State(state): State<Arc<HubApiState>>) -> Result<Json<ProfileResponse>, ApiError> {
    Ok(Json(current(&state)?))
}

async fn complete_onboarding(
    State(state): State<Arc<HubApiState>>,
    Json(profile): Json<UserProfile>,
) -> Result<Json<ProfileResponse>, ApiError> {
    state
        .profiles
        .complete_onboarding(&profile)
        .map_err(storage_error)?;
    Ok(Json(current(&state)?))
}

async fn update_profile(
    State(state): State<Arc<HubApiState>>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
    state
        .profiles
        .update(update)
        .map_err(storage_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "No profile to update".to_string()))
}

async fn reset_profile(State(state): State<Arc<HubApiState>>) -> Result<StatusCode, ApiError> {
    state.profiles.reset().map_err(storage_error)?;
    Ok(StatusCode::NO_CONTENT)
}
