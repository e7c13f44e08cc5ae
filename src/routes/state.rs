use axum::{Json, Router, extract::State, routing::{get, patch}};
use axum_valid::Valid;

use crate::{
    dto::state::{CompetitionStateResponse, UpdateSettingsRequest, UpdateSettingsResponse},
    services::state_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/state",
    tag = "state",
    responses((status = 200, description = "Current competition snapshot", body = CompetitionStateResponse))
)]
/// Return the current competition snapshot.
pub async fn get_state(State(state): State<SharedState>) -> Json<CompetitionStateResponse> {
    Json(state_service::current_state(&state))
}

#[utoipa::path(
    patch,
    path = "/state/settings",
    tag = "state",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Flags merged locally; `upstream_synced` reports the remote write", body = UpdateSettingsResponse),
        (status = 400, description = "No flag provided")
    )
)]
/// Update the event-day flags locally and upstream.
pub async fn update_settings(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<UpdateSettingsRequest>>,
) -> Json<UpdateSettingsResponse> {
    Json(state_service::update_settings(&state, payload).await)
}

/// Configure the competition state routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/state", get(get_state))
        .route("/state/settings", patch(update_settings))
}
