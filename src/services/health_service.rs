use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness together with the competition store's change counter.
pub fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(state.store().version())
}
