use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status (always "ok" while the process serves requests).
    pub status: String,
    /// Change counter of the competition store.
    pub state_version: u64,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(state_version: u64) -> Self {
        Self {
            status: "ok".to_string(),
            state_version,
        }
    }
}
