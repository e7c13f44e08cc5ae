use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the OpenAPI document.
pub mod docs;
/// Health check.
pub mod health;
/// Push webhook ingress.
pub mod realtime;
/// Team and competition listings.
pub mod roster;
/// Per-tab event stream.
pub mod sse;
/// Competition state and settings.
pub mod state;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(self::state::router())
        .merge(roster::router())
        .merge(realtime::router())
        .merge(sse::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
