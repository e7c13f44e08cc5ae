use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse",
    tag = "sse",
    responses((status = 200, description = "Bus topics for one tab", content_type = "text/event-stream", body = String))
)]
/// Stream every bus topic to a connected tab.
pub async fn tab_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let (receiver, tab_id) = sse_service::subscribe_tab(&state);
    info!(%tab_id, "New SSE tab connection");
    sse_service::to_sse_stream(receiver, tab_id)
}

/// Configure the SSE endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse", get(tab_stream))
}
