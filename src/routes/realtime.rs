use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};

use crate::{
    dto::realtime::{PushAccepted, RowChangePayload},
    error::AppError,
    services::sync_service,
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/realtime/{table}",
    tag = "realtime",
    params(("table" = String, Path, description = "Remote table the change belongs to")),
    request_body = RowChangePayload,
    responses(
        (status = 200, description = "Change handed to open subscriptions", body = PushAccepted),
        (status = 404, description = "Table is not synchronised")
    )
)]
/// Database webhook ingress feeding the push transport.
pub async fn push_change(
    State(state): State<SharedState>,
    Path(table): Path<String>,
    Json(payload): Json<RowChangePayload>,
) -> Result<Json<PushAccepted>, AppError> {
    let delivered = sync_service::ingest_push(&state, payload.into_change(&table))?;
    Ok(Json(PushAccepted { delivered }))
}

/// Configure the push ingress route.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/realtime/{table}", post(push_change))
}
