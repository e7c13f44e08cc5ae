use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Arena Sync.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::tab_stream,
        crate::routes::state::get_state,
        crate::routes::state::update_settings,
        crate::routes::roster::list_teams,
        crate::routes::roster::list_competitions,
        crate::routes::realtime::push_change,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::state::CompetitionStateResponse,
            crate::dto::state::UpdateSettingsRequest,
            crate::dto::state::UpdateSettingsResponse,
            crate::dto::realtime::RowChangePayload,
            crate::dto::realtime::PushAccepted,
            crate::dao::models::Team,
            crate::dao::models::Competition,
            crate::dao::models::LiveSession,
            crate::dao::models::SessionPhase,
            crate::dao::models::Variant,
            crate::services::realtime::ChangeKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "state", description = "Competition state snapshot and settings"),
        (name = "roster", description = "Cached teams and competitions"),
        (name = "realtime", description = "Push ingress for row-level changes"),
        (name = "sse", description = "Per-tab change notification stream"),
    )
)]
pub struct ApiDoc;
