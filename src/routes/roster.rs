use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dao::models::{Competition, Team},
    dto::roster::{CompetitionsQuery, TeamsQuery},
    error::AppError,
    services::roster,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/teams",
    tag = "roster",
    params(TeamsQuery),
    responses(
        (status = 200, description = "Cached teams, optionally filtered by competition", body = [Team]),
        (status = 503, description = "Forced read failed and nothing was cached")
    )
)]
/// List teams from the cache, revalidating stale entries in the background.
pub async fn list_teams(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<TeamsQuery>>,
) -> Result<Json<Vec<Team>>, AppError> {
    let teams = roster::list_teams(
        &state,
        query.variant,
        query.competition.as_deref(),
        query.force,
    )
    .await?;
    Ok(Json(teams))
}

#[utoipa::path(
    get,
    path = "/competitions",
    tag = "roster",
    params(CompetitionsQuery),
    responses(
        (status = 200, description = "Cached competitions", body = [Competition]),
        (status = 503, description = "Forced read failed and nothing was cached")
    )
)]
/// List competitions from the cache, revalidating stale entries in the background.
pub async fn list_competitions(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<CompetitionsQuery>>,
) -> Result<Json<Vec<Competition>>, AppError> {
    Ok(Json(
        roster::list_competitions(&state, query.variant, query.force).await?,
    ))
}

/// Configure the roster routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/teams", get(list_teams))
        .route("/competitions", get(list_competitions))
}
