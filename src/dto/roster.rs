use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::dao::models::Variant;

/// Query of `GET /teams`.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema, Validate)]
#[into_params(parameter_in = Query)]
pub struct TeamsQuery {
    /// Projection to return (`minimal` by default).
    #[serde(default)]
    pub variant: Variant,
    /// Competition slug or display name; placeholder teams are excluded when set.
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub competition: Option<String>,
    /// Bypass the cache and wait for the remote read.
    #[serde(default)]
    pub force: bool,
}

/// Query of `GET /competitions`.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema, Validate)]
#[into_params(parameter_in = Query)]
pub struct CompetitionsQuery {
    /// Projection to read.
    #[serde(default)]
    pub variant: Variant,
    /// Bypass the cache and read the remote service.
    #[serde(default)]
    pub force: bool,
}
