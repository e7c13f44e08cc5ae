use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::LiveSessions,
    dto::format_system_time,
    state::competition::{CompetitionState, CompetitionStore, StatePatch},
};

/// Snapshot of the competition returned by `GET /state`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CompetitionStateResponse {
    /// At least one run is in progress.
    pub is_live: bool,
    /// Event day has been opened.
    pub event_day_started: bool,
    /// Team profiles are locked.
    pub profiles_locked: bool,
    /// Raw live-session rows keyed by session key.
    #[schema(value_type = Object)]
    pub live_sessions: LiveSessions,
    /// Change counter at the time of the snapshot.
    pub version: u64,
    /// RFC 3339 timestamp of the last merge.
    pub updated_at: String,
}

impl CompetitionStateResponse {
    /// Capture the store's current snapshot with its counter.
    pub fn capture(store: &CompetitionStore) -> Self {
        let snapshot = store.snapshot();
        Self::from_parts(
            snapshot.state,
            snapshot.version,
            format_system_time(snapshot.updated_at),
        )
    }

    fn from_parts(state: CompetitionState, version: u64, updated_at: String) -> Self {
        Self {
            is_live: state.is_live,
            event_day_started: state.event_day_started,
            profiles_locked: state.profiles_locked,
            live_sessions: state.live_sessions,
            version,
            updated_at,
        }
    }
}

/// Body of `PATCH /state/settings`. At least one flag must be present.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    /// New `event_day_started` value.
    #[serde(default)]
    pub event_day_started: Option<bool>,
    /// New `profiles_locked` value.
    #[serde(default)]
    pub profiles_locked: Option<bool>,
}

impl Validate for UpdateSettingsRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        if self.event_day_started.is_none() && self.profiles_locked.is_none() {
            let mut errors = ValidationErrors::new();
            let mut err = ValidationError::new("empty_patch");
            err.message = Some("at least one settings flag must be provided".into());
            errors.add("event_day_started", err);
            return Err(errors);
        }
        Ok(())
    }
}

impl From<UpdateSettingsRequest> for StatePatch {
    fn from(value: UpdateSettingsRequest) -> Self {
        let mut patch = StatePatch::new();
        patch.event_day_started = value.event_day_started;
        patch.profiles_locked = value.profiles_locked;
        patch
    }
}

/// Result of a settings update: the merged snapshot and the upstream outcome.
#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateSettingsResponse {
    /// Snapshot after the local merge.
    pub state: CompetitionStateResponse,
    /// Whether the remote settings row accepted the change. The local merge stands either way.
    pub upstream_synced: bool,
}
