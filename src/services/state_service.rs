use tracing::info;

use crate::{
    dto::state::{CompetitionStateResponse, UpdateSettingsRequest, UpdateSettingsResponse},
    state::{
        SharedState,
        competition::{StatePatch, UpdateOptions},
    },
};

/// Current competition snapshot.
pub fn current_state(state: &SharedState) -> CompetitionStateResponse {
    CompetitionStateResponse::capture(state.store())
}

/// Merge the requested flags locally, then wait for the upstream write.
///
/// The local merge and its notification land before the upstream write; a
/// rejected write is reported through `upstream_synced` only.
pub async fn update_settings(
    state: &SharedState,
    request: UpdateSettingsRequest,
) -> UpdateSettingsResponse {
    let patch = StatePatch::from(request);
    let receipt = state.store().update_state(patch, UpdateOptions::synced());
    let version = receipt.version;
    let upstream_synced = receipt.upstream_synced().await;
    info!(version, upstream_synced, "settings updated");

    UpdateSettingsResponse {
        state: current_state(state),
        upstream_synced,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::memory::MemoryRemoteSource, state::AppState};

    #[tokio::test]
    async fn rejected_upstream_write_keeps_the_local_flag() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MemoryRemoteSource::new();
        remote.set_offline(true);
        let state = AppState::new(
            AppConfig::default().with_flags_path(dir.path().join("flags.json")),
            Arc::new(remote.clone()),
        );

        let response = update_settings(
            &state,
            UpdateSettingsRequest {
                event_day_started: Some(true),
                profiles_locked: None,
            },
        )
        .await;

        assert!(!response.upstream_synced);
        assert!(response.state.event_day_started);
        assert_eq!(response.state.version, 1);
        assert!(!remote.settings().event_day_started);
    }
}
