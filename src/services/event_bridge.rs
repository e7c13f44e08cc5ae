//! Bridges between the event bus, the persisted-flags channel and the store.

use std::sync::Arc;

use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    dao::models::Resource,
    services::{debounce::Debouncer, sync_service},
    state::{
        SharedState,
        bus::{ListenerGuard, Topic},
        competition::{StatePatch, UpdateOptions},
    },
};

/// Bus listeners turning remote change topics into debounced refetches.
pub struct RefetchBridge {
    _listeners: Vec<ListenerGuard>,
    debouncers: Vec<Arc<Debouncer>>,
}

impl RefetchBridge {
    /// Cancel any refetch still waiting for its quiet period.
    pub fn cancel_pending(&self) {
        self.debouncers.iter().for_each(|debouncer| debouncer.cancel());
    }
}

/// Subscribe to [`Topic::TeamsUpdated`] and [`Topic::CompetitionsUpdated`].
///
/// Each topic triggers a debounced forced refetch of the matching resource,
/// announced afterwards with [`Topic::CacheRefreshed`].
pub fn install_refetch_bridge(state: &SharedState) -> RefetchBridge {
    let window = state.config().debounce_window();
    let mut listeners = Vec::new();
    let mut debouncers = Vec::new();

    for (topic, resource) in [
        (Topic::TeamsUpdated, Resource::Teams),
        (Topic::CompetitionsUpdated, Resource::Competitions),
    ] {
        let weak = Arc::downgrade(state);
        let debouncer = Arc::new(Debouncer::new(window, move || {
            let weak = weak.clone();
            async move {
                if let Some(state) = weak.upgrade() {
                    sync_service::refresh_resource(&state, resource).await;
                }
            }
        }));

        let trigger = debouncer.clone();
        listeners.push(state.bus().subscribe_guarded(topic, move |topic| {
            debug!(%topic, "scheduling refetch");
            trigger.trigger();
        }));
        debouncers.push(debouncer);
    }

    RefetchBridge {
        _listeners: listeners,
        debouncers,
    }
}

/// Funnel flag changes written by another process into the store.
pub fn spawn_storage_bridge(state: &SharedState) -> JoinHandle<()> {
    let mut changes = state.flags().changes();
    let weak = Arc::downgrade(state);

    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    let Some(state) = weak.upgrade() else {
                        break;
                    };
                    debug!(flags = ?change.flags, "applying flags changed by another process");
                    state
                        .store()
                        .update_state(StatePatch::from(change.flags), UpdateOptions::notify());
                }
                Err(RecvError::Lagged(skipped)) => {
                    info!(skipped, "storage bridge lagged; continuing with the latest change");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{flags::{FlagsStore, PersistedFlags}, memory::MemoryRemoteSource, models::{Team, Variant}},
        state::AppState,
    };

    fn app(dir: &tempfile::TempDir, remote: &MemoryRemoteSource) -> SharedState {
        let config = AppConfig::default()
            .with_flags_path(dir.path().join("flags.json"))
            .with_debounce_window(Duration::from_millis(2000));
        AppState::new(config, Arc::new(remote.clone()))
    }

    #[tokio::test(start_paused = true)]
    async fn teams_updated_burst_triggers_one_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MemoryRemoteSource::new();
        remote.set_teams(vec![Team {
            id: 1,
            name: "Alpha".into(),
            club: None,
            competition: None,
            members: Vec::new(),
        }]);
        let state = app(&dir, &remote);
        let _bridge = install_refetch_bridge(&state);
        let mut topics = state.bus().stream();

        for _ in 0..5 {
            state.bus().publish(Topic::TeamsUpdated);
            sleep(Duration::from_millis(300)).await;
        }
        sleep(Duration::from_secs(5)).await;

        assert_eq!(remote.team_fetches(), 1);
        assert_eq!(state.fetchers().cached_teams(Variant::Minimal).unwrap().len(), 1);

        let mut seen = Vec::new();
        while let Ok(topic) = topics.try_recv() {
            seen.push(topic);
        }
        assert_eq!(seen.last(), Some(&Topic::CacheRefreshed(Resource::Teams)));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_bridge_stops_listening() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MemoryRemoteSource::new();
        let state = app(&dir, &remote);
        let bridge = install_refetch_bridge(&state);
        assert_eq!(state.bus().listener_count(Topic::CompetitionsUpdated), 1);

        state.bus().publish(Topic::CompetitionsUpdated);
        bridge.cancel_pending();
        drop(bridge);
        assert_eq!(state.bus().listener_count(Topic::CompetitionsUpdated), 0);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(remote.competition_fetches(), 0);
    }

    #[tokio::test]
    async fn external_flag_change_reaches_the_store_and_the_bus() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MemoryRemoteSource::new();
        let state = app(&dir, &remote);
        let mut topics = state.bus().stream();
        let bridge = spawn_storage_bridge(&state);

        FlagsStore::open(dir.path().join("flags.json"))
            .save(PersistedFlags {
                event_day_started: true,
                profiles_locked: true,
            })
            .unwrap();
        state.flags().poll_external_change().expect("change detected");

        assert_eq!(topics.recv().await.unwrap(), Topic::CompetitionStateUpdated);
        let snapshot = state.store().get_state();
        assert!(snapshot.event_day_started);
        assert!(snapshot.profiles_locked);
        bridge.abort();
    }
}
