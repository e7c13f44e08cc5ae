//! Canonical competition snapshot shared by every consumer of the process.
//!
//! All mutations go through [`CompetitionStore::update_state`]: a shallow
//! merge applied atomically under the store lock, followed (unless
//! suppressed) by a synchronous [`Topic::CompetitionStateUpdated`]
//! notification. Live sessions are always replaced wholesale.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::SystemTime,
};

use serde::Serialize;
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    dao::{
        flags::{FlagsStore, PersistedFlags},
        models::{LiveSessions, Settings, SettingsPatch},
    },
    services::settings::SettingsSync,
    state::bus::{Notifier, Topic},
};

/// Snapshot of the competition as seen by this process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompetitionState {
    /// At least one run is in progress.
    pub is_live: bool,
    /// Event day has been opened by an administrator.
    pub event_day_started: bool,
    /// Team profiles can no longer be edited.
    pub profiles_locked: bool,
    /// Raw rows of the live-session feed, replaced on every refresh.
    pub live_sessions: LiveSessions,
}

/// Partial state; `None` fields are left untouched by the merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    /// New `is_live` value.
    pub is_live: Option<bool>,
    /// New `event_day_started` value.
    pub event_day_started: Option<bool>,
    /// New `profiles_locked` value.
    pub profiles_locked: Option<bool>,
    /// Replacement live-session mapping.
    pub live_sessions: Option<LiveSessions>,
}

impl StatePatch {
    /// Empty patch; merging it only bumps the version.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `is_live`.
    pub fn is_live(mut self, value: bool) -> Self {
        self.is_live = Some(value);
        self
    }

    /// Set `event_day_started`.
    pub fn event_day_started(mut self, value: bool) -> Self {
        self.event_day_started = Some(value);
        self
    }

    /// Set `profiles_locked`.
    pub fn profiles_locked(mut self, value: bool) -> Self {
        self.profiles_locked = Some(value);
        self
    }

    /// Replace the whole live-session mapping and derive `is_live` from it.
    pub fn live_sessions(mut self, sessions: LiveSessions) -> Self {
        self.is_live = Some(!sessions.is_empty());
        self.live_sessions = Some(sessions);
        self
    }

    /// Settings-only patch built from the remote settings row.
    pub fn from_settings(settings: Settings) -> Self {
        Self::new()
            .event_day_started(settings.event_day_started)
            .profiles_locked(settings.profiles_locked)
    }

    /// Part of the patch that belongs upstream, in the remote settings row.
    pub fn settings_patch(&self) -> SettingsPatch {
        SettingsPatch {
            event_day_started: self.event_day_started,
            profiles_locked: self.profiles_locked,
        }
    }

    fn apply(self, state: &mut CompetitionState) {
        if let Some(value) = self.is_live {
            state.is_live = value;
        }
        if let Some(value) = self.event_day_started {
            state.event_day_started = value;
        }
        if let Some(value) = self.profiles_locked {
            state.profiles_locked = value;
        }
        if let Some(sessions) = self.live_sessions {
            state.live_sessions = sessions;
        }
    }
}

impl From<PersistedFlags> for StatePatch {
    fn from(flags: PersistedFlags) -> Self {
        Self::new()
            .event_day_started(flags.event_day_started)
            .profiles_locked(flags.profiles_locked)
    }
}

/// Control flags of a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Also push the settings part of the patch upstream.
    pub sync_remote: bool,
    /// Skip the change notification.
    pub suppress_event: bool,
}

impl UpdateOptions {
    /// Merge and notify; local only.
    pub fn notify() -> Self {
        Self::default()
    }

    /// Merge without notifying subscribers.
    pub fn silent() -> Self {
        Self {
            suppress_event: true,
            ..Self::default()
        }
    }

    /// Merge, notify and push upstream.
    pub fn synced() -> Self {
        Self {
            sync_remote: true,
            ..Self::default()
        }
    }
}

/// What happened to the upstream side of a merge.
#[derive(Debug)]
pub enum UpstreamWrite {
    /// No remote sync was asked for, or the patch carried no settings.
    NotRequested,
    /// A remote sync was asked for but could not be started.
    Skipped,
    /// Write in flight, resolving to its success flag.
    InFlight(JoinHandle<bool>),
}

/// Outcome of a merge. The merge and notification already happened.
#[derive(Debug)]
pub struct UpdateReceipt {
    /// Change counter after the merge.
    pub version: u64,
    /// Upstream side of the merge.
    pub upstream: UpstreamWrite,
}

impl UpdateReceipt {
    /// Wait for the upstream write.
    ///
    /// `true` when the write succeeded or nothing had to be written; `false`
    /// when it failed or was skipped, so the caller knows to retry.
    pub async fn upstream_synced(self) -> bool {
        match self.upstream {
            UpstreamWrite::NotRequested => true,
            UpstreamWrite::Skipped => false,
            UpstreamWrite::InFlight(handle) => handle.await.unwrap_or_else(|err| {
                warn!(error = %err, "upstream settings write task failed");
                false
            }),
        }
    }
}

/// State, change counter and merge time read under one lock.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// Snapshot of the competition.
    pub state: CompetitionState,
    /// Change counter of `state`.
    pub version: u64,
    /// Wall-clock time of the merge that produced `state`.
    pub updated_at: SystemTime,
}

struct StoreInner {
    state: CompetitionState,
    version: u64,
    updated_at: SystemTime,
}

/// Single mutable competition snapshot with an injected notifier.
pub struct CompetitionStore {
    inner: RwLock<StoreInner>,
    notifier: Arc<dyn Notifier>,
    settings: Option<SettingsSync>,
    flags: Option<Arc<FlagsStore>>,
}

impl CompetitionStore {
    /// Build an empty store notifying through `notifier`.
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                state: CompetitionState::default(),
                version: 0,
                updated_at: SystemTime::now(),
            }),
            notifier,
            settings: None,
            flags: None,
        }
    }

    /// Attach the remote settings collaborator used by `sync_remote` merges.
    pub fn with_settings(mut self, settings: SettingsSync) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Seed the flags from the persisted record and write flag changes through to it.
    pub fn with_flags(mut self, flags: Arc<FlagsStore>) -> Self {
        if let Some(seed) = flags.load() {
            debug!(?seed, "seeding competition state from persisted flags");
            StatePatch::from(seed).apply(&mut self.write_inner().state);
        }
        self.flags = Some(flags);
        self
    }

    /// Current snapshot, by value.
    pub fn get_state(&self) -> CompetitionState {
        self.read_inner().state.clone()
    }

    /// Change counter; incremented by every merge and reset.
    pub fn version(&self) -> u64 {
        self.read_inner().version
    }

    /// Consistent view of the state with its counter and merge time.
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.read_inner();
        StoreSnapshot {
            state: inner.state.clone(),
            version: inner.version,
            updated_at: inner.updated_at,
        }
    }

    /// Shallow-merge `patch` into the snapshot.
    ///
    /// The local merge always lands first. With `sync_remote`, the settings
    /// part of the patch is then written upstream in the background; a failed
    /// write leaves the local merge in place.
    pub fn update_state(&self, patch: StatePatch, options: UpdateOptions) -> UpdateReceipt {
        let upstream_patch = patch.settings_patch();
        let (version, flags_changed) = {
            let mut inner = self.write_inner();
            let before = persisted_flags(&inner.state);
            patch.apply(&mut inner.state);
            inner.version += 1;
            inner.updated_at = SystemTime::now();
            let after = persisted_flags(&inner.state);
            (inner.version, (before != after).then_some(after))
        };

        if let (Some(flags), Some(store)) = (flags_changed, &self.flags) {
            if let Err(err) = store.save(flags) {
                warn!(path = %store.path().display(), error = %err, "failed to persist flags");
            }
        }

        if options.suppress_event {
            debug!(version, "competition state merged silently");
        } else {
            self.notifier.notify(Topic::CompetitionStateUpdated);
        }

        let upstream = if options.sync_remote {
            self.spawn_upstream_write(upstream_patch)
        } else {
            UpstreamWrite::NotRequested
        };

        UpdateReceipt { version, upstream }
    }

    /// Restore the default snapshot and notify.
    pub fn reset(&self) -> u64 {
        let version = {
            let mut inner = self.write_inner();
            inner.state = CompetitionState::default();
            inner.version += 1;
            inner.updated_at = SystemTime::now();
            inner.version
        };
        self.notifier.notify(Topic::CompetitionStateUpdated);
        version
    }

    fn spawn_upstream_write(&self, patch: SettingsPatch) -> UpstreamWrite {
        if patch.is_empty() {
            return UpstreamWrite::NotRequested;
        }
        let Some(settings) = self.settings.clone() else {
            warn!(?patch, "remote sync requested but no settings collaborator is attached");
            return UpstreamWrite::Skipped;
        };
        match Handle::try_current() {
            Ok(runtime) => UpstreamWrite::InFlight(
                runtime.spawn(async move { settings.write_settings(patch).await }),
            ),
            Err(_) => {
                warn!(?patch, "remote sync requested outside of a runtime; skipped");
                UpstreamWrite::Skipped
            }
        }
    }

    fn read_inner(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn persisted_flags(state: &CompetitionState) -> PersistedFlags {
    PersistedFlags {
        event_day_started: state.event_day_started,
        profiles_locked: state.profiles_locked,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::dao::{
        memory::MemoryRemoteSource,
        models::{LiveSession, SessionPhase},
    };

    #[derive(Default)]
    struct RecordingNotifier {
        topics: Mutex<Vec<Topic>>,
    }

    impl RecordingNotifier {
        fn count(&self) -> usize {
            self.topics.lock().unwrap().len()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, topic: Topic) {
            self.topics.lock().unwrap().push(topic);
        }
    }

    fn store() -> (CompetitionStore, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (CompetitionStore::new(notifier.clone()), notifier)
    }

    fn session(team_id: i64) -> LiveSession {
        LiveSession {
            team_id,
            phase: SessionPhase::Run,
            started_at: "2026-03-14T10:00:00Z".into(),
            arena_id: 1,
        }
    }

    #[test]
    fn merge_is_shallow_and_additive() {
        let (store, _) = store();
        store.update_state(StatePatch::new().event_day_started(true), UpdateOptions::notify());

        let state = store.get_state();
        assert!(!state.is_live);
        assert!(state.event_day_started);
        assert!(!state.profiles_locked);
    }

    #[test]
    fn suppressed_merge_changes_state_without_notifying() {
        let (store, notifier) = store();
        store.update_state(StatePatch::new().is_live(true), UpdateOptions::silent());
        assert!(store.get_state().is_live);
        assert_eq!(notifier.count(), 0);

        store.update_state(StatePatch::new(), UpdateOptions::notify());
        assert_eq!(
            *notifier.topics.lock().unwrap(),
            vec![Topic::CompetitionStateUpdated]
        );
    }

    #[test]
    fn live_sessions_are_replaced_not_merged() {
        let (store, _) = store();
        let seeded: LiveSessions = [("A".to_string(), session(1))].into_iter().collect();
        store.update_state(StatePatch::new().live_sessions(seeded), UpdateOptions::notify());

        let refreshed: LiveSessions = [("B".to_string(), session(2))].into_iter().collect();
        store.update_state(
            StatePatch::new().live_sessions(refreshed.clone()),
            UpdateOptions::notify(),
        );

        assert_eq!(store.get_state().live_sessions, refreshed);
    }

    #[test]
    fn empty_session_refresh_clears_live_flag() {
        let (store, _) = store();
        let seeded: LiveSessions = [("A".to_string(), session(1))].into_iter().collect();
        store.update_state(StatePatch::new().live_sessions(seeded), UpdateOptions::notify());
        assert!(store.get_state().is_live);

        store.update_state(
            StatePatch::new().live_sessions(LiveSessions::new()),
            UpdateOptions::notify(),
        );
        assert!(!store.get_state().is_live);
    }

    #[test]
    fn every_merge_bumps_the_version() {
        let (store, _) = store();
        assert_eq!(store.version(), 0);
        assert_eq!(store.update_state(StatePatch::new(), UpdateOptions::silent()).version, 1);
        assert_eq!(store.update_state(StatePatch::new(), UpdateOptions::notify()).version, 2);
        assert_eq!(store.reset(), 3);
    }

    #[test]
    fn reset_restores_defaults_and_notifies() {
        let (store, notifier) = store();
        store.update_state(
            StatePatch::new().event_day_started(true).profiles_locked(true),
            UpdateOptions::silent(),
        );
        store.reset();
        assert_eq!(store.get_state(), CompetitionState::default());
        assert_eq!(notifier.count(), 1);
    }

    #[test]
    fn returned_snapshot_is_detached() {
        let (store, _) = store();
        let mut snapshot = store.get_state();
        snapshot.event_day_started = true;
        assert!(!store.get_state().event_day_started);
    }

    #[test]
    fn snapshot_pairs_state_with_its_version() {
        let (store, _) = store();
        let store = Arc::new(store);
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for round in 1..=2000u64 {
                    store.update_state(
                        StatePatch::new().event_day_started(round % 2 == 1),
                        UpdateOptions::silent(),
                    );
                }
            })
        };

        while !writer.is_finished() {
            let snapshot = store.snapshot();
            assert_eq!(snapshot.state.event_day_started, snapshot.version % 2 == 1);
        }
        writer.join().unwrap();
        assert_eq!(store.snapshot().version, 2000);
    }

    #[test]
    fn seeds_from_persisted_flags_and_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        FlagsStore::open(&path)
            .save(PersistedFlags {
                event_day_started: true,
                profiles_locked: false,
            })
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let store = CompetitionStore::new(notifier).with_flags(Arc::new(FlagsStore::open(&path)));
        assert!(store.get_state().event_day_started);

        store.update_state(StatePatch::new().profiles_locked(true), UpdateOptions::notify());
        assert_eq!(
            FlagsStore::open(&path).load(),
            Some(PersistedFlags {
                event_day_started: true,
                profiles_locked: true,
            })
        );
    }

    #[tokio::test]
    async fn synced_merge_writes_upstream() {
        let remote = MemoryRemoteSource::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let store = CompetitionStore::new(notifier.clone())
            .with_settings(SettingsSync::new(Arc::new(remote.clone())));

        let receipt = store.update_state(
            StatePatch::new().event_day_started(true),
            UpdateOptions::synced(),
        );
        assert!(store.get_state().event_day_started);
        assert_eq!(notifier.count(), 1);

        assert!(receipt.upstream_synced().await);
        assert!(remote.settings().event_day_started);
    }

    #[tokio::test]
    async fn failed_upstream_write_keeps_local_merge() {
        let remote = MemoryRemoteSource::new();
        remote.set_offline(true);
        let notifier = Arc::new(RecordingNotifier::default());
        let store = CompetitionStore::new(notifier)
            .with_settings(SettingsSync::new(Arc::new(remote.clone())));

        let receipt = store.update_state(
            StatePatch::new().profiles_locked(true),
            UpdateOptions::synced(),
        );

        assert!(!receipt.upstream_synced().await);
        assert!(store.get_state().profiles_locked);
        assert!(!remote.settings().profiles_locked);
    }

    #[tokio::test]
    async fn live_only_patch_has_nothing_to_sync() {
        let remote = MemoryRemoteSource::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let store = CompetitionStore::new(notifier)
            .with_settings(SettingsSync::new(Arc::new(remote.clone())));

        let receipt = store.update_state(StatePatch::new().is_live(true), UpdateOptions::synced());
        assert!(matches!(receipt.upstream, UpstreamWrite::NotRequested));
        assert!(receipt.upstream_synced().await);
        assert_eq!(remote.settings_writes(), 0);
    }

    #[test]
    fn sync_outside_a_runtime_reports_not_synced() {
        let remote = MemoryRemoteSource::new();
        let store = CompetitionStore::new(Arc::new(RecordingNotifier::default()))
            .with_settings(SettingsSync::new(Arc::new(remote.clone())));

        let receipt = store.update_state(
            StatePatch::new().event_day_started(true),
            UpdateOptions::synced(),
        );
        assert!(store.get_state().event_day_started);
        assert!(matches!(receipt.upstream, UpstreamWrite::Skipped));

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert!(!runtime.block_on(receipt.upstream_synced()));
        assert_eq!(remote.settings_writes(), 0);
    }

    #[tokio::test]
    async fn sync_without_settings_collaborator_reports_not_synced() {
        let (store, notifier) = store();
        let receipt = store.update_state(
            StatePatch::new().profiles_locked(true),
            UpdateOptions::synced(),
        );
        assert!(store.get_state().profiles_locked);
        assert_eq!(notifier.count(), 1);
        assert!(!receipt.upstream_synced().await);
    }
}
