/// Topic bus with synchronous listeners and a tab fan-out.
pub mod bus;
/// Keyed collection cache with freshness stamps.
pub mod cache;
/// Canonical competition snapshot.
pub mod competition;

use std::sync::{Arc, Weak};

use dashmap::DashSet;

use crate::{
    config::AppConfig,
    dao::{flags::FlagsStore, remote::RemoteSource},
    services::{fetchers::Fetchers, realtime::LocalPushTransport, settings::SettingsSync},
};

use self::{
    bus::EventBus,
    cache::{CacheKey, KeyedCache},
    competition::CompetitionStore,
};

/// Handle to the process-wide state shared by handlers and background tasks.
pub type SharedState = Arc<AppState>;

/// Capacity of the per-tab topic fan-out.
const BUS_CAPACITY: usize = 64;

/// Process-wide singletons: bus, cache, competition store and their collaborators.
pub struct AppState {
    config: AppConfig,
    bus: Arc<EventBus>,
    fetchers: Fetchers,
    settings: SettingsSync,
    store: CompetitionStore,
    flags: Arc<FlagsStore>,
    transport: Arc<LocalPushTransport>,
    revalidating: DashSet<CacheKey>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The competition store is seeded from the persisted flags found at the
    /// configured path.
    pub fn new(config: AppConfig, source: Arc<dyn RemoteSource>) -> SharedState {
        let bus = Arc::new(EventBus::new(BUS_CAPACITY));
        let cache = Arc::new(KeyedCache::new());
        let fetchers = Fetchers::new(cache, source.clone(), config.cache_ttl());
        let settings = SettingsSync::new(source);
        let flags = Arc::new(FlagsStore::open(config.flags_path()));
        let store = CompetitionStore::new(bus.clone())
            .with_settings(settings.clone())
            .with_flags(flags.clone());

        Arc::new(Self {
            config,
            bus,
            fetchers,
            settings,
            store,
            flags,
            transport: Arc::new(LocalPushTransport::default()),
            revalidating: DashSet::new(),
        })
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Event bus carrying every change notification of the process.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Keyed collection cache.
    pub fn cache(&self) -> &Arc<KeyedCache> {
        self.fetchers.cache()
    }

    /// Cache-backed remote reads.
    pub fn fetchers(&self) -> &Fetchers {
        &self.fetchers
    }

    /// Remote settings collaborator.
    pub fn settings(&self) -> &SettingsSync {
        &self.settings
    }

    /// The canonical competition snapshot.
    pub fn store(&self) -> &CompetitionStore {
        &self.store
    }

    /// Persisted flags record.
    pub fn flags(&self) -> &Arc<FlagsStore> {
        &self.flags
    }

    /// Push transport fed by the webhook ingress.
    pub fn transport(&self) -> &Arc<LocalPushTransport> {
        &self.transport
    }

    /// Mark `key` as being revalidated. `None` when a revalidation is already running.
    ///
    /// The mark is released when the returned guard drops, including when
    /// the task holding it panics or is aborted.
    pub(crate) fn begin_revalidation(self: &Arc<Self>, key: CacheKey) -> Option<RevalidationGuard> {
        self.revalidating.insert(key).then(|| RevalidationGuard {
            state: Arc::downgrade(self),
            key,
        })
    }

    #[cfg(test)]
    pub(crate) fn is_revalidating(&self, key: CacheKey) -> bool {
        self.revalidating.contains(&key)
    }
}

/// Holds the revalidation mark of one cache key.
pub(crate) struct RevalidationGuard {
    state: Weak<AppState>,
    key: CacheKey,
}

impl Drop for RevalidationGuard {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.revalidating.remove(&self.key);
        }
    }
}
