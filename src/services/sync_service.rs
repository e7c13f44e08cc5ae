//! Refresh paths feeding the cache and the competition store, and the
//! start-up wiring that connects them to the push transport.

use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    dao::models::{Resource, Variant},
    error::ServiceError,
    services::{
        debounce::Debouncer,
        event_bridge::{self, RefetchBridge},
        realtime::{EventFilter, RealtimeSubscription, RowChange},
    },
    state::{
        SharedState,
        bus::Topic,
        cache::CacheKey,
        competition::{StatePatch, UpdateOptions},
    },
};

/// Remote tables the process subscribes to.
pub const LIVE_SESSIONS_TABLE: &str = "live_sessions";
/// Remote settings row.
pub const SETTINGS_TABLE: &str = "settings";
/// Registered teams.
pub const TEAMS_TABLE: &str = "teams";
/// Competition categories.
pub const COMPETITIONS_TABLE: &str = "competitions";

const KNOWN_TABLES: [&str; 4] = [
    LIVE_SESSIONS_TABLE,
    SETTINGS_TABLE,
    TEAMS_TABLE,
    COMPETITIONS_TABLE,
];

/// Hand a webhook-delivered row change to the push transport.
pub fn ingest_push(state: &SharedState, change: RowChange) -> Result<usize, ServiceError> {
    if !KNOWN_TABLES.contains(&change.table.as_str()) {
        return Err(ServiceError::NotFound(format!("table `{}`", change.table)));
    }
    let table = change.table.clone();
    let kind = change.kind;
    let delivered = state.transport().publish(change);
    debug!(%table, ?kind, delivered, "push change ingested");
    Ok(delivered)
}

/// Replace the live-session snapshot with the remote one.
///
/// On failure the last snapshot stays in place.
pub async fn refresh_live_sessions(state: &SharedState, options: UpdateOptions) -> bool {
    match state.fetchers().fetch_live_sessions().await {
        Ok(sessions) => {
            let count = sessions.len();
            let receipt = state
                .store()
                .update_state(StatePatch::new().live_sessions(sessions), options);
            debug!(count, version = receipt.version, "live sessions refreshed");
            true
        }
        Err(err) => {
            warn!(error = %err, "live session refresh failed; keeping last snapshot");
            false
        }
    }
}

/// Pull the event-day flags from the remote settings row and merge them, notifying.
pub async fn sync_event_day_status(state: &SharedState) -> bool {
    match state.settings().read_settings().await {
        Ok(settings) => {
            state
                .store()
                .update_state(StatePatch::from_settings(settings), UpdateOptions::notify());
            true
        }
        Err(err) => {
            warn!(error = %err, "event-day status sync failed; keeping local flags");
            false
        }
    }
}

/// Forced refetch of every cached variant of `resource` (the minimal one on a
/// cold cache), announced with [`Topic::CacheRefreshed`] when anything landed.
pub async fn refresh_resource(state: &SharedState, resource: Resource) -> bool {
    let mut variants = state.fetchers().cached_variants(resource);
    if variants.is_empty() {
        variants.push(Variant::Minimal);
    }

    let mut refreshed = 0;
    for variant in &variants {
        if refetch(state, resource, *variant).await {
            refreshed += 1;
        }
    }

    if refreshed > 0 {
        state.bus().publish(Topic::CacheRefreshed(resource));
    }
    refreshed == variants.len()
}

/// Schedule a forced refetch of a stale entry without waiting for it.
///
/// Concurrent requests for the same entry share one refetch. A refetch that
/// outlives the configured request timeout is dropped so the next stale read
/// can try again.
pub fn revalidate_in_background(state: &SharedState, resource: Resource, variant: Variant) {
    let key = CacheKey::new(resource, variant);
    if state.cache().is_fresh(key, state.fetchers().ttl()) {
        return;
    }
    let Some(guard) = state.begin_revalidation(key) else {
        return;
    };

    let state = state.clone();
    tokio::spawn(async move {
        let _guard = guard;
        let limit = state.config().request_timeout();
        match timeout(limit, refetch(&state, resource, variant)).await {
            Ok(true) => state.bus().publish(Topic::CacheRefreshed(resource)),
            Ok(false) => {}
            Err(_) => warn!(%key, ?limit, "background revalidation timed out"),
        }
    });
}

async fn refetch(state: &SharedState, resource: Resource, variant: Variant) -> bool {
    let result = match resource {
        Resource::Teams => state
            .fetchers()
            .fetch_teams(variant, true)
            .await
            .map(|teams| teams.len()),
        Resource::Competitions => state
            .fetchers()
            .fetch_competitions(variant, true)
            .await
            .map(|competitions| competitions.len()),
    };

    match result {
        Ok(count) => {
            debug!(%resource, %variant, count, "resource refetched");
            true
        }
        Err(err) => {
            warn!(%resource, %variant, error = %err, "resource refetch failed");
            false
        }
    }
}

/// Everything [`start`] installed. Dropping it tears the wiring down.
pub struct SyncHandle {
    refetch: RefetchBridge,
    subscriptions: Vec<RealtimeSubscription>,
    live_refresh: Arc<Debouncer>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    /// Number of realtime subscriptions that are currently open.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Tear every subscription, listener and background task down.
    pub fn stop(self) {}
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.refetch.cancel_pending();
        self.live_refresh.cancel();
        self.tasks.iter().for_each(JoinHandle::abort);
        info!("sync wiring stopped");
    }
}

/// Wire the bus, the push transport, the flags channel and the poller together,
/// then hydrate the store and the cache.
pub async fn start(state: &SharedState) -> SyncHandle {
    let refetch = event_bridge::install_refetch_bridge(state);

    let live_refresh = {
        let weak = Arc::downgrade(state);
        Arc::new(Debouncer::new(state.config().debounce_window(), move || {
            let weak = weak.clone();
            async move {
                if let Some(state) = weak.upgrade() {
                    refresh_live_sessions(&state, UpdateOptions::notify()).await;
                }
            }
        }))
    };

    let subscriptions = open_subscriptions(state, &live_refresh);
    for subscription in &subscriptions {
        if !subscription.ready().await {
            warn!(table = subscription.table(), "realtime subscription not established");
        }
    }

    let mut tasks = vec![
        event_bridge::spawn_storage_bridge(state),
        state
            .flags()
            .spawn_watcher(state.config().flags_watch_interval()),
    ];

    hydrate(state).await;

    tasks.push(spawn_live_poller(state, state.config().live_poll_interval()));
    info!(
        subscriptions = subscriptions.len(),
        version = state.store().version(),
        "sync wiring started"
    );

    SyncHandle {
        refetch,
        subscriptions,
        live_refresh,
        tasks,
    }
}

fn open_subscriptions(
    state: &SharedState,
    live_refresh: &Arc<Debouncer>,
) -> Vec<RealtimeSubscription> {
    let transport = state.transport().clone();

    let live = {
        let live_refresh = live_refresh.clone();
        RealtimeSubscription::mount(
            transport.clone(),
            LIVE_SESSIONS_TABLE,
            EventFilter::All,
            move |_| live_refresh.trigger(),
        )
    };

    let settings = {
        let weak = Arc::downgrade(state);
        RealtimeSubscription::mount(
            transport.clone(),
            SETTINGS_TABLE,
            EventFilter::All,
            move |_| {
                if let Some(state) = weak.upgrade() {
                    tokio::spawn(async move {
                        sync_event_day_status(&state).await;
                    });
                }
            },
        )
    };

    let topic_relay = |table: &str, topic: Topic| {
        let weak = Arc::downgrade(state);
        RealtimeSubscription::mount(transport.clone(), table, EventFilter::All, move |_| {
            if let Some(state) = weak.upgrade() {
                state.bus().publish(topic);
            }
        })
    };

    vec![
        live,
        settings,
        topic_relay(TEAMS_TABLE, Topic::TeamsUpdated),
        topic_relay(COMPETITIONS_TABLE, Topic::CompetitionsUpdated),
    ]
}

async fn hydrate(state: &SharedState) {
    let settings_synced = sync_event_day_status(state).await;
    let sessions_loaded = refresh_live_sessions(state, UpdateOptions::notify()).await;
    let teams_warm = refetch(state, Resource::Teams, Variant::Minimal).await;
    let competitions_warm = refetch(state, Resource::Competitions, Variant::Minimal).await;
    info!(
        settings_synced,
        sessions_loaded, teams_warm, competitions_warm, "initial hydration finished"
    );
}

fn spawn_live_poller(state: &SharedState, every: Duration) -> JoinHandle<()> {
    let weak = Arc::downgrade(state);
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately; hydration already covered it
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(state) = weak.upgrade() else {
                break;
            };
            refresh_live_sessions(&state, UpdateOptions::silent()).await;
        }
    })
}
