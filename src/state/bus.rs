//! Process-wide publish/subscribe bus with typed, payload-free topics.
//!
//! Listeners receive only the topic; they re-read the source of truth
//! (the competition store or the cache) themselves. Publishing is synchronous:
//! listeners run in registration order before `publish` returns, then the
//! topic is fanned out to asynchronous consumers (SSE tabs).

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, PoisonError, RwLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use indexmap::IndexMap;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::dao::models::Resource;

/// Named notification topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// The competition store was mutated.
    CompetitionStateUpdated,
    /// Competitions changed remotely; cached copies should be refetched.
    CompetitionsUpdated,
    /// Teams changed remotely; cached copies should be refetched.
    TeamsUpdated,
    /// A background refetch repopulated the cache for this resource.
    CacheRefreshed(Resource),
}

impl Topic {
    /// Stable wire name of the topic.
    pub fn name(&self) -> &'static str {
        match self {
            Topic::CompetitionStateUpdated => "competition-state-updated",
            Topic::CompetitionsUpdated => "competitions-updated",
            Topic::TeamsUpdated => "teams-updated",
            Topic::CacheRefreshed(Resource::Teams) => "cache-refreshed:teams",
            Topic::CacheRefreshed(Resource::Competitions) => "cache-refreshed:competitions",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sink for change notifications, injected into the competition store.
pub trait Notifier: Send + Sync {
    /// Publish `topic`.
    fn notify(&self, topic: Topic);
}

/// Handle returned by [`EventBus::subscribe`].
pub type ListenerId = u64;

type Listener = Arc<dyn Fn(Topic) + Send + Sync>;

/// Publish/subscribe hub shared by the whole process.
pub struct EventBus {
    listeners: RwLock<IndexMap<ListenerId, (Topic, Listener)>>,
    next_id: AtomicU64,
    fanout: broadcast::Sender<Topic>,
}

impl EventBus {
    /// Build a bus whose asynchronous fan-out buffers `capacity` topics per consumer.
    pub fn new(capacity: usize) -> Self {
        let (fanout, _rx) = broadcast::channel(capacity);
        Self {
            listeners: RwLock::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
            fanout,
        }
    }

    /// Register `handler` for `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> ListenerId
    where
        F: Fn(Topic) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (topic, Arc::new(handler)));
        id
    }

    /// Register `handler` and unsubscribe it when the returned guard is dropped.
    pub fn subscribe_guarded<F>(self: &Arc<Self>, topic: Topic, handler: F) -> ListenerGuard
    where
        F: Fn(Topic) + Send + Sync + 'static,
    {
        let id = self.subscribe(topic, handler);
        ListenerGuard {
            bus: Arc::downgrade(self),
            id,
        }
    }

    /// Remove a listener. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&id)
            .is_some()
    }

    /// Deliver `topic` to every listener registered for it, in registration order.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe or
    /// unsubscribe while being invoked. A panicking listener is logged and
    /// does not prevent delivery to the following ones.
    pub fn publish(&self, topic: Topic) {
        let targets: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(registered, _)| *registered == topic)
            .map(|(_, listener)| listener.clone())
            .collect();

        trace!(%topic, listeners = targets.len(), "publishing");
        for listener in targets {
            if catch_unwind(AssertUnwindSafe(|| listener(topic))).is_err() {
                warn!(%topic, "event bus listener panicked");
            }
        }

        let _ = self.fanout.send(topic);
    }

    /// Receive every published topic asynchronously.
    pub fn stream(&self) -> broadcast::Receiver<Topic> {
        self.fanout.subscribe()
    }

    /// Number of listeners registered for `topic`.
    pub fn listener_count(&self, topic: Topic) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(registered, _)| *registered == topic)
            .count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier for EventBus {
    fn notify(&self, topic: Topic) {
        self.publish(topic);
    }
}

/// Unsubscribes its listener on drop.
pub struct ListenerGuard {
    bus: Weak<EventBus>,
    id: ListenerId,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Listener) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |label: &'static str| -> Listener {
                let log = log.clone();
                Arc::new(move |_| log.lock().unwrap().push(label))
            }
        };
        (log, make)
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::default();
        let (log, make) = recorder();
        for label in ["first", "second", "third"] {
            let listener = make(label);
            bus.subscribe(Topic::TeamsUpdated, move |topic| listener(topic));
        }

        bus.publish(Topic::TeamsUpdated);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn topics_are_isolated() {
        let bus = EventBus::default();
        let (log, make) = recorder();
        let listener = make("teams");
        bus.subscribe(Topic::TeamsUpdated, move |topic| listener(topic));

        bus.publish(Topic::CompetitionsUpdated);
        bus.publish(Topic::CacheRefreshed(Resource::Teams));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn double_unsubscribe_is_a_noop() {
        let bus = EventBus::default();
        let id = bus.subscribe(Topic::TeamsUpdated, |_| {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(Topic::TeamsUpdated), 0);
    }

    #[test]
    fn panicking_listener_does_not_stop_delivery() {
        let bus = EventBus::default();
        let (log, make) = recorder();
        bus.subscribe(Topic::TeamsUpdated, |_| panic!("boom"));
        let listener = make("after");
        bus.subscribe(Topic::TeamsUpdated, move |topic| listener(topic));

        bus.publish(Topic::TeamsUpdated);
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_publish() {
        let bus = Arc::new(EventBus::default());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let weak = Arc::downgrade(&bus);
        let id = {
            let slot = slot.clone();
            let calls = calls.clone();
            bus.subscribe(Topic::TeamsUpdated, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let (Some(bus), Some(id)) = (weak.upgrade(), *slot.lock().unwrap()) {
                    bus.unsubscribe(id);
                }
            })
        };
        *slot.lock().unwrap() = Some(id);

        bus.publish(Topic::TeamsUpdated);
        bus.publish(Topic::TeamsUpdated);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::default());
        let guard = bus.subscribe_guarded(Topic::CompetitionStateUpdated, |_| {});
        assert_eq!(bus.listener_count(Topic::CompetitionStateUpdated), 1);
        drop(guard);
        assert_eq!(bus.listener_count(Topic::CompetitionStateUpdated), 0);
    }

    #[tokio::test]
    async fn published_topics_reach_async_consumers() {
        let bus = EventBus::default();
        let mut rx = bus.stream();
        bus.publish(Topic::CacheRefreshed(Resource::Competitions));
        assert_eq!(
            rx.recv().await.unwrap(),
            Topic::CacheRefreshed(Resource::Competitions)
        );
    }
}
