//! Per-table push subscriptions with a stable callback cell.
//!
//! A [`RealtimeSubscription`] opens one transport channel when mounted and
//! keeps it for its whole lifetime. Replacing the callback swaps the content
//! of the cell; the channel is never reopened. Dropping the handle tears the
//! channel down and clears the cell, so no callback runs afterwards.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use dashmap::DashMap;
use futures::{
    StreamExt,
    future::{self, BoxFuture},
    stream::BoxStream,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

/// Row-level operation reported by the push transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
}

/// Operations a subscription is interested in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventFilter {
    /// Inserts only.
    Insert,
    /// Updates only.
    Update,
    /// Deletes only.
    Delete,
    /// Every operation (`*`).
    #[default]
    All,
}

impl EventFilter {
    /// Whether a change of `kind` passes the filter.
    pub fn matches(&self, kind: ChangeKind) -> bool {
        matches!(
            (self, kind),
            (EventFilter::All, _)
                | (EventFilter::Insert, ChangeKind::Insert)
                | (EventFilter::Update, ChangeKind::Update)
                | (EventFilter::Delete, ChangeKind::Delete)
        )
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventFilter::Insert => "INSERT",
            EventFilter::Update => "UPDATE",
            EventFilter::Delete => "DELETE",
            EventFilter::All => "*",
        })
    }
}

/// One row-level change pushed by the remote data service.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    /// Table the row belongs to.
    pub table: String,
    /// Operation applied to the row.
    pub kind: ChangeKind,
    /// Row after the change (empty object for deletes).
    pub row: Value,
    /// Row before the change, when the transport sends it.
    pub old_row: Option<Value>,
}

/// Failure to open a push channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Channel names are unique per transport.
    #[error("channel `{0}` is already open")]
    ChannelInUse(String),
    /// The transport refused or lost the connection.
    #[error("push transport unavailable: {0}")]
    Unavailable(String),
}

/// Per-table channel subscribe/unsubscribe contract of the push transport.
///
/// Reconnection after a connection drop is the transport's business; the
/// stream simply resumes yielding changes.
pub trait PushTransport: Send + Sync {
    /// Open `channel` on `table`, resolving once the transport acknowledges it.
    fn subscribe(
        &self,
        channel: &str,
        table: &str,
    ) -> BoxFuture<'static, Result<BoxStream<'static, RowChange>, TransportError>>;
    /// Close `channel`. Unknown channels are ignored.
    fn unsubscribe(&self, channel: &str);
}

/// In-process push transport fed by the webhook ingress.
pub struct LocalPushTransport {
    tables: DashMap<String, broadcast::Sender<RowChange>>,
    channels: DashMap<String, String>,
    capacity: usize,
}

impl LocalPushTransport {
    /// Transport buffering up to `capacity` changes per table.
    pub fn new(capacity: usize) -> Self {
        Self {
            tables: DashMap::new(),
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Deliver `change` to every channel open on its table. Returns the number of receivers.
    pub fn publish(&self, change: RowChange) -> usize {
        let table = change.table.clone();
        let delivered = self
            .tables
            .get(&table)
            .and_then(|sender| sender.send(change).ok())
            .unwrap_or(0);
        debug!(%table, delivered, "row change published");
        delivered
    }

    /// Number of open channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for LocalPushTransport {
    fn default() -> Self {
        Self::new(256)
    }
}

impl PushTransport for LocalPushTransport {
    fn subscribe(
        &self,
        channel: &str,
        table: &str,
    ) -> BoxFuture<'static, Result<BoxStream<'static, RowChange>, TransportError>> {
        if self.channels.contains_key(channel) {
            return Box::pin(future::ready(Err(TransportError::ChannelInUse(
                channel.to_string(),
            ))));
        }
        self.channels.insert(channel.to_string(), table.to_string());

        let receiver = self
            .tables
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let channel = channel.to_string();
        let stream = BroadcastStream::new(receiver)
            .filter_map(move |item| {
                let change = match item {
                    Ok(change) => Some(change),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        info!(%channel, skipped, "push channel lagged; changes dropped");
                        None
                    }
                };
                future::ready(change)
            })
            .boxed();

        Box::pin(future::ready(Ok(stream)))
    }

    fn unsubscribe(&self, channel: &str) {
        if let Some((_, table)) = self.channels.remove(channel) {
            debug!(%channel, %table, "push channel closed");
        }
    }
}

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Not subscribed: never acknowledged, failed, or unmounted.
    Unsubscribed,
    /// Waiting for the transport acknowledgement.
    Subscribing,
    /// Receiving changes.
    Subscribed,
}

type ChangeCallback = Box<dyn Fn(RowChange) + Send + Sync>;
type CallbackCell = Arc<RwLock<Option<ChangeCallback>>>;

/// Mounted subscription to one table. Dropping it unmounts.
pub struct RealtimeSubscription {
    channel: String,
    table: String,
    callback: CallbackCell,
    state: Arc<watch::Sender<SubscriptionState>>,
    transport: Arc<dyn PushTransport>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeSubscription {
    /// Open a channel for `table` and deliver matching changes to `callback`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount<F>(
        transport: Arc<dyn PushTransport>,
        table: &str,
        filter: EventFilter,
        callback: F,
    ) -> Self
    where
        F: Fn(RowChange) + Send + Sync + 'static,
    {
        let channel = format!("{table}-changes-{:08x}", rand::random::<u32>());
        let callback: ChangeCallback = Box::new(callback);
        let callback: CallbackCell = Arc::new(RwLock::new(Some(callback)));
        let (state, _rx) = watch::channel(SubscriptionState::Subscribing);
        let state = Arc::new(state);

        let task = tokio::spawn(run_channel(
            transport.clone(),
            channel.clone(),
            table.to_string(),
            filter,
            callback.clone(),
            state.clone(),
        ));

        Self {
            channel,
            table: table.to_string(),
            callback,
            state,
            transport,
            task: Some(task),
        }
    }

    /// Replace the callback without touching the channel.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(RowChange) + Send + Sync + 'static,
    {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(callback));
    }

    /// Transport channel name, unique per mount.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Table the subscription listens to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Wait for the transport acknowledgement. `false` if the subscription failed.
    pub async fn ready(&self) -> bool {
        let mut rx = self.state.subscribe();
        match rx
            .wait_for(|state| *state != SubscriptionState::Subscribing)
            .await
        {
            Ok(state) => *state == SubscriptionState::Subscribed,
            Err(_) => false,
        }
    }

    /// Tear the subscription down.
    ///
    /// Runs immediately even when work spawned by an earlier callback is
    /// still pending; that work is not cancelled, but no callback runs after
    /// this returns. When called from inside the subscription's own callback,
    /// the callback in flight finishes first.
    pub fn unmount(self) {}
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        // The channel task stops delivering as soon as it sees this.
        self.state.send_replace(SubscriptionState::Unsubscribed);

        let task = self.task.take();
        let from_own_callback = task
            .as_ref()
            .is_some_and(|task| tokio::task::try_id() == Some(task.id()));
        if from_own_callback {
            // The channel task holds the cell for the running callback; it
            // releases it once the callback returns.
            debug!(channel = %self.channel, "subscription dropped from its own callback");
        } else {
            // Clearing the cell waits for an in-flight callback to return.
            self.callback
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
        if let Some(task) = task {
            task.abort();
        }
        self.transport.unsubscribe(&self.channel);
        debug!(channel = %self.channel, table = %self.table, "realtime subscription unmounted");
    }
}

async fn run_channel(
    transport: Arc<dyn PushTransport>,
    channel: String,
    table: String,
    filter: EventFilter,
    callback: CallbackCell,
    state: Arc<watch::Sender<SubscriptionState>>,
) {
    let mut changes = match transport.subscribe(&channel, &table).await {
        Ok(changes) => changes,
        Err(err) => {
            warn!(%channel, %table, error = %err, "realtime subscription failed");
            state.send_replace(SubscriptionState::Unsubscribed);
            return;
        }
    };

    state.send_if_modified(|current| {
        if *current == SubscriptionState::Subscribing {
            *current = SubscriptionState::Subscribed;
            true
        } else {
            false
        }
    });
    info!(%channel, %table, %filter, "realtime subscription ready");

    while let Some(change) = changes.next().await {
        if !filter.matches(change.kind) {
            continue;
        }
        let guard = callback.read().unwrap_or_else(PoisonError::into_inner);
        if *state.borrow() == SubscriptionState::Unsubscribed {
            break;
        }
        match guard.as_ref() {
            Some(callback) => callback(change),
            None => break,
        }
    }

    info!(%channel, %table, "push stream ended");
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use serde_json::json;
    use tokio::{sync::mpsc, time::sleep};

    use super::*;

    fn change(table: &str, kind: ChangeKind, id: i64) -> RowChange {
        RowChange {
            table: table.into(),
            kind,
            row: json!({ "id": id }),
            old_row: None,
        }
    }

    fn forward(tx: mpsc::UnboundedSender<RowChange>) -> impl Fn(RowChange) + Send + Sync {
        move |change| {
            let _ = tx.send(change);
        }
    }

    struct RefusingTransport;

    impl PushTransport for RefusingTransport {
        fn subscribe(
            &self,
            _channel: &str,
            _table: &str,
        ) -> BoxFuture<'static, Result<BoxStream<'static, RowChange>, TransportError>> {
            Box::pin(future::ready(Err(TransportError::Unavailable(
                "socket closed".into(),
            ))))
        }

        fn unsubscribe(&self, _channel: &str) {}
    }

    #[test]
    fn filter_matches_operations() {
        assert!(EventFilter::All.matches(ChangeKind::Delete));
        assert!(EventFilter::Insert.matches(ChangeKind::Insert));
        assert!(!EventFilter::Insert.matches(ChangeKind::Update));
        assert_eq!(EventFilter::All.to_string(), "*");
    }

    #[tokio::test]
    async fn latest_callback_receives_changes() {
        let transport = Arc::new(LocalPushTransport::default());
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let subscription =
            RealtimeSubscription::mount(transport.clone(), "scores", EventFilter::All, forward(tx1));
        assert!(subscription.ready().await);

        transport.publish(change("scores", ChangeKind::Insert, 1));
        assert_eq!(rx1.recv().await.unwrap().row["id"], 1);

        let (tx2, mut rx2) = mpsc::unbounded_channel();
        subscription.set_callback(forward(tx2));
        transport.publish(change("scores", ChangeKind::Update, 2));
        assert_eq!(rx2.recv().await.unwrap().row["id"], 2);
        assert!(rx1.recv().await.is_none());

        subscription.unmount();
        transport.publish(change("scores", ChangeKind::Update, 3));
        assert!(rx2.recv().await.is_none());
    }

    #[tokio::test]
    async fn filtered_operations_are_skipped() {
        let transport = Arc::new(LocalPushTransport::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription =
            RealtimeSubscription::mount(transport.clone(), "teams", EventFilter::Insert, forward(tx));
        assert!(subscription.ready().await);

        transport.publish(change("teams", ChangeKind::Update, 1));
        transport.publish(change("teams", ChangeKind::Insert, 2));
        assert_eq!(rx.recv().await.unwrap().row["id"], 2);
    }

    #[tokio::test]
    async fn mounts_on_the_same_table_get_distinct_channels() {
        let transport = Arc::new(LocalPushTransport::default());
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = RealtimeSubscription::mount(transport.clone(), "teams", EventFilter::All, forward(tx_a));
        let b = RealtimeSubscription::mount(transport.clone(), "teams", EventFilter::All, forward(tx_b));
        assert!(a.ready().await && b.ready().await);
        assert_ne!(a.channel(), b.channel());
        assert!(a.channel().starts_with("teams-changes-"));
        assert_eq!(transport.channel_count(), 2);

        assert_eq!(transport.publish(change("teams", ChangeKind::Delete, 5)), 2);
        assert_eq!(rx_a.recv().await.unwrap().kind, ChangeKind::Delete);
        assert_eq!(rx_b.recv().await.unwrap().kind, ChangeKind::Delete);

        drop(a);
        assert_eq!(transport.channel_count(), 1);
        assert_eq!(b.state(), SubscriptionState::Subscribed);
    }

    #[tokio::test]
    async fn other_tables_are_not_delivered() {
        let transport = Arc::new(LocalPushTransport::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription =
            RealtimeSubscription::mount(transport.clone(), "teams", EventFilter::All, forward(tx));
        assert!(subscription.ready().await);

        assert_eq!(transport.publish(change("settings", ChangeKind::Update, 1)), 0);
        drop(subscription);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_does_not_wait_for_fetches_started_by_the_callback() {
        let transport = Arc::new(LocalPushTransport::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let (fetched_tx, mut fetched_rx) = mpsc::unbounded_channel();
        let subscription = {
            let calls = calls.clone();
            RealtimeSubscription::mount(transport.clone(), "scores", EventFilter::All, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                let fetched_tx = fetched_tx.clone();
                tokio::spawn(async move {
                    sleep(Duration::from_secs(5)).await;
                    let _ = fetched_tx.send(());
                });
            })
        };
        assert!(subscription.ready().await);

        transport.publish(change("scores", ChangeKind::Update, 1));
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        subscription.unmount();
        assert_eq!(transport.channel_count(), 0);
        transport.publish(change("scores", ChangeKind::Update, 2));

        // the slow fetch still completes, but nothing is delivered afterwards
        assert_eq!(fetched_rx.recv().await, Some(()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn callback_may_drop_its_own_subscription() {
        let transport = Arc::new(LocalPushTransport::default());
        let slot: Arc<Mutex<Option<RealtimeSubscription>>> = Arc::new(Mutex::new(None));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = {
            let slot = slot.clone();
            RealtimeSubscription::mount(transport.clone(), "scores", EventFilter::All, move |change| {
                let own = slot.lock().unwrap().take();
                drop(own);
                let _ = tx.send(change);
            })
        };
        assert!(subscription.ready().await);
        *slot.lock().unwrap() = Some(subscription);

        transport.publish(change("scores", ChangeKind::Insert, 1));
        let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("callback returned")
            .expect("change delivered");
        assert_eq!(delivered.row["id"], 1);
        assert_eq!(transport.channel_count(), 0);

        transport.publish(change("scores", ChangeKind::Insert, 2));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn transport_failure_leaves_subscription_unsubscribed() {
        let subscription = RealtimeSubscription::mount(
            Arc::new(RefusingTransport),
            "teams",
            EventFilter::All,
            |_| {},
        );
        assert!(!subscription.ready().await);
        assert_eq!(subscription.state(), SubscriptionState::Unsubscribed);
    }
}
