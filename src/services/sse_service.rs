use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::state::{SharedState, bus::Topic};

/// Name of the first event sent to a tab, carrying its identifier.
pub const CONNECTED_EVENT: &str = "connected";

/// Subscribe a new tab to every bus topic.
pub fn subscribe_tab(state: &SharedState) -> (broadcast::Receiver<Topic>, String) {
    let tab_id = Uuid::new_v4().simple().to_string();
    (state.bus().stream(), tab_id)
}

/// SSE event for `topic`: the topic name, no payload.
pub fn topic_event(topic: Topic) -> Event {
    Event::default().event(topic.name()).data(topic.name())
}

/// Convert a topic receiver into an SSE response, forwarding topics until the
/// tab disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<Topic>,
    tab_id: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let hello = Event::default().event(CONNECTED_EVENT).data(tab_id.clone());
        if tx.send(Ok(hello)).await.is_ok() {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    recv_result = receiver.recv() => {
                        match recv_result {
                            Ok(topic) => {
                                if tx.send(Ok(topic_event(topic))).await.is_err() {
                                    break;
                                }
                            }
                            Err(RecvError::Closed) => break,
                            Err(RecvError::Lagged(skipped)) => {
                                // Tabs re-read the source of truth, so missed topics are harmless.
                                debug!(%tab_id, skipped, "SSE tab lagged");
                                continue;
                            }
                        }
                    }
                }
            }
        }

        info!(%tab_id, "SSE tab disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
