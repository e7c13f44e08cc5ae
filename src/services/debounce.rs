//! Trailing-edge debounce: a burst of triggers runs the action once,
//! `window` after the last trigger of the burst.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::{runtime::Handle, task::JoinHandle, time::sleep};
use tracing::{trace, warn};

type Action = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Coalesces triggers into at most one pending run of an async action.
///
/// The pending timer is cancelled on every trigger and on drop. Once the
/// timer fires, the action runs detached and is never cancelled.
pub struct Debouncer {
    window: Duration,
    action: Action,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Debounce `action` with a quiet period of `window`.
    pub fn new<F, Fut>(window: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            window,
            action: Arc::new(move || -> BoxFuture<'static, ()> { Box::pin(action()) }),
            pending: Mutex::new(None),
        }
    }

    /// Quiet period after the last trigger.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// (Re)start the quiet-period timer.
    pub fn trigger(&self) {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("debounce trigger outside of a runtime; ignored");
                return;
            }
        };

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
            trace!("debounce window restarted");
        }

        let window = self.window;
        let action = self.action.clone();
        let spawner = runtime.clone();
        *pending = Some(runtime.spawn(async move {
            sleep(window).await;
            // no await past this point: an abort can no longer drop the run
            spawner.spawn(action());
        }));
    }

    /// Drop the pending run, if any.
    pub fn cancel(&self) {
        if let Some(previous) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            previous.abort();
        }
    }

    /// Whether a trigger is waiting for its quiet period to elapse.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{Instant, sleep_until};

    use super::*;

    const WINDOW: Duration = Duration::from_millis(2000);

    fn recording() -> (Arc<Mutex<Vec<Instant>>>, Debouncer) {
        let runs = Arc::new(Mutex::new(Vec::new()));
        let debouncer = {
            let runs = runs.clone();
            Debouncer::new(WINDOW, move || {
                let runs = runs.clone();
                async move { runs.lock().unwrap().push(Instant::now()) }
            })
        };
        (runs, debouncer)
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_run_after_last_trigger() {
        let (runs, debouncer) = recording();
        let start = Instant::now();

        for offset in [0, 200, 400, 1900, 2100] {
            sleep_until(start + ms(offset)).await;
            debouncer.trigger();
        }

        sleep_until(start + ms(3950)).await;
        assert!(runs.lock().unwrap().is_empty());
        assert!(debouncer.is_pending());

        sleep_until(start + ms(6000)).await;
        let runs = runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0] >= start + ms(3900));
        assert_eq!(runs[0], start + ms(4100));
    }

    #[tokio::test(start_paused = true)]
    async fn isolated_trigger_runs_once_after_window() {
        let (runs, debouncer) = recording();
        let start = Instant::now();
        debouncer.trigger();

        sleep_until(start + WINDOW - ms(1)).await;
        assert!(runs.lock().unwrap().is_empty());

        sleep_until(start + WINDOW * 3).await;
        assert_eq!(*runs.lock().unwrap(), vec![start + WINDOW]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_run_separately() {
        let (runs, debouncer) = recording();
        let start = Instant::now();

        debouncer.trigger();
        sleep_until(start + ms(2500)).await;
        debouncer.trigger();
        sleep_until(start + ms(10_000)).await;

        assert_eq!(
            *runs.lock().unwrap(),
            vec![start + WINDOW, start + ms(4500)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_drop_discard_the_pending_run() {
        let (runs, debouncer) = recording();
        debouncer.trigger();
        debouncer.cancel();
        assert!(!debouncer.is_pending());

        debouncer.trigger();
        drop(debouncer);

        sleep(WINDOW * 2).await;
        assert!(runs.lock().unwrap().is_empty());
    }
}
