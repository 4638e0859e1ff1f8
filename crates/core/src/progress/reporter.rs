use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use crate::metrics::PROGRESS_EVENTS_DROPPED;

/// Receives progress events for one job or batch.
#[async_trait]
pub trait ProgressObserver<E: Send + 'static>: Send + Sync {
    async fn observe(&self, event: E);
}

/// Adapts a plain closure into a [`ProgressObserver`].
///
/// The closure runs inline, so it must not block.
pub struct FnObserver<F, E> {
    f: F,
    _event: PhantomData<fn(E)>,
}

impl<F, E> FnObserver<F, E>
where
    F: Fn(E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<F, E> ProgressObserver<E> for FnObserver<F, E>
where
    F: Fn(E) + Send + Sync,
    E: Send + 'static,
{
    async fn observe(&self, event: E) {
        (self.f)(event)
    }
}

enum Dispatch<E: Send + 'static> {
    Disabled,
    Direct(Arc<dyn ProgressObserver<E>>),
    Queued {
        tx: mpsc::Sender<E>,
        max_block: Duration,
    },
}

/// Handle producers use to report progress.
///
/// This is cheaply cloneable and can be shared across tasks.
pub struct ProgressReporter<E: Send + 'static> {
    dispatch: Arc<Dispatch<E>>,
}

impl<E: Send + 'static> Clone for ProgressReporter<E> {
    fn clone(&self) -> Self {
        Self {
            dispatch: Arc::clone(&self.dispatch),
        }
    }
}

impl<E: Send + 'static> ProgressReporter<E> {
    /// Reporter that drops every event.
    pub fn disabled() -> Self {
        Self {
            dispatch: Arc::new(Dispatch::Disabled),
        }
    }

    /// Calls the observer inline from `report`.
    ///
    /// Only for observers that never block, such as in-memory maps.
    pub fn direct(observer: Arc<dyn ProgressObserver<E>>) -> Self {
        Self {
            dispatch: Arc::new(Dispatch::Direct(observer)),
        }
    }

    /// Creates a queued reporter and its dispatcher without spawning it.
    ///
    /// Returns:
    /// - `ProgressReporter` - for reporting events (clone this to share across tasks)
    /// - `ProgressDispatcher` - spawn this with `tokio::spawn(dispatcher.run())`
    pub fn channel(
        observer: Arc<dyn ProgressObserver<E>>,
        capacity: usize,
        max_block: Duration,
    ) -> (Self, ProgressDispatcher<E>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let reporter = Self {
            dispatch: Arc::new(Dispatch::Queued { tx, max_block }),
        };
        (reporter, ProgressDispatcher { rx, observer })
    }

    /// Delivers events through a bounded queue drained by a background task.
    ///
    /// `report` waits at most `max_block` for queue space, then drops the
    /// event. Must be called inside a tokio runtime.
    pub fn queued(
        observer: Arc<dyn ProgressObserver<E>>,
        capacity: usize,
        max_block: Duration,
    ) -> Self {
        let (reporter, dispatcher) = Self::channel(observer, capacity, max_block);
        tokio::spawn(dispatcher.run());
        reporter
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(*self.dispatch, Dispatch::Disabled)
    }

    /// Report one event.
    ///
    /// Never fails. Events that cannot be delivered are logged and dropped.
    pub async fn report(&self, event: E) {
        match &*self.dispatch {
            Dispatch::Disabled => {}
            Dispatch::Direct(observer) => observer.observe(event).await,
            Dispatch::Queued { tx, max_block } => {
                match tx.send_timeout(event, *max_block).await {
                    Ok(()) => {}
                    Err(SendTimeoutError::Timeout(_)) => {
                        PROGRESS_EVENTS_DROPPED.inc();
                        tracing::warn!(
                            max_block_ms = max_block.as_millis() as u64,
                            "Progress queue full, dropping event"
                        );
                    }
                    Err(SendTimeoutError::Closed(_)) => {
                        tracing::debug!("Progress dispatcher gone, dropping event");
                    }
                }
            }
        }
    }
}

/// Background task that drains queued events into the observer.
pub struct ProgressDispatcher<E: Send + 'static> {
    rx: mpsc::Receiver<E>,
    observer: Arc<dyn ProgressObserver<E>>,
}

impl<E: Send + 'static> ProgressDispatcher<E> {
    /// Run until every reporter handle is dropped.
    ///
    /// A panicking observer loses only the event it panicked on.
    pub async fn run(mut self) {
        tracing::debug!("Progress dispatcher started");

        while let Some(event) = self.rx.recv().await {
            let delivery = AssertUnwindSafe(self.observer.observe(event)).catch_unwind();
            if delivery.await.is_err() {
                tracing::error!("Progress observer panicked");
            }
        }

        tracing::debug!("Progress dispatcher shutting down");
    }
}
