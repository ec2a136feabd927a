//! Fire-and-forget work scheduled after a response.
//!
//! Each task runs on its own tokio task and is never cancelled. Callers get a
//! [`DeferredRefresh`] handle; dropping it detaches the task, awaiting it
//! waits for completion.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::gauge;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

pub(crate) const METRIC_DEFERRED_IN_FLIGHT: &str = "edgecache_deferred_in_flight";

/// Spawner for deferred tasks. Cloning shares the in-flight counter.
#[derive(Clone, Default)]
pub struct DeferredTasks {
    in_flight: Arc<AtomicUsize>,
}

impl DeferredTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` in the background.
    pub fn spawn<F>(&self, label: &'static str, task: F) -> DeferredRefresh
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let guard = InFlightGuard::enter(Arc::clone(&self.in_flight));
        let span = info_span!("deferred", task = label, task_id = %id);

        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                task.await;
                debug!("deferred task finished");
            }
            .instrument(span),
        );

        DeferredRefresh { id, handle }
    }

    /// Number of tasks spawned but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Handle to a spawned deferred task.
#[derive(Debug)]
pub struct DeferredRefresh {
    id: Uuid,
    handle: JoinHandle<()>,
}

impl DeferredRefresh {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the task. Returns `false` if it panicked.
    pub async fn finished(self) -> bool {
        self.handle.await.is_ok()
    }
}

// Decrements on drop so a panicking task is still accounted for.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!(METRIC_DEFERRED_IN_FLIGHT).set(now as f64);
        Self(counter)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let now = self.0.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        gauge!(METRIC_DEFERRED_IN_FLIGHT).set(now as f64);
    }
}
