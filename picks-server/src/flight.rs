//! Single-flight execution.
//!
//! At most one run of an expensive operation is in progress at a time;
//! callers arriving while it runs await the same shared result instead of
//! starting their own. The run itself is a spawned task, so a caller that
//! goes away (e.g. a dropped HTTP request) cannot cancel work other callers
//! are waiting on. The slot is cleared by the task as soon as it finishes,
//! success or failure, so the next caller after a failure retries cleanly.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{PicksError, PicksResult};

type SharedRun<T> = Shared<BoxFuture<'static, PicksResult<T>>>;

struct InFlight<T> {
    id: u64,
    run: SharedRun<T>,
}

/// Coalesces concurrent requests for the same expensive value.
pub struct SingleFlight<T> {
    name: &'static str,
    slot: Arc<Mutex<Option<InFlight<T>>>>,
    next_id: AtomicU64,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an idle flight. `name` is used in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    /// Join the in-flight run, or start `make()` if none is running.
    pub async fn run<F, Fut>(&self, make: F) -> PicksResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PicksResult<T>> + Send + 'static,
    {
        self.run_unless(|| None, make).await
    }

    /// Like [`run`](Self::run), but when nothing is in flight `check` is
    /// consulted first (under the slot lock); a `Some` value is returned
    /// without starting a run.
    ///
    /// This closes the window where a caller saw an empty cache just before
    /// a previous run published its value and cleared the slot.
    pub async fn run_unless<C, F, Fut>(&self, check: C, make: F) -> PicksResult<T>
    where
        C: FnOnce() -> Option<T>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = PicksResult<T>> + Send + 'static,
    {
        let run = {
            let mut slot = self.slot.lock().await;

            if let Some(inflight) = slot.as_ref() {
                debug!(flight = self.name, run_id = inflight.id, "Joining in-flight run");
                inflight.run.clone()
            } else {
                if let Some(value) = check() {
                    return Ok(value);
                }

                let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(flight = self.name, run_id = id, "Starting run");

                let work = make();
                let slot_ref = Arc::clone(&self.slot);
                // The task needs the slot lock to clear itself, which it can
                // only take after this block has stored the entry.
                let handle = tokio::spawn(async move {
                    let result = work.await;
                    let mut slot = slot_ref.lock().await;
                    if slot.as_ref().is_some_and(|f| f.id == id) {
                        *slot = None;
                    }
                    result
                });

                let name = self.name;
                let run = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(PicksError::Generation(format!("{name} task failed: {e}"))),
                    }
                }
                .boxed()
                .shared();

                *slot = Some(InFlight {
                    id,
                    run: run.clone(),
                });
                run
            }
        };

        run.await
    }

    /// Whether a run is currently in progress.
    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Number of runs started since creation.
    pub fn runs_started(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}
