//! Bounded pool for detached background refreshes.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

/// Runs refreshes off the request path, at most `capacity` at a time.
///
/// Submissions beyond capacity are dropped rather than queued; the stale
/// entry simply stays until the next request tries again.
#[derive(Debug, Clone)]
pub struct Revalidator {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    capacity: usize,
}

impl Revalidator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { permits: Arc::new(Semaphore::new(capacity)), tracker: TaskTracker::new(), capacity }
    }

    /// Spawn `task` if a slot is free. Returns `false` when skipped.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            tracing::debug!(capacity = self.capacity, "revalidation pool full, skipping refresh");
            return false;
        };
        self.tracker.spawn(async move {
            task.await;
            drop(permit);
        });
        true
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop accepting work and wait for running refreshes to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
