//! Cancellable, awaitable playback tasks.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chime_core::{Error, Result};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::trace;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Handle to a spawned task.
///
/// Clones refer to the same task. Cancelling is best-effort: the task stops at
/// its next suspension point.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    abort: Arc<AbortHandle>,
    done: watch::Receiver<bool>,
}

impl TaskHandle {
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        trace!("Cancelling {}", self.id);
        self.abort.abort();
    }

    /// Whether the task ran to completion or was cancelled.
    pub fn is_finished(&self) -> bool {
        *self.done.borrow() || self.abort.is_finished()
    }

    /// Wait until the task completes or is cancelled.
    pub async fn wait(&self) {
        let mut done = self.done.clone();
        // A closed channel means the task was dropped before finishing (cancelled).
        let _ = done.wait_for(|finished| *finished).await;
    }
}

/// Spawns playback work onto the runtime owned by a sound system.
#[derive(Debug, Clone)]
pub struct Scheduler {
    runtime: Handle,
}

impl Scheduler {
    pub const fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Scheduler on the runtime of the calling context.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::Initialization(format!("No tokio runtime available: {e}")))
    }

    pub const fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Spawn `work` under a preallocated id.
    ///
    /// The id is allocated by the caller so the work itself can refer to it.
    pub fn spawn<F>(&self, id: TaskId, work: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (done_tx, done_rx) = watch::channel(false);
        let join = self.runtime.spawn(async move {
            work.await;
            let _ = done_tx.send(true);
        });

        trace!("Spawned {id}");
        TaskHandle {
            id,
            abort: Arc::new(join.abort_handle()),
            done: done_rx,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn test_task_ids_are_unique() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_wait_for_completion() {
        let scheduler = Scheduler::current().unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let handle = scheduler.spawn(TaskId::next(), async move {
            flag.store(true, Ordering::SeqCst);
        });
        handle.wait().await;

        assert!(ran.load(Ordering::SeqCst));
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_waiters() {
        let scheduler = Scheduler::current().unwrap();
        let handle = scheduler.spawn(TaskId::next(), async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let waiter = handle.clone();
        let wait = tokio::spawn(async move { waiter.wait().await });

        tokio::task::yield_now().await;
        let start = tokio::time::Instant::now();
        handle.cancel();
        wait.await.unwrap();

        // The sleep was aborted, not run out by auto-advanced time.
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_current_outside_runtime() {
        assert!(matches!(
            Scheduler::current(),
            Err(Error::Initialization(_))
        ));
    }
}
