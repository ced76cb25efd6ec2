use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("All {limit} executor threads are busy")]
    Saturated { limit: usize },
    #[error("Failed to spawn executor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct Inner {
    name: String,
    limit: usize,
    keep_alive: Duration,
    live: AtomicUsize,
    spawned: AtomicUsize,
    handoff_tx: flume::Sender<Task>,
    handoff_rx: flume::Receiver<Task>,
}

/// OS-thread pool without a queue: a task is handed to an idle worker or to
/// a freshly spawned one, and rejected once `limit` workers are busy.
/// Workers idle for longer than `keep_alive` exit.
#[derive(Clone)]
pub struct AdmissionPool {
    inner: Arc<Inner>,
}

impl AdmissionPool {
    pub fn new(name: impl Into<String>, limit: NonZeroUsize, keep_alive: Duration) -> Self {
        let (handoff_tx, handoff_rx) = flume::bounded(0);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                limit: limit.get(),
                keep_alive,
                live: AtomicUsize::new(0),
                spawned: AtomicUsize::new(0),
                handoff_tx,
                handoff_rx,
            }),
        }
    }

    /// Worker threads currently alive, busy or idle.
    pub fn live_workers(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    pub fn submit(&self, task: Task) -> Result<(), PoolError> {
        let task = match self.inner.handoff_tx.try_send(task) {
            Ok(()) => return Ok(()),
            Err(flume::TrySendError::Full(task) | flume::TrySendError::Disconnected(task)) => task,
        };
        self.spawn_worker(task)
    }

    fn spawn_worker(&self, first: Task) -> Result<(), PoolError> {
        let inner = &self.inner;
        inner
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < inner.limit).then_some(live + 1)
            })
            .map_err(|_| PoolError::Saturated { limit: inner.limit })?;

        let id = inner.spawned.fetch_add(1, Ordering::Relaxed);
        let worker = self.inner.clone();
        std::thread::Builder::new()
            .name(format!("{}-{id}", inner.name))
            .spawn(move || run_worker(worker, first))
            .map(|_| ())
            .map_err(|e| {
                inner.live.fetch_sub(1, Ordering::SeqCst);
                error!(error = %e, "Could not spawn executor thread");
                PoolError::Spawn(e)
            })
    }
}

/// Releases the worker's slot, also when a task panics.
struct LiveSlot(Arc<Inner>);

impl Drop for LiveSlot {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_worker(inner: Arc<Inner>, first: Task) {
    let slot = LiveSlot(inner);
    first();
    while let Ok(task) = slot.0.handoff_rx.recv_timeout(slot.0.keep_alive) {
        task();
    }
    debug!("Executor thread idle, exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn limit(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "Condition not reached in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn rejects_past_the_limit() {
        let pool = AdmissionPool::new("test-executor", limit(2), Duration::from_secs(60));
        let (release_tx, release_rx) = flume::unbounded::<()>();

        for _ in 0..2 {
            let release = release_rx.clone();
            pool.submit(Box::new(move || {
                let _ = release.recv();
            }))
            .unwrap();
        }
        assert_eq!(pool.live_workers(), 2);

        let rejected = pool.submit(Box::new(|| {}));
        assert!(matches!(rejected, Err(PoolError::Saturated { limit: 2 })));

        drop(release_tx);
    }

    #[test]
    fn idle_worker_takes_next_task() {
        let pool = AdmissionPool::new("test-executor", limit(1), Duration::from_secs(60));
        let (done_tx, done_rx) = flume::unbounded();

        let done = done_tx.clone();
        pool.submit(Box::new(move || done.send(1).unwrap())).unwrap();
        assert_eq!(done_rx.recv().unwrap(), 1);

        // The worker hands itself back to the pool shortly after finishing.
        let mut accepted = false;
        for _ in 0..500 {
            let done = done_tx.clone();
            if pool.submit(Box::new(move || done.send(2).unwrap())).is_ok() {
                accepted = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(accepted, "Idle worker should accept work");
        assert_eq!(done_rx.recv().unwrap(), 2);
        assert_eq!(pool.live_workers(), 1);
    }

    #[test]
    fn idle_workers_are_reclaimed() {
        let pool = AdmissionPool::new("test-executor", limit(4), Duration::from_millis(20));
        pool.submit(Box::new(|| {})).unwrap();
        wait_until(|| pool.live_workers() == 0);
    }

    #[test]
    fn panicking_task_releases_its_slot() {
        let pool = AdmissionPool::new("test-executor", limit(1), Duration::from_secs(60));
        pool.submit(Box::new(|| panic!("task failure"))).unwrap();
        wait_until(|| pool.live_workers() == 0);
        assert!(pool.submit(Box::new(|| {})).is_ok());
    }
}
