//! Worker pool with cancellable, joinable task handles.
//!
//! A [`TaskPool`] owns a few named worker threads draining a shared queue.
//! [`TaskPool::submit`] hands the closure a [`CancelToken`] and returns a
//! [`TaskHandle`] the caller can use to request cooperative cancellation and
//! to block until the task finishes.
//!
//! # Cancellation model
//!
//! Cancellation is cooperative: the worker closure is expected to poll
//! [`CancelToken::is_cancelled`] once per loop iteration and return early.
//! [`TaskHandle::join`] therefore blocks only for a bounded time after
//! [`TaskHandle::request_cancel`] — at most one iteration of the worker's
//! loop. This is the same shutdown discipline the engine's foreground
//! mutation paths rely on: signal first, then join.
//!
//! # Why not one thread per task?
//!
//! Submissions are frequent (every bulk text replacement re-arms a scan) and
//! short-lived. A fixed pool keeps thread creation off the edit path and
//! bounds the engine's thread footprint regardless of how many buffers are
//! open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// A queued unit of work.
type Job = Box<dyn FnOnce() + Send + 'static>;

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Shared cooperative-cancellation flag.
///
/// One token is created per submitted task; the worker polls it, the
/// [`TaskHandle`] sets it. Tokens are cheap to clone (an `Arc` bump) and
/// never reset — a cancelled token stays cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, not-yet-cancelled token.
    ///
    /// Useful on its own when background execution is disabled and the
    /// worker function runs inline on the caller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

/// Handle to one submitted task.
///
/// Dropping the handle detaches the task (it runs to completion, its result
/// is discarded). To stop it instead, call [`request_cancel`](Self::request_cancel)
/// followed by [`join`](Self::join).
pub struct TaskHandle<T> {
    cancel: CancelToken,
    result: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Ask the task to stop at its next cancellation poll. Idempotent;
    /// does not block.
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the task finishes and return its result.
    ///
    /// Returns `None` if the worker terminated without producing a result
    /// (it panicked). Callers treat that as an internal failure of whatever
    /// the task was maintaining.
    #[must_use]
    pub fn join(self) -> Option<T> {
        self.result.recv().ok()
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// TaskPool
// ---------------------------------------------------------------------------

/// Fixed-size worker pool.
///
/// Workers drain a shared queue; the pool shuts down when dropped by
/// closing the queue and joining every worker. Tasks still queued at drop
/// are executed before shutdown completes (the queue drains first), so a
/// handle held elsewhere never observes a silently vanished task.
pub struct TaskPool {
    queue: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Create a pool with `workers` threads (at least one).
    ///
    /// # Panics
    ///
    /// Panics if the OS cannot spawn a worker thread (extremely rare).
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|n| {
                let rx = Arc::clone(&rx);
                thread::Builder::new()
                    .name(format!("mote-worker-{n}"))
                    .spawn(move || Self::worker_loop(&rx))
                    .expect("failed to spawn pool worker thread")
            })
            .collect();

        Self {
            queue: Some(tx),
            workers,
        }
    }

    /// Submit a closure for background execution.
    ///
    /// The closure receives the task's [`CancelToken`] and should poll it
    /// once per iteration of any long-running loop. If the pool is shutting
    /// down, the closure runs inline on the caller instead — submission
    /// never loses work.
    pub fn submit<T, F>(&self, f: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let (tx, rx) = mpsc::channel();

        let job: Job = Box::new(move || {
            let out = f(&token);
            // Receiver may be gone (detached handle) — that's fine.
            let _ = tx.send(out);
        });

        match &self.queue {
            Some(queue) => {
                if let Err(returned) = queue.send(job) {
                    // Queue closed mid-shutdown: run on the caller.
                    (returned.0)();
                }
            }
            None => job(),
        }

        TaskHandle { cancel, result: rx }
    }

    /// Number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn worker_loop(rx: &Arc<Mutex<Receiver<Job>>>) {
        loop {
            // Hold the lock only while dequeuing, never while running a job.
            let job = {
                let Ok(guard) = rx.lock() else { break };
                guard.recv()
            };
            match job {
                // Contain panics: a dying job must not take the worker
                // thread (and every queued task behind it) with it. The
                // task's result sender is dropped on unwind, so its handle
                // observes the failure as a `None` join.
                Ok(job) => {
                    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
                }
                Err(_) => break, // queue closed — shut down
            }
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Close the queue so workers exit once it drains.
        self.queue.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
