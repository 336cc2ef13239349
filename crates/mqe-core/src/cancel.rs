//! Query-wide cancellation token.
//!
//! A `Timeout` fires once, either when its deadline passes or when `finish()`
//! is called, whichever comes first. Firing drops the only sender of the
//! `done()` channel, so every clone of the receiver becomes ready at once and
//! can be used directly inside `crossbeam::select!`.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

struct TimeoutInner {
    trigger: Mutex<Option<Sender<()>>>,
    deadline: Option<Instant>,
}

impl TimeoutInner {
    fn fire(&self) {
        let sender = self
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);
    }
}

#[derive(Clone)]
pub struct Timeout {
    inner: Arc<TimeoutInner>,
    done: Receiver<()>,
}

impl Timeout {
    /// Token that fires after `duration`. Spawns one short-lived watcher
    /// thread that exits as soon as the token fires for any reason.
    pub fn new(duration: Duration) -> Self {
        let (tx, rx) = bounded::<()>(0);
        let inner = Arc::new(TimeoutInner {
            trigger: Mutex::new(Some(tx)),
            deadline: Some(Instant::now() + duration),
        });

        let watcher_inner = Arc::clone(&inner);
        let watcher_rx = rx.clone();
        thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = watcher_rx.recv_timeout(duration) {
                #[cfg(feature = "tracing")]
                tracing::debug!(?duration, "query timeout expired");
                watcher_inner.fire();
            }
        });

        Self { inner, done: rx }
    }

    /// Token without a deadline; only `finish()` fires it.
    pub fn never() -> Self {
        let (tx, rx) = bounded::<()>(0);
        Self {
            inner: Arc::new(TimeoutInner {
                trigger: Mutex::new(Some(tx)),
                deadline: None,
            }),
            done: rx,
        }
    }

    /// Receiver that becomes ready (disconnected) once the token fires.
    pub fn done(&self) -> &Receiver<()> {
        &self.done
    }

    pub fn is_done(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Fire the token now. Idempotent.
    pub fn finish(&self) {
        self.inner.fire();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Block until the token fires or `limit` elapses. Returns whether it fired.
    pub fn wait_for(&self, limit: Duration) -> bool {
        matches!(
            self.done.recv_timeout(limit),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

impl std::fmt::Debug for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeout")
            .field("deadline", &self.inner.deadline)
            .field("done", &self.is_done())
            .finish()
    }
}
