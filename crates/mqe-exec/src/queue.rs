//! Ticket pool and a rate-limited action queue.
//!
//! A ticket authorizes one unit of concurrent work. Tickets live in a bounded
//! channel pre-filled to capacity; taking one is a `recv`, returning it is a
//! `send` from the guard's `Drop`. Every wait also watches the query's
//! cancellation token, so nothing blocks past the deadline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::select;
use crossbeam::sync::WaitGroup;

use mqe_core::cancel::Timeout;

use crate::error::TimedOut;

/// Shared pool of concurrency tickets. Clones share the same pool.
#[derive(Debug, Clone)]
pub struct Tickets {
    give: Sender<()>,
    take: Receiver<()>,
    capacity: usize,
}

impl Tickets {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (give, take) = bounded(capacity);
        for _ in 0..capacity {
            // cannot fail: the channel has room and `take` is alive
            let _ = give.send(());
        }
        Self {
            give,
            take,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tickets currently held by running work.
    pub fn in_use(&self) -> usize {
        self.capacity - self.take.len()
    }

    /// Block until a ticket is free or `timeout` fires. An already-fired
    /// token always wins, even if a ticket is free.
    pub fn acquire(&self, timeout: &Timeout) -> Option<Ticket> {
        if timeout.is_done() {
            return None;
        }
        select! {
            recv(self.take) -> ticket => ticket.ok().map(|()| Ticket {
                give: self.give.clone(),
            }),
            recv(timeout.done()) -> _ => None,
        }
    }
}

/// A held ticket; returned to the pool on drop.
#[derive(Debug)]
pub struct Ticket {
    give: Sender<()>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let _ = self.give.send(());
    }
}

struct FirstError<E> {
    error: Mutex<Option<E>>,
    notify: Sender<()>,
    notified: Receiver<()>,
}

impl<E> FirstError<E> {
    fn flag(&self, err: E) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        *slot = Some(err);
        let _ = self.notify.try_send(());
    }

    fn take(&self) -> Option<E> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Runs submitted actions on their own threads, at most `tickets` at a time.
///
/// `wait` returns the first error flagged by any action, a timeout error if
/// the token fires first, or `Ok(())` once every action has finished. Errors
/// after the first are dropped. Actions still running when `wait` returns on
/// error or timeout are left to finish on their own; their results are
/// discarded.
pub struct ParallelQueue<E> {
    tickets: Tickets,
    timeout: Timeout,
    limit: Duration,
    state: Arc<FirstError<E>>,
    pending: WaitGroup,
    running: Arc<AtomicUsize>,
}

impl<E> ParallelQueue<E>
where
    E: From<TimedOut> + Send + 'static,
{
    /// `limit` is only reported in the timeout error; `timeout` is what
    /// actually cancels.
    pub fn new(tickets: usize, timeout: Timeout, limit: Duration) -> Self {
        let (notify, notified) = bounded(1);
        Self {
            tickets: Tickets::new(tickets),
            timeout,
            limit,
            state: Arc::new(FirstError {
                error: Mutex::new(None),
                notify,
                notified,
            }),
            pending: WaitGroup::new(),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Record `err` unless an earlier error was already recorded.
    pub fn flag_error(&self, err: E) {
        self.state.flag(err);
    }

    /// Schedule `action`. Its thread first waits for a ticket or for the
    /// cancellation token, whichever comes first.
    pub fn submit<F>(&self, action: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        let pending = self.pending.clone();
        let tickets = self.tickets.clone();
        let timeout = self.timeout.clone();
        let state = Arc::clone(&self.state);
        let limit = self.limit;
        let running = Arc::clone(&self.running);
        running.fetch_add(1, Ordering::SeqCst);
        thread::spawn(move || {
            let _pending = pending;
            match tickets.acquire(&timeout) {
                Some(_ticket) => {
                    if let Err(err) = action() {
                        state.flag(err);
                    }
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?limit, "queued action cancelled before start");
                    state.flag(TimedOut(limit).into());
                }
            }
            running.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub fn wait(self) -> Result<(), E> {
        let ParallelQueue {
            timeout,
            limit,
            state,
            pending,
            running,
            ..
        } = self;

        let (finished_tx, finished_rx) = bounded::<()>(1);
        thread::spawn(move || {
            pending.wait();
            let _ = finished_tx.send(());
        });

        select! {
            // the token may fire after every action already finished
            recv(timeout.done()) -> _ => match running.load(Ordering::SeqCst) {
                0 => state.take().map_or(Ok(()), Err),
                _ => Err(TimedOut(limit).into()),
            },
            recv(state.notified) -> _ => state.take().map_or(Ok(()), Err),
            recv(finished_rx) -> _ => state.take().map_or(Ok(()), Err),
        }
    }
}
