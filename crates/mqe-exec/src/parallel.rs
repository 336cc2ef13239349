//! Parallel fetch coordinator.
//!
//! `ParallelStorage` wraps a backend and bounds the number of in-flight
//! `fetch_single` calls with a ticket pool shared by every request that goes
//! through it. `fetch_multiple` fans the metrics out over a handful of worker
//! threads and reassembles the answers in request order. The first backend
//! error or the request's cancellation ends the call; partial results are
//! never returned.

use std::sync::Arc;
use std::thread;

use crossbeam::channel::unbounded;
use crossbeam::select;

use mqe_core::api::{
    FetchMultipleRequest, FetchRequest, StorageError, StorageErrorCode, TimeseriesStorage,
};
use mqe_core::series::{SeriesList, Timeseries};
use mqe_core::timerange::Timerange;

use crate::metrics::emit_span;
use crate::queue::Tickets;

#[derive(Clone)]
pub struct ParallelStorage {
    inner: Arc<dyn TimeseriesStorage>,
    tickets: Tickets,
}

impl ParallelStorage {
    pub fn new(inner: Arc<dyn TimeseriesStorage>, concurrent_requests: usize) -> Self {
        Self {
            inner,
            tickets: Tickets::new(concurrent_requests),
        }
    }

    pub fn tickets(&self) -> &Tickets {
        &self.tickets
    }
}

impl std::fmt::Debug for ParallelStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelStorage")
            .field("capacity", &self.tickets.capacity())
            .field("in_use", &self.tickets.in_use())
            .finish()
    }
}

impl TimeseriesStorage for ParallelStorage {
    fn choose_resolution(&self, requested: Timerange, slot_limit: usize) -> i64 {
        self.inner.choose_resolution(requested, slot_limit)
    }

    /// Waits for a ticket (or cancellation) before calling the backend.
    fn fetch_single(&self, request: FetchRequest) -> Result<Timeseries, StorageError> {
        let Some(_ticket) = self.tickets.acquire(&request.details.timeout) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(metric = %request.metric, "fetch cancelled while waiting for a ticket");
            return Err(StorageError::timeout().for_metric(&request.metric));
        };
        self.inner.fetch_single(request)
    }

    fn fetch_multiple(&self, request: FetchMultipleRequest) -> Result<SeriesList, StorageError> {
        let _profile = request.details.profiler.record("parallel fetch_multiple");
        let timerange = request.details.timerange;
        let timeout = request.details.timeout.clone();
        let singles = request.to_single();
        let count = singles.len();
        if count == 0 {
            return Ok(SeriesList::empty(timerange));
        }
        emit_span(
            "fetch_multiple",
            &[
                ("metrics", count.to_string()),
                ("tickets", self.tickets.capacity().to_string()),
            ],
        );

        let (jobs_tx, jobs_rx) = unbounded::<(usize, FetchRequest)>();
        for job in singles.into_iter().enumerate() {
            let _ = jobs_tx.send(job);
        }
        drop(jobs_tx);

        let (results_tx, results_rx) = unbounded();
        for _ in 0..count.min(self.tickets.capacity()) {
            let jobs = jobs_rx.clone();
            let results = results_tx.clone();
            let storage = self.clone();
            thread::spawn(move || {
                for (index, single) in jobs.iter() {
                    let outcome = storage.fetch_single(single);
                    // coordinator gone: cancelled or already failed
                    if results.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(results_tx);

        let mut answers: Vec<Option<Timeseries>> = (0..count).map(|_| None).collect();
        for _ in 0..count {
            select! {
                recv(timeout.done()) -> _ => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(count, "parallel fetch timed out");
                    return Err(StorageError::timeout());
                }
                recv(results_rx) -> message => match message {
                    Ok((index, Ok(series))) => answers[index] = Some(series),
                    Ok((_, Err(err))) => return Err(err),
                    Err(_) => {
                        return Err(StorageError::new(
                            StorageErrorCode::FetchIO,
                            "fetch workers exited before completing",
                        ))
                    }
                },
            }
        }

        let series = answers
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| StorageError::new(StorageErrorCode::FetchIO, "missing fetch result"))?;
        emit_span("fetch_multiple_done", &[("metrics", count.to_string())]);
        Ok(SeriesList::new(series, timerange))
    }

    fn check_healthy(&self) -> Result<(), StorageError> {
        self.inner.check_healthy()
    }
}
