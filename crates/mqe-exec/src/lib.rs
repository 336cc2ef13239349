#![forbid(unsafe_code)]
//! mqe-exec: bounded-concurrency execution and storage plumbing.
//!
//! - `queue`: ticket pool and `ParallelQueue` (first error wins, cancel-aware).
//! - `parallel`: `ParallelStorage`, the fan-out fetch coordinator.
//! - `profiling`: storage wrapper that records every backend call.
//! - `metadata`: in-memory metric catalog and a TTL cache in front of any catalog.
//! - `memory`: point-based in-memory timeseries backend for tests and demos.

pub mod error;
pub mod memory;
pub mod metadata;
pub mod metrics;
pub mod parallel;
pub mod profiling;
pub mod queue;

pub use error::TimedOut;
pub use memory::PointStorage;
pub use metadata::{CachedMetadata, Clock, ManualClock, MetadataMap, SystemClock};
pub use parallel::ParallelStorage;
pub use profiling::ProfilingStorage;
pub use queue::{ParallelQueue, Ticket, Tickets};
