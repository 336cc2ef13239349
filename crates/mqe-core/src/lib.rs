#![forbid(unsafe_code)]
//! mqe-core: the data model shared by every layer of the query engine.
//!
//! This crate owns the plain data (timeranges, tagsets, series), the small
//! shared-state primitives (fetch budget, cancellation, profiler) and the
//! narrow traits through which the evaluator talks to its backends.
//!
//! Nothing here evaluates expressions or fans out work; see `mqe-exec` and
//! `mqe-eval` for that.

pub mod api;
pub mod budget;
pub mod cancel;
pub mod config;
pub mod error;
pub mod hash;
pub mod predicate;
pub mod prelude;
pub mod profile;
pub mod series;
pub mod tagset;
pub mod timerange;

pub use error::{Error, Result};
