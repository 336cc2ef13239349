#![forbid(unsafe_code)]
//! mqe-eval: evaluates expression trees against a metrics backend.
//!
//! An [`Expression`] is evaluated under an [`EvaluationContext`] that carries
//! the timerange, tag predicate, fetch budget, cancellation token, profiler
//! and notes of one query. Non-literal subexpressions are memoized per
//! context scope, so a subtree referenced twice is computed once. Function
//! calls are dispatched through a [`Registry`] of [`MetricFunction`]s that
//! declare their argument schema up front.

pub mod context;
pub mod error;
pub mod expression;
pub mod function;
pub mod memo;
pub mod registry;
pub mod value;

pub use context::{EvaluationContext, EvaluationContextBuilder, Notes};
pub use error::{ConversionError, ErrorCode, EvalError, Result};
pub use expression::{evaluate_many, Expression};
pub use function::{ArgSpec, ArgType, Args, FunctionBuilder, Groups, MetricFunction};
pub use registry::Registry;
pub use value::{parse_duration, Value, ValueKind};
