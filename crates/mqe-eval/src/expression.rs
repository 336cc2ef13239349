//! Expression trees and their evaluation.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use mqe_core::api::{FetchMultipleRequest, MetricKey, RequestDetails, TaggedMetric};
use mqe_core::hash::{fingerprint, Hash256};
use mqe_core::predicate::Predicate;
use mqe_exec::ParallelQueue;

use crate::context::EvaluationContext;
use crate::error::{ConversionError, EvalError, Result};
use crate::function::Groups;
use crate::value::{parse_duration, Value, ValueKind};

/// A node of a query. Children are shared, so one subtree may appear under
/// several parents; memoization evaluates it once per context scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Scalar(f64),
    String(String),
    Duration {
        literal: String,
        millis: i64,
    },
    /// Every series of `name` whose tagset passes `predicate` and the
    /// context predicate.
    Metric {
        name: MetricKey,
        predicate: Predicate,
    },
    Call {
        function: String,
        args: Vec<Arc<Expression>>,
        groups: Groups,
    },
}

impl Expression {
    pub fn scalar(value: f64) -> Arc<Self> {
        Arc::new(Expression::Scalar(value))
    }

    pub fn string(value: impl Into<String>) -> Arc<Self> {
        Arc::new(Expression::String(value.into()))
    }

    /// Parse a duration literal such as `-5m`.
    pub fn duration(literal: &str) -> Result<Arc<Self>> {
        let millis = parse_duration(literal).ok_or_else(|| ConversionError {
            from: ValueKind::String,
            to: ValueKind::Duration,
            context: format!("{literal:?}"),
        })?;
        Ok(Arc::new(Expression::Duration {
            literal: literal.to_string(),
            millis,
        }))
    }

    pub fn metric(name: impl Into<MetricKey>) -> Arc<Self> {
        Self::metric_where(name, Predicate::always())
    }

    pub fn metric_where(name: impl Into<MetricKey>, predicate: Predicate) -> Arc<Self> {
        Arc::new(Expression::Metric {
            name: name.into(),
            predicate,
        })
    }

    pub fn call(function: impl Into<String>, args: Vec<Arc<Expression>>) -> Arc<Self> {
        Self::call_grouped(function, args, Groups::none())
    }

    pub fn call_grouped(
        function: impl Into<String>,
        args: Vec<Arc<Expression>>,
        groups: Groups,
    ) -> Arc<Self> {
        Arc::new(Expression::Call {
            function: function.into(),
            args,
            groups,
        })
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expression::Scalar(_) | Expression::String(_) | Expression::Duration { .. }
        )
    }

    /// Canonical rendering; equal fingerprints compute the same value under
    /// the same context.
    pub fn fingerprint(&self) -> String {
        Canonical(self).to_string()
    }

    pub fn memo_key(&self) -> Hash256 {
        fingerprint(&self.fingerprint())
    }

    /// Literals evaluate directly; everything else goes through the context's
    /// memo scope when one is present.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<Value> {
        match self {
            Expression::Scalar(v) => Ok(Value::Scalar(*v)),
            Expression::String(s) => Ok(Value::String(s.clone())),
            Expression::Duration { millis, .. } => Ok(Value::Duration(*millis)),
            _ => match ctx.memo_scope() {
                Some(scope) => scope.evaluate(self.memo_key(), || self.evaluate_uncached(ctx)),
                None => self.evaluate_uncached(ctx),
            },
        }
    }

    fn evaluate_uncached(&self, ctx: &EvaluationContext) -> Result<Value> {
        if ctx.timeout().is_done() {
            return Err(EvalError::Timeout(ctx.timeout_limit()));
        }
        match self {
            Expression::Metric { name, predicate } => fetch_metric(ctx, name, predicate),
            Expression::Call {
                function,
                args,
                groups,
            } => {
                let f = ctx
                    .function(function)
                    .ok_or_else(|| EvalError::UnknownFunction(function.clone()))?;
                f.run(ctx, args, groups)
            }
            literal => literal.evaluate(ctx),
        }
    }
}

fn fetch_metric(ctx: &EvaluationContext, name: &MetricKey, predicate: &Predicate) -> Result<Value> {
    let filter = ctx.predicate().clone().and(predicate.clone());
    let metrics: Vec<TaggedMetric> = ctx
        .metadata()
        .get_all_tags(name)?
        .into_iter()
        .filter(|tagset| filter.apply(tagset))
        .map(|tagset| TaggedMetric::new(name.clone(), tagset))
        .collect();
    ctx.fetch_limit_consume(metrics.len())?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        metric = %name,
        series = metrics.len(),
        timerange = %ctx.timerange(),
        "fetching"
    );

    let request = FetchMultipleRequest {
        metrics,
        details: RequestDetails {
            sample_method: ctx.sample_method(),
            timerange: ctx.timerange(),
            timeout: ctx.timeout().clone(),
            profiler: ctx.profiler().clone(),
        },
    };
    Ok(Value::SeriesList(ctx.storage().fetch_multiple(request)?))
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Scalar(v) => write!(f, "{v}"),
            Expression::String(s) => write!(f, "{s:?}"),
            Expression::Duration { literal, .. } => f.write_str(literal),
            Expression::Metric { name, predicate } if predicate.is_always() => {
                write!(f, "{name}")
            }
            Expression::Metric { name, predicate } => {
                write!(f, "{name}[{}]", predicate.query())
            }
            Expression::Call {
                function,
                args,
                groups,
            } => {
                write!(f, "{function}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, "){groups}")
            }
        }
    }
}

/// Fingerprint rendering. Same as `Display`, except that names which are not
/// plain identifiers are backquoted, so a metric called `f(a, b)` never
/// renders like a call.
struct Canonical<'a>(&'a Expression);

impl fmt::Display for Canonical<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Expression::Metric { name, predicate } => {
                write_name(f, name.as_str())?;
                if !predicate.is_always() {
                    write!(f, "[{}]", predicate.query())?;
                }
                Ok(())
            }
            Expression::Call {
                function,
                args,
                groups,
            } => {
                write_name(f, function)?;
                f.write_str("(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", Canonical(arg))?;
                }
                write!(f, "){groups}")
            }
            literal => write!(f, "{literal}"),
        }
    }
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '+' | '-' | '*' | '/'));
    if plain {
        return f.write_str(name);
    }
    f.write_str("`")?;
    for c in name.chars() {
        if matches!(c, '`' | '\\') {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("`")
}

/// Evaluate sibling expressions concurrently, one thread per expression,
/// returning values in input order. The first error (or the context's
/// timeout) wins.
pub fn evaluate_many(
    ctx: &EvaluationContext,
    expressions: &[Arc<Expression>],
) -> Result<Vec<Value>> {
    match expressions {
        [] => return Ok(Vec::new()),
        [only] => return Ok(vec![only.evaluate(ctx)?]),
        _ => {}
    }
    if expressions.iter().all(|e| e.is_literal()) {
        return expressions.iter().map(|e| e.evaluate(ctx)).collect();
    }

    let results: Arc<Mutex<Vec<Option<Value>>>> =
        Arc::new(Mutex::new(vec![None; expressions.len()]));
    let queue = ParallelQueue::<EvalError>::new(
        expressions.len(),
        ctx.timeout().clone(),
        ctx.timeout_limit(),
    );
    for (i, expr) in expressions.iter().enumerate() {
        let expr = Arc::clone(expr);
        let ctx = ctx.clone();
        let results = Arc::clone(&results);
        queue.submit(move || {
            let value = expr.evaluate(&ctx)?;
            results.lock().unwrap_or_else(PoisonError::into_inner)[i] = Some(value);
            Ok(())
        });
    }
    queue.wait()?;

    let values = std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
    values
        .into_iter()
        .collect::<Option<Vec<Value>>>()
        .ok_or_else(|| EvalError::Internal("sibling evaluation finished without a value".into()))
}
