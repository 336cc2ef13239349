//! Named functions and their argument binding.
//!
//! A function declares its arguments as a list of [`ArgSpec`]s. Before the
//! compute closure runs, every argument that is not declared as
//! [`ArgType::Expression`] is evaluated (siblings concurrently) and converted
//! to its declared type, so the closure only ever sees well-typed [`Args`].

use std::fmt;
use std::sync::Arc;

use mqe_core::series::{ScalarSet, SeriesList};

use crate::context::EvaluationContext;
use crate::error::{EvalError, Result};
use crate::expression::{evaluate_many, Expression};
use crate::value::Value;

/// The `group by` / `collapse by` clause attached to a call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Groups {
    pub list: Vec<String>,
    /// `collapse by` keeps every tag except the listed ones.
    pub collapses: bool,
}

impl Groups {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn by<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            list: tags.into_iter().map(Into::into).collect(),
            collapses: false,
        }
    }

    pub fn collapse<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            list: tags.into_iter().map(Into::into).collect(),
            collapses: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl fmt::Display for Groups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.list.is_empty() {
            return Ok(());
        }
        let verb = if self.collapses { "collapse" } else { "group" };
        write!(f, " {verb} by {}", self.list.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    String,
    Scalar,
    ScalarSet,
    Duration,
    SeriesList,
    /// Evaluated but not converted.
    Value,
    /// Passed through unevaluated.
    Expression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub ty: ArgType,
    pub optional: bool,
}

type RawCompute =
    dyn Fn(&EvaluationContext, &[Arc<Expression>], &Groups) -> Result<Value> + Send + Sync;

#[derive(Clone)]
pub struct MetricFunction {
    name: String,
    min_args: usize,
    max_args: Option<usize>,
    allows_group_by: bool,
    compute: Arc<RawCompute>,
}

impl MetricFunction {
    /// A function that receives its arguments unevaluated. `max_args` of
    /// `None` accepts any number of arguments.
    pub fn new<F>(
        name: impl Into<String>,
        min_args: usize,
        max_args: Option<usize>,
        allows_group_by: bool,
        compute: F,
    ) -> Self
    where
        F: Fn(&EvaluationContext, &[Arc<Expression>], &Groups) -> Result<Value>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            min_args,
            max_args,
            allows_group_by,
            compute: Arc::new(compute),
        }
    }

    pub fn builder(name: impl Into<String>) -> FunctionBuilder {
        FunctionBuilder {
            name: name.into(),
            args: Vec::new(),
            allows_group_by: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_args(&self) -> usize {
        self.min_args
    }

    pub fn max_args(&self) -> Option<usize> {
        self.max_args
    }

    pub fn allows_group_by(&self) -> bool {
        self.allows_group_by
    }

    /// Check arity and the group-by clause, then compute.
    pub fn run(
        &self,
        ctx: &EvaluationContext,
        args: &[Arc<Expression>],
        groups: &Groups,
    ) -> Result<Value> {
        let actual = args.len();
        if actual < self.min_args || self.max_args.is_some_and(|max| actual > max) {
            return Err(EvalError::ArgumentLength {
                name: self.name.clone(),
                min: self.min_args,
                max: self.max_args,
                actual,
            });
        }
        if !self.allows_group_by && !groups.is_empty() {
            return Err(EvalError::GroupByNotAllowed(self.name.clone()));
        }
        let _profile = ctx.profiler().record(format!("function {}", self.name));
        (self.compute)(ctx, args, groups)
    }
}

impl fmt::Debug for MetricFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricFunction")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("allows_group_by", &self.allows_group_by)
            .finish_non_exhaustive()
    }
}

/// Declares a function's arguments in order; see [`MetricFunction::builder`].
#[derive(Debug)]
pub struct FunctionBuilder {
    name: String,
    args: Vec<ArgSpec>,
    allows_group_by: bool,
}

impl FunctionBuilder {
    pub fn arg(mut self, name: impl Into<String>, ty: ArgType) -> Self {
        self.args.push(ArgSpec {
            name: name.into(),
            ty,
            optional: false,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, ty: ArgType) -> Self {
        self.args.push(ArgSpec {
            name: name.into(),
            ty,
            optional: true,
        });
        self
    }

    pub fn group_by(mut self) -> Self {
        self.allows_group_by = true;
        self
    }

    /// Fails when a required argument follows an optional one.
    pub fn build<F>(self, compute: F) -> Result<MetricFunction>
    where
        F: Fn(&EvaluationContext, Args, &Groups) -> Result<Value> + Send + Sync + 'static,
    {
        if let Some(pos) = self.args.iter().position(|a| a.optional) {
            if let Some(late) = self.args[pos..].iter().find(|a| !a.optional) {
                return Err(EvalError::Registration(format!(
                    "function `{}`: required argument `{}` follows an optional one",
                    self.name, late.name
                )));
            }
        }
        let min_args = self.args.iter().filter(|a| !a.optional).count();
        let max_args = Some(self.args.len());
        let specs: Arc<[ArgSpec]> = self.args.into();
        let name = self.name.clone();
        Ok(MetricFunction::new(
            self.name,
            min_args,
            max_args,
            self.allows_group_by,
            move |ctx: &EvaluationContext, exprs: &[Arc<Expression>], groups: &Groups| {
                let args = bind(&name, &specs, ctx, exprs)?;
                compute(ctx, args, groups)
            },
        ))
    }
}

#[derive(Debug)]
enum Slot {
    Absent,
    Value(Value),
    Expression(Arc<Expression>),
}

/// Evaluate and convert `exprs` according to `specs`.
fn bind(
    function: &str,
    specs: &[ArgSpec],
    ctx: &EvaluationContext,
    exprs: &[Arc<Expression>],
) -> Result<Args> {
    let pending: Vec<Arc<Expression>> = exprs
        .iter()
        .zip(specs)
        .filter(|(_, spec)| spec.ty != ArgType::Expression)
        .map(|(e, _)| Arc::clone(e))
        .collect();
    let mut evaluated = evaluate_many(ctx, &pending)?.into_iter();

    let mut slots = Vec::with_capacity(specs.len());
    for (position, spec) in specs.iter().enumerate() {
        let Some(expr) = exprs.get(position) else {
            slots.push(Slot::Absent);
            continue;
        };
        if spec.ty == ArgType::Expression {
            slots.push(Slot::Expression(Arc::clone(expr)));
            continue;
        }
        let value = evaluated
            .next()
            .ok_or_else(|| EvalError::Internal(format!("{function}: missing argument value")))?;
        let context = expr.to_string();
        let converted = match spec.ty {
            ArgType::String => value.into_string(&context).map(Value::String),
            ArgType::Scalar => value.to_scalar(&context).map(Value::Scalar),
            ArgType::ScalarSet => value.into_scalar_set(&context).map(Value::ScalarSet),
            ArgType::Duration => value.to_duration(&context).map(Value::Duration),
            ArgType::SeriesList => value
                .into_series_list(ctx.timerange(), &context)
                .map(Value::SeriesList),
            ArgType::Value | ArgType::Expression => Ok(value),
        };
        let value = converted.map_err(|source| EvalError::ArgumentType {
            function: function.to_string(),
            position,
            name: spec.name.clone(),
            source,
        })?;
        slots.push(Slot::Value(value));
    }
    Ok(Args {
        function: function.to_string(),
        slots,
    })
}

/// Bound arguments handed to a builder-declared compute closure. Accessors
/// index by declared position; asking for the wrong type is an internal
/// error since binding already converted every value.
#[derive(Debug)]
pub struct Args {
    function: String,
    slots: Vec<Slot>,
}

impl Args {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether an optional argument was supplied.
    pub fn is_present(&self, i: usize) -> bool {
        !matches!(self.slots.get(i), None | Some(Slot::Absent))
    }

    fn mismatch(&self, i: usize, wanted: &str) -> EvalError {
        EvalError::Internal(format!(
            "{}: argument {i} is not a bound {wanted}",
            self.function
        ))
    }

    fn bound(&self, i: usize, wanted: &str) -> Result<&Value> {
        match self.slots.get(i) {
            Some(Slot::Value(v)) => Ok(v),
            _ => Err(self.mismatch(i, wanted)),
        }
    }

    pub fn value(&self, i: usize) -> Result<&Value> {
        self.bound(i, "value")
    }

    pub fn series_list(&self, i: usize) -> Result<&SeriesList> {
        match self.bound(i, "series list")? {
            Value::SeriesList(list) => Ok(list),
            _ => Err(self.mismatch(i, "series list")),
        }
    }

    /// Move a series list out, leaving the slot absent.
    pub fn take_series_list(&mut self, i: usize) -> Result<SeriesList> {
        if !matches!(self.slots.get(i), Some(Slot::Value(Value::SeriesList(_)))) {
            return Err(self.mismatch(i, "series list"));
        }
        match std::mem::replace(&mut self.slots[i], Slot::Absent) {
            Slot::Value(Value::SeriesList(list)) => Ok(list),
            _ => Err(self.mismatch(i, "series list")),
        }
    }

    pub fn scalar(&self, i: usize) -> Result<f64> {
        match self.bound(i, "scalar")? {
            Value::Scalar(v) => Ok(*v),
            _ => Err(self.mismatch(i, "scalar")),
        }
    }

    pub fn scalar_set(&self, i: usize) -> Result<&ScalarSet> {
        match self.bound(i, "scalar set")? {
            Value::ScalarSet(set) => Ok(set),
            _ => Err(self.mismatch(i, "scalar set")),
        }
    }

    /// Milliseconds.
    pub fn duration(&self, i: usize) -> Result<i64> {
        match self.bound(i, "duration")? {
            Value::Duration(ms) => Ok(*ms),
            _ => Err(self.mismatch(i, "duration")),
        }
    }

    pub fn string(&self, i: usize) -> Result<&str> {
        match self.bound(i, "string")? {
            Value::String(s) => Ok(s),
            _ => Err(self.mismatch(i, "string")),
        }
    }

    pub fn expression(&self, i: usize) -> Result<&Arc<Expression>> {
        match self.slots.get(i) {
            Some(Slot::Expression(e)) => Ok(e),
            _ => Err(self.mismatch(i, "expression")),
        }
    }

    pub fn optional_scalar(&self, i: usize) -> Result<Option<f64>> {
        self.is_present(i).then(|| self.scalar(i)).transpose()
    }

    pub fn optional_duration(&self, i: usize) -> Result<Option<i64>> {
        self.is_present(i).then(|| self.duration(i)).transpose()
    }

    pub fn optional_string(&self, i: usize) -> Result<Option<&str>> {
        self.is_present(i).then(|| self.string(i)).transpose()
    }

    pub fn optional_series_list(&self, i: usize) -> Result<Option<&SeriesList>> {
        self.is_present(i).then(|| self.series_list(i)).transpose()
    }
}
