//! `forecast.*`: rolling Holt-Winters, seasonal and linear models, the
//! anomaly scores built on them, and `forecast.drop`.
//!
//! The rolling models only ever look backwards: the estimate at slot `i`
//! depends on samples `..=i`. An optional training duration evaluates the
//! input over a longer window first and slices the extra slots off again.

use mqe_core::series::SeriesList;
use mqe_eval::{
    ArgType, Args, EvalError, EvaluationContext, MetricFunction, Registry, Result, Value,
};

use crate::evaluate_series;

/// Exponentially weighted cell. `weight` is the total influence of past
/// observations; a fresh (or poisoned) cell adopts the first value outright.
#[derive(Debug, Clone, Copy)]
struct Weighted {
    value: f64,
    weight: f64,
    rate: f64,
}

impl Weighted {
    fn new(rate: f64) -> Self {
        Self {
            value: 0.0,
            weight: 0.0,
            rate,
        }
    }

    fn observe(&mut self, y: f64) {
        if y.is_nan() {
            self.skip();
            return;
        }
        if self.weight == 0.0 || !self.value.is_finite() {
            self.value = y;
            self.weight = self.rate;
            return;
        }
        self.weight *= 1.0 - self.rate;
        self.value = (self.value * self.weight + y * self.rate) / (self.weight + self.rate);
        self.weight += self.rate;
    }

    fn boost_add(&mut self, dy: f64) {
        if !dy.is_nan() {
            self.value += dy;
        }
    }

    fn skip(&mut self) {
        self.weight *= 1.0 - self.rate;
    }
}

/// One weighted cell per phase of the period.
struct Cycle(Vec<Weighted>);

impl Cycle {
    fn new(rate: f64, period: usize) -> Self {
        Cycle(vec![Weighted::new(rate); period])
    }

    fn get(&self, i: usize) -> f64 {
        self.0[i % self.0.len()].value
    }

    fn observe(&mut self, i: usize, y: f64) {
        let n = self.0.len();
        self.0[i % n].observe(y);
    }
}

/// Rolling multiplicative Holt-Winters estimate of `ys`. The level and trend
/// rates are per period and scaled down to per-sample rates; the seasonal
/// rate applies once per period already.
pub fn rolling_multiplicative_holt_winters(
    ys: &[f64],
    period: usize,
    level_rate: f64,
    trend_rate: f64,
    seasonal_rate: f64,
) -> Vec<f64> {
    let period = period.max(1);
    let per_sample = |rate: f64| 1.0 - (1.0 - rate).powf(1.0 / period as f64);
    let mut level = Weighted::new(per_sample(level_rate));
    let mut trend = Weighted::new(per_sample(trend_rate));
    let mut season = Cycle::new(seasonal_rate, period);
    for i in 0..period {
        season.observe(i, 1.0);
    }

    let mut estimate = Vec::with_capacity(ys.len());
    for (i, &y) in ys.iter().enumerate() {
        let (old_level, old_trend, old_season) = (level.value, trend.value, season.get(i));

        level.boost_add(old_trend);
        level.observe(y / old_season);
        if y.is_nan() {
            trend.skip();
        } else {
            trend.observe(level.value - old_level);
        }
        // NaN here skips the phase
        season.observe(i, y / (old_level + old_trend));

        estimate.push(level.value * season.get(i));
    }
    estimate
}

/// Purely seasonal estimate: each phase is an exponential average of the
/// samples seen at that phase.
pub fn rolling_seasonal(ys: &[f64], period: usize, seasonal_rate: f64) -> Vec<f64> {
    let mut season = Cycle::new(seasonal_rate, period.max(1));
    ys.iter()
        .enumerate()
        .map(|(i, &y)| {
            season.observe(i, y);
            season.get(i)
        })
        .collect()
}

/// Least-squares fit `y = a + b·i` over the non-NaN samples. `None` with
/// fewer than two of them.
pub fn linear_regression(ys: &[f64]) -> Option<(f64, f64)> {
    let (mut xm, mut ym, mut xym, mut x2m, mut n) = (0.0, 0.0, 0.0, 0.0, 0usize);
    for (i, &y) in ys.iter().enumerate() {
        if y.is_nan() {
            continue;
        }
        let x = i as f64;
        xm += x;
        ym += y;
        xym += x * y;
        x2m += x * x;
        n += 1;
    }
    if n < 2 {
        return None;
    }
    let n = n as f64;
    let (xm, ym, xym, x2m) = (xm / n, ym / n, xym / n, x2m / n);
    let beta = (xym - xm * ym) / (x2m - xm * xm);
    Some((ym - beta * xm, beta))
}

pub fn linear(ys: &[f64]) -> Vec<f64> {
    match linear_regression(ys) {
        Some((a, b)) => (0..ys.len()).map(|i| a + b * i as f64).collect(),
        None => vec![f64::NAN; ys.len()],
    }
}

/// How many sample standard deviations `estimate - correct` sits from its
/// mean. Pairs where either side is NaN or infinite are left out of the
/// statistics.
fn standardized_residuals(correct: &[f64], estimate: &[f64]) -> Vec<f64> {
    let diffs: Vec<f64> = correct
        .iter()
        .zip(estimate)
        .filter(|(c, e)| c.is_finite() && e.is_finite())
        .map(|(c, e)| e - c)
        .collect();
    let n = diffs.len() as f64;
    let mean = diffs.iter().sum::<f64>() / n;
    let stddev = (diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    correct
        .iter()
        .zip(estimate)
        .map(|(c, e)| (e - c - mean) / stddev)
        .collect()
}

/// Standardized residuals computed separately for each phase `i % period`.
/// Both slices must have the same length.
pub fn periodic_anomaly(correct: &[f64], estimate: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    let mut answer = vec![f64::NAN; correct.len()];
    for phase in 0..period.min(correct.len()) {
        let picks: Vec<usize> = (phase..correct.len()).step_by(period).collect();
        let c: Vec<f64> = picks.iter().map(|&i| correct[i]).collect();
        let e: Vec<f64> = picks.iter().map(|&i| estimate[i]).collect();
        for (&i, z) in picks.iter().zip(standardized_residuals(&c, &e)) {
            answer[i] = z;
        }
    }
    answer
}

/// NaN out every slot at or past `slots - drop / resolution`.
pub fn drop_tail(values: &[f64], last: f64) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(j, &v)| if (j as f64) < last { v } else { f64::NAN })
        .collect()
}

fn check_rate(function: &str, what: &str, rate: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(EvalError::invalid_argument(
            function,
            format!("{what} learning rate must be between 0 and 1, got {rate}"),
        ));
    }
    Ok(rate)
}

fn period_slots(function: &str, ctx: &EvaluationContext, period: i64) -> Result<usize> {
    let slots = period / ctx.timerange().resolution();
    if slots <= 0 {
        return Err(EvalError::invalid_argument(
            function,
            "expects the period parameter to mean at least one slot",
        ));
    }
    Ok(slots as usize)
}

/// Evaluate the series argument with `training` ms of extra history, run
/// `model` on every series and cut the history back off.
fn train(
    function: &str,
    ctx: &EvaluationContext,
    args: &Args,
    training: Option<i64>,
    model: impl Fn(&[f64]) -> Vec<f64>,
) -> Result<SeriesList> {
    let training = training.unwrap_or(0);
    if training < 0 {
        return Err(EvalError::invalid_argument(
            function,
            format!("extra training time must be non-negative, got {training}ms"),
        ));
    }
    let timerange = ctx.timerange();
    let extended = ctx.with_timerange(timerange.extend_before(training));
    let extra = extended.timerange().slots() - timerange.slots();
    let list = evaluate_series(function, 0, "series", args.expression(0)?, &extended)?;
    let series = list
        .series
        .iter()
        .map(|s| {
            let mut values = model(&s.values);
            values.drain(..extra.min(values.len()));
            s.with_values(values)
        })
        .collect();
    Ok(SeriesList::new(series, timerange))
}

const HOLT_WINTERS: &str = "forecast.rolling_multiplicative_holt_winters";
const SEASONAL: &str = "forecast.rolling_seasonal";
const LINEAR: &str = "forecast.linear";

fn holt_winters(name: &str, ctx: &EvaluationContext, args: &Args) -> Result<(SeriesList, usize)> {
    let period = period_slots(name, ctx, args.duration(1)?)?;
    let level = check_rate(name, "level", args.scalar(2)?)?;
    let trend = check_rate(name, "trend", args.scalar(3)?)?;
    let seasonal = check_rate(name, "seasonal", args.scalar(4)?)?;
    let list = train(name, ctx, args, args.optional_duration(5)?, |ys| {
        rolling_multiplicative_holt_winters(ys, period, level, trend, seasonal)
    })?;
    Ok((list, period))
}

fn seasonal(name: &str, ctx: &EvaluationContext, args: &Args) -> Result<(SeriesList, usize)> {
    let period = period_slots(name, ctx, args.duration(1)?)?;
    let rate = check_rate(name, "seasonal", args.scalar(2)?)?;
    let list = train(name, ctx, args, args.optional_duration(3)?, |ys| {
        rolling_seasonal(ys, period, rate)
    })?;
    Ok((list, period))
}

type Model = fn(&str, &EvaluationContext, &Args) -> Result<(SeriesList, usize)>;

/// Score each prediction against the series it was trained on, matched by
/// tagset.
fn anomaly(name: &str, ctx: &EvaluationContext, args: &Args, model: Model) -> Result<Value> {
    let original = evaluate_series(name, 0, "series", args.expression(0)?, ctx)?;
    let (prediction, period) = model(name, ctx, args)?;
    let mut series = Vec::with_capacity(prediction.series.len());
    for predicted in &prediction.series {
        let actual = original
            .series
            .iter()
            .find(|s| s.tagset == predicted.tagset)
            .ok_or_else(|| {
                EvalError::invalid_argument(
                    name,
                    format!("no input series matches prediction {}", predicted.tagset),
                )
            })?;
        if actual.values.len() != predicted.values.len() {
            return Err(EvalError::invalid_argument(
                name,
                "the ground truth and estimate must be the same length",
            ));
        }
        series.push(predicted.with_values(periodic_anomaly(
            &actual.values,
            &predicted.values,
            period,
        )));
    }
    Ok(Value::SeriesList(SeriesList::new(series, prediction.timerange)))
}

fn model_builder(name: &str, rates: &[&str]) -> mqe_eval::FunctionBuilder {
    let builder = MetricFunction::builder(name)
        .arg("series", ArgType::Expression)
        .arg("period", ArgType::Duration);
    rates
        .iter()
        .fold(builder, |b, rate| b.arg(*rate, ArgType::Scalar))
        .optional("training", ArgType::Duration)
}

pub(crate) fn register(registry: &mut Registry) -> Result<()> {
    const HW_RATES: [&str; 3] = ["level_rate", "trend_rate", "seasonal_rate"];

    registry.register(
        model_builder(HOLT_WINTERS, &HW_RATES).build(|ctx, args, _| {
            Ok(Value::SeriesList(holt_winters(HOLT_WINTERS, ctx, &args)?.0))
        })?,
    )?;
    registry.register(
        model_builder("forecast.anomaly_rolling_multiplicative_holt_winters", &HW_RATES).build(
            |ctx, args, _| {
                anomaly(
                    "forecast.anomaly_rolling_multiplicative_holt_winters",
                    ctx,
                    &args,
                    holt_winters,
                )
            },
        )?,
    )?;
    registry.register(model_builder(SEASONAL, &["seasonal_rate"]).build(|ctx, args, _| {
        Ok(Value::SeriesList(seasonal(SEASONAL, ctx, &args)?.0))
    })?)?;
    registry.register(
        model_builder("forecast.anomaly_rolling_seasonal", &["seasonal_rate"]).build(
            |ctx, args, _| anomaly("forecast.anomaly_rolling_seasonal", ctx, &args, seasonal),
        )?,
    )?;
    registry.register(
        MetricFunction::builder(LINEAR)
            .arg("series", ArgType::Expression)
            .optional("training", ArgType::Duration)
            .build(|ctx, args, _| {
                let list = train(LINEAR, ctx, &args, args.optional_duration(1)?, linear)?;
                Ok(Value::SeriesList(list))
            })?,
    )?;
    registry.register(
        MetricFunction::builder("forecast.drop")
            .arg("series", ArgType::SeriesList)
            .arg("drop", ArgType::Duration)
            .build(|ctx, args, _| {
                let timerange = ctx.timerange();
                let last = timerange.slots() as f64
                    - args.duration(1)? as f64 / timerange.resolution() as f64;
                let list = args.series_list(0)?;
                Ok(Value::SeriesList(list.map_values(|values| drop_tail(values, last))))
            })?,
    )?;
    Ok(())
}
