use std::thread;

use mqe_core::budget::FetchCounter;
use mqe_core::series::{SeriesList, Timeseries};
use mqe_core::tagset::TagSet;
use mqe_core::timerange::Timerange;
use mqe_functions::aggregate;
use mqe_functions::filter::filter_by_recent;
use mqe_functions::join;
use mqe_functions::transform::integral;
use mqe_functions::window::{derivative, moving_average, rate};
use proptest::prelude::*;

fn tr(slots: usize) -> Timerange {
    Timerange::new(0, (slots.max(1) as i64 - 1) * 30_000, 30_000).unwrap()
}

fn named(name: &str, values: Vec<f64>) -> Timeseries {
    Timeseries::new(values, TagSet::from([("name", name)]))
}

#[test]
fn test_single_slot_has_empty_derivative() {
    assert!(derivative(&[3.0], 30.0).is_empty());
    assert!(rate(&[3.0], 30.0, |_, _| {}).is_empty());
}

#[test]
fn test_zero_width_moving_average_is_identity() {
    let xs = [1.0, f64::NAN, 3.0];
    let out = moving_average(&xs, 0);
    assert_eq!(out[0], 1.0);
    assert!(out[1].is_nan());
    assert_eq!(out[2], 3.0);
}

#[test]
fn test_moving_average_with_mixed_magnitudes() {
    assert_eq!(moving_average(&[1e16, 1.0], 1), vec![1e16, 1.0]);
    assert_eq!(moving_average(&[1e16, 1.0, 2.0], 0), vec![1e16, 1.0, 2.0]);
    assert_eq!(moving_average(&[1e16, 1.0, 2.0, 4.0], 2), vec![5e15, 1.5, 3.0]);
    let out = moving_average(&[1e16, f64::NAN, 7.0, 9.0], 2);
    assert_eq!(out, vec![1e16, 7.0, 8.0]);
}

#[test]
fn test_filter_by_sum_ascending() {
    let list = SeriesList::new(
        vec![
            named("A", vec![3.0, 3.0, 3.0, 3.0, 3.0]),
            named("B", vec![1.0, 2.0, 2.0, 1.0, 0.0]),
            named("C", vec![1.0, 2.0, 3.0, 4.0, 5.1]),
            named("D", vec![4.0, 4.0, 3.01, 4.0, 3.01]),
        ],
        tr(5),
    );
    let out = filter_by_recent(&list, 2, aggregate::sum, true, 5);
    let names: Vec<&str> = out.series.iter().filter_map(|s| s.tagset.get("name")).collect();
    assert_eq!(names, vec!["B", "A"]);
}

#[test]
fn test_join_with_disjoint_keys_is_a_product() {
    let basic = SeriesList::new(
        [("east", "a"), ("east", "b"), ("west", "c"), ("west", "d"), ("north", "e")]
            .iter()
            .map(|(dc, host)| {
                Timeseries::new(vec![1.0], TagSet::from([("dc", *dc), ("host", *host)]))
            })
            .collect(),
        tr(1),
    );
    let env = SeriesList::new(
        ["production", "staging"]
            .iter()
            .map(|env| Timeseries::new(vec![2.0], TagSet::from([("env", *env)])))
            .collect(),
        tr(1),
    );
    let rows = join(&[&basic, &env]);
    assert_eq!(rows.len(), 10);
    for row in &rows {
        assert_eq!(row.row.len(), 2);
        assert_eq!(row.tagset.len(), 3);
    }
}

#[test]
fn test_fetch_counter_never_overspends() {
    let counter = FetchCounter::new(100);
    let granted: usize = thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                s.spawn(move || (0..20).filter(|_| counter.consume(1).is_ok()).count())
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).sum()
    });
    assert_eq!(granted, 100);
    assert!(counter.consume(1).is_err());
}

proptest! {
    #[test]
    fn test_integral_inverts_derivative(xs in proptest::collection::vec(-1e3f64..1e3, 2..100)) {
        let recovered = integral(&derivative(&xs, 30.0), 30.0);
        for (i, r) in recovered.iter().enumerate() {
            prop_assert!((r - (xs[i + 1] - xs[0])).abs() < 1e-8);
        }
    }

    #[test]
    fn test_filter_output_is_sorted_subset(
        rows in proptest::collection::vec(
            proptest::collection::vec(prop_oneof![Just(f64::NAN), -50.0f64..50.0], 4),
            0..12,
        ),
        count in 0usize..15,
        lowest in any::<bool>(),
    ) {
        let list = SeriesList::new(
            rows.iter()
                .enumerate()
                .map(|(i, v)| named(&i.to_string(), v.clone()))
                .collect(),
            tr(4),
        );
        let out = filter_by_recent(&list, count, aggregate::mean, lowest, 4);
        prop_assert_eq!(out.len(), count.min(list.len()));
        let means: Vec<f64> = out.series.iter().map(|s| aggregate::mean(&s.values)).collect();
        for pair in means.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a.is_nan() {
                prop_assert!(b.is_nan());
            } else if !b.is_nan() {
                let ordered = if lowest { a <= b } else { a >= b };
                prop_assert!(ordered);
            }
        }
        for s in &out.series {
            prop_assert!(list.series.iter().any(|t| t.tagset == s.tagset));
        }
    }

    #[test]
    fn test_join_sizes(a in 0usize..5, b in 0usize..5, c in 0usize..5) {
        let make = |prefix: &str, n: usize| SeriesList::new(
            (0..n)
                .map(|i| Timeseries::new(vec![0.0], TagSet::from([(prefix, i.to_string())])))
                .collect(),
            tr(1),
        );
        let (x, y, z) = (make("x", a), make("y", b), make("z", c));
        prop_assert_eq!(join(&[&x, &y, &z]).len(), a * b * c);
    }
}
