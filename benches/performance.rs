use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mqe_compress::{compress, decompress};
use mqe_functions::window::{exponential_moving_average, moving_average, rate};

fn make_series(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            if i % 97 == 0 {
                f64::NAN
            } else {
                100.0 + (i as f64 / 10.0).sin() * 5.0 + (i % 7) as f64
            }
        })
        .collect()
}

fn bench_codec(c: &mut Criterion) {
    let values = make_series(4096);
    let block = compress(&values);
    c.bench_function("gorilla_compress_4096", |b| {
        b.iter(|| compress(black_box(&values)))
    });
    c.bench_function("gorilla_decompress_4096", |b| {
        b.iter(|| decompress(black_box(&block), values.len()).unwrap())
    });
}

fn bench_window_transforms(c: &mut Criterion) {
    let values = make_series(4096);
    c.bench_function("moving_average_w30", |b| {
        b.iter(|| moving_average(black_box(&values), 30))
    });
    c.bench_function("exponential_moving_average", |b| {
        b.iter(|| exponential_moving_average(black_box(&values), 0.9, 30))
    });
    c.bench_function("rate_with_resets", |b| {
        b.iter(|| rate(black_box(&values), 30.0, |_, _| {}))
    });
}

criterion_group!(benches, bench_codec, bench_window_transforms);
criterion_main!(benches);
