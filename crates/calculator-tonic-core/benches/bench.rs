use calculator_tonic_core::{
    accumulator::{AverageAccumulator, MaximumTracker},
    arithmetic::PrimeFactors,
};
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};

fn bench_prime_factors(c: &mut Criterion) {
    let mut group = c.benchmark_group("arithmetic/prime_factors");
    for number in [12_390_392_840_i64, 1_000_000_007, i64::MAX] {
        group.bench_function(format!("n/{number}"), |b| {
            b.iter(|| PrimeFactors::new(black_box(number)).count());
        });
    }
    group.finish();
}

fn bench_accumulators(c: &mut Criterion) {
    const LEN: usize = 4096;
    let values: Vec<i32> = (0..LEN as i32).map(|i| (i * 7919) % 1013 - 500).collect();

    let mut group = c.benchmark_group("accumulator");
    group.throughput(Throughput::Elements(LEN as u64));

    group.bench_function("average", |b| {
        b.iter(|| {
            let mut acc = AverageAccumulator::new();
            for &v in &values {
                acc.push(black_box(v)).unwrap();
            }
            acc.finish().unwrap()
        });
    });

    group.bench_function("maximum", |b| {
        b.iter(|| {
            let mut tracker = MaximumTracker::new();
            values
                .iter()
                .filter_map(|&v| tracker.observe(black_box(v)))
                .count()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_prime_factors, bench_accumulators);
criterion_main!(benches);
