// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use idl_core::{Constraints, ExecutionContext};
use idl_disc::{DiscConfig, critical_value, detect_changepoints, estimate_noise_std, run_disc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

const LEVELS: [f64; 3] = [0.0, -1.0, -2.0];

fn multilevel_trace(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.2).expect("benchmark noise should be valid");
    let mut values = Vec::with_capacity(n);
    while values.len() < n {
        let level = LEVELS[rng.gen_range(0..LEVELS.len())];
        let dwell = rng.gen_range(20..200);
        for _ in 0..dwell.min(n - values.len()) {
            values.push(level + noise.sample(&mut rng));
        }
    }
    values
}

fn benchmark_changepoints(c: &mut Criterion) {
    const N: usize = 100_000;
    let values = multilevel_trace(N, 7);
    let noise_std = estimate_noise_std(&values);
    let cv = critical_value(0.999, N).expect("critical value should be valid");
    let constraints = Constraints::default();
    let ctx = ExecutionContext::new(&constraints);

    c.bench_function("changepoints_n1e5_3_levels", |b| {
        b.iter(|| {
            detect_changepoints(black_box(&values), cv, noise_std, 3, black_box(&ctx))
                .expect("changepoint benchmark should succeed");
        })
    });
}

fn benchmark_disc(c: &mut Criterion) {
    let mut group = c.benchmark_group("disc");
    group.sample_size(10);
    let constraints = Constraints::default();
    let ctx = ExecutionContext::new(&constraints);
    let config = DiscConfig::default();

    for n in [10_000usize, 50_000] {
        let values = multilevel_trace(n, 11);
        group.bench_function(format!("disc_n{n}_3_levels"), |b| {
            b.iter(|| {
                run_disc(black_box(&values), &config, black_box(&ctx))
                    .expect("DISC benchmark should succeed");
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_changepoints, benchmark_disc);
criterion_main!(benches);
