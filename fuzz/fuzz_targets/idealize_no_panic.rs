// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

#[path = "common.rs"]
mod common;

use idl_core::{Constraints, ExecutionContext, TraceView};
use idl_disc::{BicMethod, DiscConfig};
use idl_engine::{IdealizationParams, Strategy, events_to_idealization, idealize};
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn build_strategy(kind_seed: u8, a_seed: u8, b_seed: u8, c_seed: u8) -> Strategy {
    match kind_seed % 3 {
        0 => {
            let n_levels = common::bounded(a_seed, 1, 5);
            let amplitudes = (0..n_levels)
                .map(|level| -(level as f64) * (0.25 + f64::from(b_seed) / 64.0))
                .collect();
            Strategy::ThresholdCrossing {
                amplitudes,
                thresholds: None,
                interpolation_factor: common::bounded(c_seed, 1, 4),
            }
        }
        1 => Strategy::ThresholdCrossing {
            amplitudes: vec![0.0, -1.0, -2.0],
            thresholds: Some(vec![f64::from(b_seed) / -128.0; common::bounded(a_seed, 0, 3)]),
            interpolation_factor: 1,
        },
        _ => Strategy::Disc(DiscConfig {
            confidence_level: 0.5 + f64::from(a_seed) / 512.0,
            min_seg_length: common::bounded(b_seed, 1, 8),
            min_cluster_size: common::bounded(c_seed, 1, 8),
            bic_method: if c_seed & 0x80 == 0 {
                BicMethod::Full
            } else {
                BicMethod::Approx
            },
            seed: u64::from(a_seed),
            ..DiscConfig::default()
        }),
    }
}

fuzz_target!(|data: &[u8]| {
    let mut data = data;
    let kind_seed = common::take_byte(&mut data);
    let a_seed = common::take_byte(&mut data);
    let b_seed = common::take_byte(&mut data);
    let c_seed = common::take_byte(&mut data);
    let resolution_seed = common::take_byte(&mut data);

    let signal = common::samples(data, 4096.0);
    let dt = 1.0e-4;
    let time: Vec<f64> = (0..signal.len()).map(|i| i as f64 * dt).collect();
    let Ok(trace) = TraceView::new(&signal, &time) else {
        return;
    };

    let params = IdealizationParams {
        strategy: build_strategy(kind_seed, a_seed, b_seed, c_seed),
        resolution: match resolution_seed % 4 {
            0 => None,
            _ => Some(f64::from(resolution_seed % 16) * dt),
        },
        seed: u64::from(resolution_seed),
    };

    let constraints = Constraints::default();
    let ctx = ExecutionContext::new(&constraints);
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let Ok(out) = idealize(&trace, &params, &mut rng, &ctx) else {
        return;
    };

    assert_eq!(out.idealization.len(), out.time.len());
    let rebuilt = events_to_idealization(&out.events, out.idealization.len())
        .expect("events must tile the idealization");
    assert_eq!(rebuilt, out.idealization);
});
