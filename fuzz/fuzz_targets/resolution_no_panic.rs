// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

#[path = "common.rs"]
mod common;

use idl_engine::{RESOLUTION_SLACK, apply_resolution, extract_events};
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fuzz_target!(|data: &[u8]| {
    let mut data = data;
    let resolution_seed = common::take_byte(&mut data);
    let rng_seed = common::take_byte(&mut data);

    // Few distinct levels so that runs form.
    let idealization: Vec<f64> = data
        .iter()
        .take(common::MAX_SAMPLES)
        .map(|&byte| f64::from(byte % 4))
        .collect();
    let time: Vec<f64> = (0..idealization.len()).map(|i| i as f64).collect();
    let resolution = f64::from(resolution_seed % 12);

    let mut rng = ChaCha8Rng::seed_from_u64(u64::from(rng_seed));
    let outcome = apply_resolution(&idealization, &time, resolution, &mut rng)
        .expect("finite resolution on a valid time base must succeed");

    assert_eq!(outcome.idealization.len(), idealization.len());
    assert_eq!(
        extract_events(&outcome.idealization, &time).expect("events"),
        outcome.events
    );
    if outcome.events.len() > 1 {
        let limit = resolution - RESOLUTION_SLACK;
        assert!(outcome.events.iter().all(|event| event.duration >= limit));
    }
});
