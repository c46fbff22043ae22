// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use idl_core::{Constraints, ExecutionContext};
use idl_disc::{
    BicMethod, DiscConfig, InformationCriterion, StateComponent, cluster, compute_emission_matrix,
    detect_changepoints, empirical_transition_matrix, estimate_noise_std, run_disc,
};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

const MIN_PROPTEST_CASES: u32 = 256;

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

fn distinct_levels(values: &[f64]) -> usize {
    let mut levels = values.to_vec();
    levels.sort_by(f64::total_cmp);
    levels.dedup();
    levels.len()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        max_shrink_iters: 1024,
        failure_persistence: Some(Box::new(FileFailurePersistence::Direct("proptest-regressions/tests/proptest_invariants.txt"))),
        .. ProptestConfig::default()
    })]

    #[test]
    fn changepoint_segments_partition_the_trace(
        values in prop::collection::vec(-20.0f64..20.0, 1..200),
        min_seg_length in 1usize..10,
        critical in 0.5f64..6.0,
    ) {
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let noise = estimate_noise_std(&values);

        let result = detect_changepoints(&values, critical, noise, min_seg_length, &ctx)
            .expect("detection should succeed for finite input");

        prop_assert_eq!(result.fit.len(), values.len());
        prop_assert_eq!(result.changepoints.len() + 1, result.segments.len());

        let mut expected_start = 0usize;
        for segment in &result.segments {
            prop_assert_eq!(segment.start, expected_start);
            prop_assert!(segment.end > segment.start);
            if result.segments.len() > 1 {
                prop_assert!(segment.len() >= min_seg_length);
            }
            for &v in &result.fit[segment.start..segment.end] {
                prop_assert_eq!(v, segment.mean);
            }
            expected_start = segment.end;
        }
        prop_assert_eq!(expected_start, values.len());

        for pair in result.changepoints.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn transition_rows_are_stochastic(
        labels in prop::collection::vec(0usize..4, 1..200),
    ) {
        let matrix = empirical_transition_matrix(&labels, 4).expect("labels are in range");
        for from in 0..4 {
            let total: f64 = matrix.row(from).iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-9);
            prop_assert!(matrix.row(from).iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn emission_columns_are_distributions(
        data in prop::collection::vec(-10.0f64..10.0, 1..100),
        means in prop::collection::vec(-10.0f64..10.0, 1..6),
        std in 0.01f64..3.0,
    ) {
        let components: Vec<StateComponent> = means
            .iter()
            .map(|&mean| StateComponent { weight: 1.0 / means.len() as f64, mean, std })
            .collect();
        let emission = compute_emission_matrix(&data, &components).expect("emission");
        for sample in 0..data.len() {
            let total: f64 = (0..components.len()).map(|s| emission.get(s, sample)).sum();
            prop_assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn clustering_never_adds_states(
        data in prop::collection::vec(-5.0f64..5.0, 1..120),
        step in 1usize..12,
    ) {
        let fit: Vec<f64> = data
            .chunks(step)
            .flat_map(|chunk| {
                let mean = chunk.iter().sum::<f64>() / chunk.len() as f64;
                std::iter::repeat_n(mean, chunk.len())
            })
            .collect();

        let outcome = cluster(&data, &fit, InformationCriterion::Bic, BicMethod::Full)
            .expect("clustering should succeed");
        prop_assert!(outcome.n_states >= 1);
        prop_assert!(outcome.n_states <= distinct_levels(&fit));
        prop_assert_eq!(outcome.labels.len(), data.len());
        for (&label, &v) in outcome.labels.iter().zip(&outcome.fit) {
            prop_assert_eq!(outcome.state_values[label], v);
        }
    }

    #[test]
    fn disc_output_is_well_formed_and_deterministic(
        data in prop::collection::vec(-5.0f64..5.0, 1..150),
        seed in any::<u64>(),
    ) {
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let config = DiscConfig { seed, ..DiscConfig::default() };

        let first = run_disc(&data, &config, &ctx).expect("DISC should succeed");
        let second = run_disc(&data, &config, &ctx).expect("DISC should be deterministic");

        prop_assert_eq!(&first.idealization, &second.idealization);
        prop_assert_eq!(first.idealization.len(), data.len());
        prop_assert_eq!(first.n_states, first.state_values.len());
        for v in &first.idealization {
            prop_assert!(first.state_values.contains(v));
        }
    }
}
