// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cutpoint_online::{
    Adwin, AdwinConfig, ChangeDetector, Cusum, ExponentialHistogram, PageHinkley, SingConfig,
    SingDetector,
};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

const ABS_TOL: f64 = 1e-7;
const REL_TOL: f64 = 1e-6;
const MIN_PROPTEST_CASES: u32 = 256;

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

fn relative_close(actual: f64, expected: f64) -> bool {
    let diff = (actual - expected).abs();
    let scale = 1.0 + expected.abs();
    diff <= ABS_TOL || diff <= REL_TOL * scale
}

fn naive_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn naive_variance_sum(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = naive_mean(values);
    values
        .iter()
        .map(|value| {
            let centered = *value - mean;
            centered * centered
        })
        .sum()
}

fn stream_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-100.0f64..100.0, 1..400)
}

fn small_stream_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-10.0f64..10.0, 1..128)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        max_shrink_iters: 1024,
        failure_persistence: Some(Box::new(FileFailurePersistence::Direct("proptest-regressions/tests/proptest_invariants.txt"))),
        .. ProptestConfig::default()
    })]

    #[test]
    fn histogram_aggregates_match_naive_statistics(values in stream_strategy()) {
        let mut histogram = ExponentialHistogram::new(5);
        for &value in &values {
            histogram.insert(value);
        }

        prop_assert_eq!(histogram.width(), values.len());
        prop_assert!(relative_close(histogram.total(), values.iter().sum()));
        // Bucket compression loses no mass from the second moment either.
        let expected_ss = naive_variance_sum(&values);
        let diff = (histogram.variance_sum() - expected_ss).abs();
        prop_assert!(diff <= ABS_TOL + REL_TOL * (1.0 + expected_ss.abs()) * values.len() as f64);
    }

    #[test]
    fn histogram_bucket_count_stays_logarithmic(values in stream_strategy()) {
        let max_buckets = 5usize;
        let mut histogram = ExponentialHistogram::new(max_buckets);
        for &value in &values {
            histogram.insert(value);
        }

        let n = values.len() as f64;
        let rows_bound = (n / max_buckets as f64 + 1.0).log2().ceil() as usize + 1;
        prop_assert!(histogram.bucket_count() <= (max_buckets + 1) * rows_bound.max(1));
        prop_assert!(histogram.max_bucket_count() >= histogram.bucket_count());
    }

    #[test]
    fn histogram_deletion_preserves_width_accounting(values in small_stream_strategy()) {
        let mut histogram = ExponentialHistogram::new(5);
        for &value in &values {
            histogram.insert(value);
        }

        let mut remaining = values.len();
        while remaining > 0 {
            let removed = histogram.delete_oldest();
            prop_assert!(removed >= 1);
            prop_assert!(removed <= remaining);
            remaining -= removed;
            prop_assert_eq!(histogram.width(), remaining);
        }
        prop_assert_eq!(histogram.total(), 0.0);
        prop_assert_eq!(histogram.variance_sum(), 0.0);
    }

    #[test]
    fn adwin_width_never_exceeds_observations_and_estimation_is_window_mean(
        values in stream_strategy(),
    ) {
        let mut detector = Adwin::with_defaults();
        for (seen, &value) in values.iter().enumerate() {
            detector.set_input(value).expect("update should succeed");
            prop_assert!(detector.width() <= seen + 1);
            prop_assert!(detector.width() >= 1);
        }
        prop_assert!(detector.estimation().is_finite());
        prop_assert!(detector.variance() >= 0.0);
    }

    #[test]
    fn adwin_is_deterministic_across_instances(values in small_stream_strategy()) {
        let config = AdwinConfig::default();
        let mut lhs = Adwin::new(config.clone()).expect("valid config");
        let mut rhs = Adwin::new(config).expect("valid config");
        for &value in &values {
            let a = lhs.set_input(value).expect("lhs update should succeed");
            let b = rhs.set_input(value).expect("rhs update should succeed");
            prop_assert_eq!(a, b);
            prop_assert_eq!(lhs.width(), rhs.width());
            prop_assert!(relative_close(lhs.estimation(), rhs.estimation()));
        }
    }

    #[test]
    fn sing_width_matches_observations_without_cuts(value in -50.0f64..50.0, len in 1usize..600) {
        // A constant stream can never trigger a cut, so the window keeps
        // everything regardless of block compression.
        let config = SingConfig {
            block_size: 16,
            epsilon_prime: 0.1,
            alpha: 0.5,
            compression_term: 4,
            ..SingConfig::default()
        };
        let mut detector = SingDetector::new(config).expect("valid config");
        for _ in 0..len {
            let detected = detector.set_input(value).expect("update should succeed");
            prop_assert!(!detected);
        }
        prop_assert_eq!(detector.width(), len);
        prop_assert!(relative_close(detector.estimation(), value));
    }

    #[test]
    fn baseline_detectors_track_running_mean(values in small_stream_strategy()) {
        let mut cusum = Cusum::with_defaults();
        let mut page_hinkley = PageHinkley::with_defaults();
        for &value in &values {
            cusum.set_input(value).expect("cusum update should succeed");
            page_hinkley
                .set_input(value)
                .expect("page-hinkley update should succeed");
        }
        // Neither detector fires on these short streams (threshold 50), so
        // both still hold the full history.
        if cusum.detection_count() == 0 {
            prop_assert_eq!(cusum.width(), values.len());
            prop_assert!(relative_close(cusum.estimation(), naive_mean(&values)));
        }
        if page_hinkley.detection_count() == 0 {
            prop_assert_eq!(page_hinkley.width(), values.len());
            prop_assert!(relative_close(page_hinkley.estimation(), naive_mean(&values)));
        }
    }
}
