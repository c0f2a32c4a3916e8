// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! ADWIN: adaptive windowing with a statistically calibrated shrink rule.
//!
//! The detector keeps the longest window that is consistent with "the mean
//! has not changed". Every `clock` observations it scans candidate cut
//! points from the oldest data forward; when the two sub-window means differ
//! by more than a Bernstein-type bound, the older sub-window is discarded
//! bucket by bucket and a change is reported.

use crate::histogram::ExponentialHistogram;
use cutpoint_core::{ChangeDetector, CutpointError};

/// Optional volatility-aware adjustment of the detection bound.
///
/// Experimental: callers that know the expected volatility phase can pass a
/// relative position in `[0, 1]` through [`Adwin::set_input_at`] to loosen or
/// tighten the bound. Off by default and deliberately separate from the core
/// statistical contract.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum BoundModulation {
    #[default]
    None,
    /// Multiplies the bound by `1 + tension * sin(pi * x)`.
    Sine { tension: f64 },
    /// Multiplies the bound by `1 + tension * y / (0.01 + |y|)` with
    /// `y = 1 - x`, applied only once `x > 0.1`.
    Sigmoid { tension: f64 },
}

impl BoundModulation {
    pub(crate) fn validate(&self) -> Result<(), CutpointError> {
        let tension = match self {
            Self::None => return Ok(()),
            Self::Sine { tension } | Self::Sigmoid { tension } => *tension,
        };
        if !tension.is_finite() {
            return Err(CutpointError::invalid_input(format!(
                "bound modulation tension must be finite; got {tension}"
            )));
        }
        Ok(())
    }

    pub(crate) fn apply(&self, epsilon: f64, relative_position: f64) -> f64 {
        match *self {
            Self::None => epsilon,
            Self::Sine { tension } => {
                epsilon * (1.0 + tension * (std::f64::consts::PI * relative_position).sin())
            }
            Self::Sigmoid { tension } => {
                if relative_position > 0.1 {
                    let y = 1.0 - relative_position;
                    epsilon * (1.0 + tension * (y / (0.01 + y.abs())))
                } else {
                    epsilon
                }
            }
        }
    }
}

/// ADWIN configuration.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct AdwinConfig {
    /// Confidence parameter: tolerated false-positive rate per check.
    pub delta: f64,
    /// Observations between cut-point scans.
    pub clock: usize,
    /// Minimum sub-window size considered at a cut.
    pub min_window_length: usize,
    /// Window width below which no scan runs at all.
    pub min_width_for_checks: usize,
    /// Per-row bucket capacity of the histogram.
    pub max_buckets: usize,
    pub modulation: BoundModulation,
}

impl Default for AdwinConfig {
    fn default() -> Self {
        Self {
            delta: 0.002,
            clock: 32,
            min_window_length: 5,
            min_width_for_checks: 10,
            max_buckets: 5,
            modulation: BoundModulation::None,
        }
    }
}

impl AdwinConfig {
    /// Validates the configuration. The bound formula is undefined or
    /// degenerate outside these ranges, so rejection happens at
    /// construction rather than clamping.
    pub fn validate(&self) -> Result<(), CutpointError> {
        validate_delta(self.delta)?;
        if self.clock == 0 {
            return Err(CutpointError::invalid_input("clock must be > 0"));
        }
        if self.min_window_length == 0 {
            return Err(CutpointError::invalid_input(
                "min_window_length must be > 0",
            ));
        }
        if self.max_buckets == 0 {
            return Err(CutpointError::invalid_input("max_buckets must be > 0"));
        }
        self.modulation.validate()?;
        Ok(())
    }
}

fn validate_delta(delta: f64) -> Result<(), CutpointError> {
    if !delta.is_finite() || delta <= 0.0 || delta >= 1.0 {
        return Err(CutpointError::invalid_input(format!(
            "delta must be in (0, 1); got {delta}"
        )));
    }
    Ok(())
}

/// Adaptive-window change detector.
#[derive(Clone, Debug)]
pub struct Adwin {
    config: AdwinConfig,
    window: ExponentialHistogram,
    time: usize,
    width_sum: f64,
    change: bool,
    detections: usize,
    checks: usize,
    relative_position: f64,
}

impl Adwin {
    pub fn new(config: AdwinConfig) -> Result<Self, CutpointError> {
        config.validate()?;
        Ok(Self {
            window: ExponentialHistogram::new(config.max_buckets),
            config,
            time: 0,
            width_sum: 0.0,
            change: false,
            detections: 0,
            checks: 0,
            relative_position: 0.0,
        })
    }

    pub fn with_defaults() -> Self {
        Self::new(AdwinConfig::default()).expect("default ADWIN config is valid")
    }

    pub fn config(&self) -> &AdwinConfig {
        &self.config
    }

    /// Number of cut evaluations performed so far.
    pub fn checks(&self) -> usize {
        self.checks
    }

    pub fn bucket_count(&self) -> usize {
        self.window.bucket_count()
    }

    /// High-water mark of live buckets.
    pub fn max_bucket_count(&self) -> usize {
        self.window.max_bucket_count()
    }

    /// Mean window width over the lifetime of the detector.
    pub fn mean_width(&self) -> f64 {
        if self.time == 0 {
            return 0.0;
        }
        self.width_sum / self.time as f64
    }

    /// Feeds one observation with a per-call significance override.
    pub fn set_input_with_delta(
        &mut self,
        value: f64,
        delta: f64,
    ) -> Result<bool, CutpointError> {
        if !value.is_finite() {
            return Err(CutpointError::invalid_input(
                "observation must be finite for update",
            ));
        }
        validate_delta(delta)?;

        self.time += 1;
        self.window.insert(value);
        self.change = false;

        let mut detected = false;
        if self.time % self.config.clock == 0
            && self.window.width() > self.config.min_width_for_checks
        {
            detected = self.reduce_window(delta);
        }

        self.width_sum += self.window.width() as f64;
        if detected {
            self.change = true;
            self.detections += 1;
        }
        Ok(detected)
    }

    /// Feeds one observation together with a relative position in `[0, 1]`
    /// used only by the optional bound modulation. Positions outside the
    /// range are clamped.
    pub fn set_input_at(
        &mut self,
        value: f64,
        relative_position: f64,
    ) -> Result<bool, CutpointError> {
        if !relative_position.is_finite() {
            return Err(CutpointError::invalid_input(
                "relative position must be finite",
            ));
        }
        self.relative_position = relative_position.clamp(0.0, 1.0);
        self.set_input_with_delta(value, self.config.delta)
    }

    /// Scans cut points oldest-to-newest and shrinks the window while any
    /// cut exceeds its bound. Returns whether at least one cut fired.
    fn reduce_window(&mut self, delta: f64) -> bool {
        let mut detected = false;
        let mut reduce = true;

        while reduce {
            reduce = false;
            let mut n0 = 0usize;
            let mut n1 = self.window.width();
            let mut u0 = 0.0;
            let mut u1 = self.window.total();

            let rows = self.window.rows();
            let mut shrink = false;
            'scan: for row in (0..rows.len()).rev() {
                let buckets = rows[row].buckets();
                let count = ExponentialHistogram::bucket_size(row);
                for (k, bucket) in buckets.iter().enumerate() {
                    n0 += count;
                    n1 -= count;
                    u0 += bucket.total;
                    u1 -= bucket.total;

                    // The final boundary would leave the newer sub-window
                    // empty; stop before dividing by zero.
                    if row == 0 && k == buckets.len() - 1 {
                        break 'scan;
                    }

                    if n0 > self.config.min_window_length + 1
                        && n1 > self.config.min_window_length + 1
                    {
                        self.checks += 1;
                        let abs_diff =
                            (u0 / n0 as f64 - u1 / n1 as f64).abs();
                        if abs_diff > self.cut_bound(n0, n1, delta) {
                            detected = true;
                            shrink = true;
                            break 'scan;
                        }
                    }
                }
            }

            if shrink && self.window.width() > 0 {
                self.window.delete_oldest();
                // A more recent cut may now exceed its bound on the shorter
                // window; rescan from the new tail.
                reduce = self.window.width() > 0;
            }
        }

        detected
    }

    /// Bernstein-type concentration bound on the difference of the two
    /// sub-window means. The `ln(ln n)` term spreads the confidence budget
    /// over the harmonic number of checks; the `2/3` term is the empirical
    /// Bernstein correction. Both are required for the `delta` false-positive
    /// guarantee.
    fn cut_bound(&self, n0: usize, n1: usize, delta: f64) -> f64 {
        let n = self.window.width() as f64;
        let dd = (2.0 * n.ln() / delta).ln();
        let v = self.window.variance_sum() / n;
        let min_len = self.config.min_window_length as f64;
        let m = 1.0 / (n0 as f64 - min_len + 1.0) + 1.0 / (n1 as f64 - min_len + 1.0);
        let epsilon = (2.0 * m * v * dd).sqrt() + 2.0 / 3.0 * dd * m;
        self.config
            .modulation
            .apply(epsilon, self.relative_position)
    }
}

impl ChangeDetector for Adwin {
    fn set_input(&mut self, value: f64) -> Result<bool, CutpointError> {
        self.set_input_with_delta(value, self.config.delta)
    }

    fn estimation(&self) -> f64 {
        if self.window.width() == 0 {
            return 0.0;
        }
        self.window.total() / self.window.width() as f64
    }

    fn variance(&self) -> f64 {
        if self.window.width() == 0 {
            return 0.0;
        }
        self.window.variance_sum() / self.window.width() as f64
    }

    fn width(&self) -> usize {
        self.window.width()
    }

    fn change_detected(&self) -> bool {
        self.change
    }

    fn reset_change(&mut self) {
        self.change = false;
    }

    fn detection_count(&self) -> usize {
        self.detections
    }

    fn reset(&mut self) {
        self.window.clear();
        self.time = 0;
        self.width_sum = 0.0;
        self.change = false;
        self.detections = 0;
        self.checks = 0;
        self.relative_position = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::{Adwin, AdwinConfig, BoundModulation};
    use cutpoint_core::ChangeDetector;

    #[test]
    fn config_validation_rejects_degenerate_parameters() {
        let bad_delta = AdwinConfig {
            delta: 0.0,
            ..AdwinConfig::default()
        };
        let err = Adwin::new(bad_delta).expect_err("zero delta must fail");
        assert!(err.to_string().contains("delta"));

        let bad_delta_high = AdwinConfig {
            delta: 1.5,
            ..AdwinConfig::default()
        };
        assert!(Adwin::new(bad_delta_high).is_err());

        let bad_clock = AdwinConfig {
            clock: 0,
            ..AdwinConfig::default()
        };
        let err = Adwin::new(bad_clock).expect_err("zero clock must fail");
        assert!(err.to_string().contains("clock"));

        let bad_tension = AdwinConfig {
            modulation: BoundModulation::Sine {
                tension: f64::NAN,
            },
            ..AdwinConfig::default()
        };
        assert!(Adwin::new(bad_tension).is_err());
    }

    #[test]
    fn non_finite_observations_are_rejected_without_state_change() {
        let mut detector = Adwin::with_defaults();
        detector.set_input(0.5).expect("update should succeed");
        let width = detector.width();

        let err = detector
            .set_input(f64::INFINITY)
            .expect_err("non-finite observation must fail");
        assert!(err.to_string().contains("finite"));
        assert_eq!(detector.width(), width);
    }

    #[test]
    fn per_call_delta_override_is_validated() {
        let mut detector = Adwin::with_defaults();
        let err = detector
            .set_input_with_delta(0.5, 2.0)
            .expect_err("delta outside (0,1) must fail");
        assert!(err.to_string().contains("delta"));
    }

    #[test]
    fn cut_is_never_evaluated_while_either_side_is_within_the_minimum_window() {
        let mut detector = Adwin::new(AdwinConfig {
            clock: 1,
            ..AdwinConfig::default()
        })
        .expect("valid config");

        // With min_window_length = 5 a cut needs both sides strictly above
        // 6, which no split of a window narrower than 14 can satisfy. The
        // scans at widths 11..=13 still run, so they must evaluate nothing.
        for i in 0..13 {
            detector
                .set_input((i % 2) as f64)
                .expect("update should succeed");
            assert_eq!(
                detector.checks(),
                0,
                "cut evaluated at width {}",
                detector.width()
            );
        }

        // Once the window is wide enough, boundaries clear the guard and
        // evaluations start counting.
        for i in 13..40 {
            detector
                .set_input((i % 2) as f64)
                .expect("update should succeed");
        }
        assert!(detector.checks() > 0);
    }

    #[test]
    fn constant_stream_never_detects_and_window_grows() {
        let mut detector = Adwin::with_defaults();
        let mut last_width = 0;
        for _ in 0..10_000 {
            let detected = detector.set_input(0.5).expect("update should succeed");
            assert!(!detected);
            assert!(!detector.change_detected());
            assert!(detector.width() >= last_width);
            last_width = detector.width();
        }
        assert_eq!(detector.width(), 10_000);
        assert_eq!(detector.detection_count(), 0);
        assert!((detector.estimation() - 0.5).abs() < 1e-12);
        assert!(detector.variance() < 1e-12);
    }

    #[test]
    fn step_shift_is_detected_promptly_and_estimation_converges() {
        let mut detector = Adwin::with_defaults();
        for _ in 0..1000 {
            assert!(!detector.set_input(0.0).expect("update should succeed"));
        }

        let mut first_detection = None;
        for step in 0..1000 {
            let detected = detector.set_input(1.0).expect("update should succeed");
            if detected && first_detection.is_none() {
                first_detection = Some(step);
            }
        }

        let config = AdwinConfig::default();
        let slack = config.clock * config.min_window_length;
        let first = first_detection.expect("expected a detection after the regime switch");
        assert!(
            first <= slack,
            "first detection {first} later than clock*min_window_length = {slack}"
        );
        assert!(
            detector.estimation() > 0.9,
            "estimation {} should converge toward 1.0",
            detector.estimation()
        );
        assert!(detector.detection_count() >= 1);
    }

    #[test]
    fn shrink_discards_older_subwindow() {
        let mut detector = Adwin::with_defaults();
        for _ in 0..1000 {
            detector.set_input(0.0).expect("update should succeed");
        }
        for _ in 0..200 {
            detector.set_input(1.0).expect("update should succeed");
        }
        assert!(
            detector.width() < 1200,
            "window width {} should have contracted after the shift",
            detector.width()
        );
    }

    #[test]
    fn identical_streams_yield_identical_trajectories() {
        let mut lhs = Adwin::with_defaults();
        let mut rhs = Adwin::with_defaults();
        for i in 0..4000 {
            let x = if i < 2000 { (i % 3) as f64 * 0.1 } else { 2.0 + (i % 3) as f64 * 0.1 };
            let a = lhs.set_input(x).expect("lhs update should succeed");
            let b = rhs.set_input(x).expect("rhs update should succeed");
            assert_eq!(a, b);
            assert_eq!(lhs.width(), rhs.width());
            assert_eq!(lhs.detection_count(), rhs.detection_count());
        }
    }

    #[test]
    fn change_flag_latches_until_next_input_or_reset() {
        let mut detector = Adwin::with_defaults();
        for _ in 0..1000 {
            detector.set_input(0.0).expect("update should succeed");
        }
        let mut latched = false;
        for _ in 0..200 {
            if detector.set_input(1.0).expect("update should succeed") {
                latched = true;
                break;
            }
        }
        assert!(latched);
        assert!(detector.change_detected());
        detector.reset_change();
        assert!(!detector.change_detected());
    }

    #[test]
    fn reset_returns_to_fresh_state() {
        let mut detector = Adwin::with_defaults();
        for i in 0..500 {
            detector.set_input(i as f64).expect("update should succeed");
        }
        detector.reset();
        assert_eq!(detector.width(), 0);
        assert_eq!(detector.detection_count(), 0);
        assert_eq!(detector.checks(), 0);
        assert_eq!(detector.estimation(), 0.0);
        assert_eq!(detector.mean_width(), 0.0);
    }

    #[test]
    fn modulated_bound_only_differs_when_enabled() {
        let mut plain = Adwin::with_defaults();
        let mut modulated = Adwin::new(AdwinConfig {
            modulation: BoundModulation::Sine { tension: 0.0 },
            ..AdwinConfig::default()
        })
        .expect("valid config");

        for i in 0..3000 {
            let x = if i < 1500 { 0.0 } else { 1.0 };
            let a = plain.set_input(x).expect("plain update should succeed");
            let b = modulated
                .set_input_at(x, (i % 100) as f64 / 100.0)
                .expect("modulated update should succeed");
            // Zero tension leaves the bound untouched regardless of position.
            assert_eq!(a, b);
        }
    }

    #[test]
    fn set_input_at_clamps_relative_position() {
        let mut detector = Adwin::new(AdwinConfig {
            modulation: BoundModulation::Sigmoid { tension: 0.5 },
            ..AdwinConfig::default()
        })
        .expect("valid config");

        detector
            .set_input_at(0.5, 7.0)
            .expect("out-of-range position is clamped, not rejected");
        let err = detector
            .set_input_at(0.5, f64::NAN)
            .expect_err("NaN position must fail");
        assert!(err.to_string().contains("position"));
    }
}
