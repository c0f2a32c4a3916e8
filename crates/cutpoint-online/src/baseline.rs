// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! O(1) baseline detectors: one-sided CUSUM and the Page-Hinkley test.
//!
//! Neither keeps a window; both maintain a Welford running mean (and second
//! moment, so the shared accessor contract is honored) plus a cumulative
//! deviation statistic, and reset themselves completely after a detection.

use cutpoint_core::{ChangeDetector, CutpointError};

/// Welford one-pass accumulator shared by the baseline detectors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct RunningMoments {
    n: usize,
    mean: f64,
    m2: f64,
}

impl RunningMoments {
    fn push(&mut self, value: f64) {
        self.n += 1;
        let delta = value - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn variance(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.m2 / self.n as f64
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// CUSUM configuration.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct CusumConfig {
    /// Observations required before alerts may fire.
    pub min_observations: usize,
    /// Allowed drift subtracted from every deviation.
    pub drift: f64,
    /// Alert threshold on the cumulative score.
    pub threshold: f64,
}

impl Default for CusumConfig {
    fn default() -> Self {
        Self {
            min_observations: 30,
            drift: 0.005,
            threshold: 50.0,
        }
    }
}

impl CusumConfig {
    pub fn validate(&self) -> Result<(), CutpointError> {
        if !self.drift.is_finite() || self.drift < 0.0 {
            return Err(CutpointError::invalid_input(format!(
                "CUSUM drift must be finite and >= 0; got {}",
                self.drift
            )));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(CutpointError::invalid_input(format!(
                "CUSUM threshold must be finite and > 0; got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// One-sided CUSUM detector for upward mean shifts.
#[derive(Clone, Debug)]
pub struct Cusum {
    config: CusumConfig,
    moments: RunningMoments,
    score: f64,
    change: bool,
    detections: usize,
}

impl Cusum {
    pub fn new(config: CusumConfig) -> Result<Self, CutpointError> {
        config.validate()?;
        Ok(Self {
            config,
            moments: RunningMoments::default(),
            score: 0.0,
            change: false,
            detections: 0,
        })
    }

    pub fn with_defaults() -> Self {
        Self::new(CusumConfig::default()).expect("default CUSUM config is valid")
    }

    pub fn config(&self) -> &CusumConfig {
        &self.config
    }

    /// Current cumulative score.
    pub fn score(&self) -> f64 {
        self.score
    }

    fn clear_state(&mut self) {
        self.moments.clear();
        self.score = 0.0;
    }
}

impl ChangeDetector for Cusum {
    fn set_input(&mut self, value: f64) -> Result<bool, CutpointError> {
        if !value.is_finite() {
            return Err(CutpointError::invalid_input(
                "observation must be finite for update",
            ));
        }

        self.moments.push(value);
        self.score = (self.score + value - self.moments.mean - self.config.drift).max(0.0);

        let detected = self.moments.n >= self.config.min_observations
            && self.score > self.config.threshold;
        if detected {
            self.change = true;
            self.detections += 1;
            self.clear_state();
        }
        Ok(detected)
    }

    fn estimation(&self) -> f64 {
        self.moments.mean
    }

    fn variance(&self) -> f64 {
        self.moments.variance()
    }

    fn width(&self) -> usize {
        self.moments.n
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
        self.clear_state();
        self.change = false;
        self.detections = 0;
    }
}

/// Page-Hinkley configuration.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct PageHinkleyConfig {
    /// Observations required before alerts may fire.
    pub min_observations: usize,
    /// Allowed drift subtracted from every deviation.
    pub drift: f64,
    /// Alert threshold on `cumulative - running_min`.
    pub threshold: f64,
}

impl Default for PageHinkleyConfig {
    fn default() -> Self {
        Self {
            min_observations: 30,
            drift: 0.005,
            threshold: 50.0,
        }
    }
}

impl PageHinkleyConfig {
    pub fn validate(&self) -> Result<(), CutpointError> {
        if !self.drift.is_finite() || self.drift < 0.0 {
            return Err(CutpointError::invalid_input(format!(
                "Page-Hinkley drift must be finite and >= 0; got {}",
                self.drift
            )));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(CutpointError::invalid_input(format!(
                "Page-Hinkley threshold must be finite and > 0; got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Page-Hinkley detector: running minimum of the cumulative deviation.
#[derive(Clone, Debug)]
pub struct PageHinkley {
    config: PageHinkleyConfig,
    moments: RunningMoments,
    cumulative: f64,
    cumulative_min: f64,
    change: bool,
    detections: usize,
}

impl PageHinkley {
    pub fn new(config: PageHinkleyConfig) -> Result<Self, CutpointError> {
        config.validate()?;
        Ok(Self {
            config,
            moments: RunningMoments::default(),
            cumulative: 0.0,
            cumulative_min: 0.0,
            change: false,
            detections: 0,
        })
    }

    pub fn with_defaults() -> Self {
        Self::new(PageHinkleyConfig::default()).expect("default Page-Hinkley config is valid")
    }

    pub fn config(&self) -> &PageHinkleyConfig {
        &self.config
    }

    /// Current test statistic.
    pub fn score(&self) -> f64 {
        (self.cumulative - self.cumulative_min).max(0.0)
    }

    fn clear_state(&mut self) {
        self.moments.clear();
        self.cumulative = 0.0;
        self.cumulative_min = 0.0;
    }
}

impl ChangeDetector for PageHinkley {
    fn set_input(&mut self, value: f64) -> Result<bool, CutpointError> {
        if !value.is_finite() {
            return Err(CutpointError::invalid_input(
                "observation must be finite for update",
            ));
        }

        self.moments.push(value);
        self.cumulative += value - self.moments.mean - self.config.drift;
        self.cumulative_min = self.cumulative_min.min(self.cumulative);

        let detected = self.moments.n >= self.config.min_observations
            && self.score() > self.config.threshold;
        if detected {
            self.change = true;
            self.detections += 1;
            self.clear_state();
        }
        Ok(detected)
    }

    fn estimation(&self) -> f64 {
        self.moments.mean
    }

    fn variance(&self) -> f64 {
        self.moments.variance()
    }

    fn width(&self) -> usize {
        self.moments.n
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
        self.clear_state();
        self.change = false;
        self.detections = 0;
    }
}
