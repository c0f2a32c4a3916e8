// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Sing detector: the ADWIN skeleton over fixed-capacity blocks.
//!
//! Instead of power-of-two rows, raw observations fill blocks of a
//! configurable size. Cut points are only evaluated at block boundaries,
//! which trades detection resolution for a cheaper scan. An optional decay
//! pass merges adjacent blocks whose means are closer than a growing
//! epsilon, so old data is summarized ever more coarsely.

use crate::adwin::BoundModulation;
use cutpoint_core::{ChangeDetector, CutpointError};
use std::collections::VecDeque;

/// How the merge epsilon grows with distance from the newest block.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecayMode {
    #[default]
    Linear,
    Exponential,
}

/// Cadence of the decay-compression pass.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionMode {
    /// Run a pass every `compression_term` completed blocks.
    #[default]
    FixedTerm,
    /// Pareto-decaying term: passes become more frequent over time, floored
    /// at 32 blocks.
    Pareto,
}

/// Sing detector configuration.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct SingConfig {
    /// Confidence parameter of the cut bound.
    pub delta: f64,
    /// Raw observations per block.
    pub block_size: usize,
    pub decay_mode: DecayMode,
    pub compression_mode: CompressionMode,
    /// Base epsilon of the decay merge test. Zero disables merging.
    pub epsilon_prime: f64,
    /// Growth factor of the decay epsilon.
    pub alpha: f64,
    /// Blocks between decay passes (also the Pareto starting term).
    pub compression_term: usize,
    pub modulation: BoundModulation,
}

impl Default for SingConfig {
    fn default() -> Self {
        Self {
            delta: 0.05,
            block_size: 32,
            decay_mode: DecayMode::Linear,
            compression_mode: CompressionMode::FixedTerm,
            epsilon_prime: 0.0,
            alpha: 0.0,
            compression_term: 50,
            modulation: BoundModulation::None,
        }
    }
}

impl SingConfig {
    pub fn validate(&self) -> Result<(), CutpointError> {
        if !self.delta.is_finite() || self.delta <= 0.0 || self.delta >= 1.0 {
            return Err(CutpointError::invalid_input(format!(
                "delta must be in (0, 1); got {}",
                self.delta
            )));
        }
        if self.block_size == 0 {
            return Err(CutpointError::invalid_input("block_size must be > 0"));
        }
        if !self.epsilon_prime.is_finite() || self.epsilon_prime < 0.0 {
            return Err(CutpointError::invalid_input(format!(
                "epsilon_prime must be finite and >= 0; got {}",
                self.epsilon_prime
            )));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(CutpointError::invalid_input(format!(
                "alpha must be finite and >= 0; got {}",
                self.alpha
            )));
        }
        if self.compression_term == 0 {
            return Err(CutpointError::invalid_input(
                "compression_term must be > 0",
            ));
        }
        self.modulation.validate()?;
        Ok(())
    }
}

/// Fixed-capacity run of raw observations. Merged blocks keep the combined
/// capacity so the scan still knows the represented count.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct SingBlock {
    items: usize,
    capacity: usize,
    total: f64,
    variance: f64,
}

impl SingBlock {
    fn new(capacity: usize) -> Self {
        Self {
            items: 0,
            capacity,
            total: 0.0,
            variance: 0.0,
        }
    }

    fn is_full(&self) -> bool {
        self.items >= self.capacity
    }

    fn mean(&self) -> f64 {
        if self.items == 0 {
            return 0.0;
        }
        self.total / self.items as f64
    }
}

/// Block window: oldest block at the front.
#[derive(Clone, Debug)]
struct SingWindow {
    blocks: VecDeque<SingBlock>,
    width: usize,
    total: f64,
    variance: f64,
    blocks_since_compression: usize,
    decay_iteration: usize,
    pareto_term: usize,
}

impl SingWindow {
    fn new(block_size: usize) -> Self {
        let mut blocks = VecDeque::new();
        blocks.push_back(SingBlock::new(block_size));
        Self {
            blocks,
            width: 0,
            total: 0.0,
            variance: 0.0,
            blocks_since_compression: 0,
            decay_iteration: 1,
            pareto_term: 0,
        }
    }

    /// Merges `blocks[index]` into its older neighbor. Plain stat addition:
    /// the two blocks came from the same stream segment, so the decay merge
    /// intentionally drops the between-group term (the merge test already
    /// established the means are within epsilon).
    fn merge_into_older(&mut self, index: usize) {
        let newer = self.blocks[index];
        let older = &mut self.blocks[index - 1];
        older.total += newer.total;
        older.items += newer.items;
        older.variance += newer.variance;
        older.capacity += newer.capacity;
        let _ = self.blocks.remove(index);
    }
}

/// Block-window change detector.
#[derive(Clone, Debug)]
pub struct SingDetector {
    config: SingConfig,
    window: SingWindow,
    element_count: usize,
    change: bool,
    detections: usize,
    checks: usize,
    relative_position: f64,
}

impl SingDetector {
    pub fn new(config: SingConfig) -> Result<Self, CutpointError> {
        config.validate()?;
        let mut detector = Self {
            window: SingWindow::new(config.block_size),
            config,
            element_count: 0,
            change: false,
            detections: 0,
            checks: 0,
            relative_position: 0.0,
        };
        detector.window.pareto_term = detector.config.compression_term;
        Ok(detector)
    }

    pub fn with_defaults() -> Self {
        Self::new(SingConfig::default()).expect("default Sing config is valid")
    }

    pub fn config(&self) -> &SingConfig {
        &self.config
    }

    /// Number of cut evaluations performed so far.
    pub fn checks(&self) -> usize {
        self.checks
    }

    pub fn block_count(&self) -> usize {
        self.window.blocks.len()
    }

    /// Feeds one observation together with a relative position in `[0, 1]`
    /// used only by the optional bound modulation.
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
        self.set_input(value)
    }

    fn add_element(&mut self, value: f64) {
        if self
            .window
            .blocks
            .back()
            .map_or(true, SingBlock::is_full)
        {
            self.maybe_compress();
            self.window
                .blocks
                .push_back(SingBlock::new(self.config.block_size));
            self.window.blocks_since_compression += 1;
        }

        let width = self.window.width;
        let mut increment = 0.0;
        if width >= 1 {
            let prev = width as f64;
            let deviation = value - self.window.total / prev;
            increment = prev * deviation * deviation / (width + 1) as f64;
        }
        self.window.width += 1;
        self.window.total += value;
        self.window.variance += increment;

        let tail = self
            .window
            .blocks
            .back_mut()
            .expect("window always holds at least one block");
        tail.items += 1;
        tail.total += value;
        tail.variance += increment;

        self.element_count += 1;
    }

    /// Decay-compression pass: merge adjacent blocks (newest to oldest)
    /// whose mean difference is below the growing epsilon.
    fn maybe_compress(&mut self) {
        if self.window.blocks.len() < 2 {
            return;
        }
        let due = match self.config.compression_mode {
            CompressionMode::FixedTerm => {
                self.window.blocks_since_compression > self.config.compression_term
            }
            CompressionMode::Pareto => {
                self.window.blocks_since_compression >= self.window.pareto_term
            }
        };
        if !due {
            return;
        }

        if self.config.compression_mode == CompressionMode::Pareto {
            self.window.pareto_term = pareto_term(
                self.config.compression_term,
                self.window.decay_iteration,
            );
            self.window.decay_iteration += 1;
        }
        self.window.blocks_since_compression = 0;

        let mut epsilon = 0.0;
        let mut step = 0u32;
        let mut index = self.window.blocks.len() - 1;
        while index >= 1 {
            let newer = self.window.blocks[index];
            let older = self.window.blocks[index - 1];
            if newer.items > 0 && older.items > 0 {
                let diff = (older.mean() - newer.mean()).abs();
                epsilon = match self.config.decay_mode {
                    DecayMode::Linear => epsilon + self.config.epsilon_prime * self.config.alpha,
                    DecayMode::Exponential => {
                        self.config.epsilon_prime * (1.0 + self.config.alpha).powi(step as i32)
                    }
                };
                if diff < epsilon {
                    self.window.merge_into_older(index);
                }
            }
            index -= 1;
            step += 1;
        }
    }

    /// Scans block boundaries newest-to-oldest and drops everything older
    /// than the first boundary whose mean difference exceeds the bound.
    fn check_for_cut(&mut self) -> bool {
        loop {
            let blocks = &self.window.blocks;
            if blocks.len() < 2 {
                return false;
            }

            let mut n0 = self.window.width;
            let mut n1 = 0usize;
            let mut u0 = self.window.total;
            let mut u1 = 0.0;
            let mut cut_at = None;

            for index in (1..blocks.len()).rev() {
                let block = blocks[index];
                if block.items == 0 {
                    continue;
                }
                n0 -= block.items;
                n1 += block.items;
                u0 -= block.total;
                u1 += block.total;
                if n0 == 0 {
                    break;
                }

                self.checks += 1;
                let diff = (u1 / n1 as f64 - u0 / n0 as f64).abs();
                if diff > self.cut_bound(n0 as f64, n1 as f64) {
                    cut_at = Some(index);
                    break;
                }
            }

            let Some(cut_at) = cut_at else {
                return self.change;
            };

            // Discard every block older than the cut in one splice.
            for _ in 0..cut_at {
                let removed = self
                    .window
                    .blocks
                    .pop_front()
                    .expect("cut index is within the block deque");
                self.window.width -= removed.items;
                self.window.total -= removed.total;
                self.window.variance -= removed.variance;
            }
            if self.window.variance < 0.0 {
                self.window.variance = 0.0;
            }
            self.window.decay_iteration = 1;
            self.change = true;
            // Rescan: a more recent boundary may now exceed its bound.
        }
    }

    /// Same `dd`/pooled-variance form as the ADWIN bound but without the
    /// min-window correction (block granularity already enforces a floor).
    fn cut_bound(&self, n0: f64, n1: f64) -> f64 {
        let n = n0 + n1;
        let dd = (2.0 * n.ln() / self.config.delta).ln();
        let v = if self.window.width == 0 {
            0.0
        } else {
            self.window.variance / self.window.width as f64
        };
        let m = 1.0 / n0 + 1.0 / n1;
        let epsilon = (2.0 * m * v * dd).sqrt() + 2.0 / 3.0 * dd * m;
        self.config
            .modulation
            .apply(epsilon, self.relative_position)
    }
}

/// Pareto-decaying term size, floored at 32 blocks.
fn pareto_term(default_term: usize, iteration: usize) -> usize {
    let scaled = default_term as f64 / iteration.max(1) as f64;
    (scaled as usize).max(32)
}

impl ChangeDetector for SingDetector {
    fn set_input(&mut self, value: f64) -> Result<bool, CutpointError> {
        if !value.is_finite() {
            return Err(CutpointError::invalid_input(
                "observation must be finite for update",
            ));
        }

        self.add_element(value);
        self.change = false;

        let mut detected = false;
        if self.element_count % self.config.block_size == 0 && self.window.blocks.len() >= 2 {
            detected = self.check_for_cut();
        }
        if detected {
            self.change = true;
            self.detections += 1;
        }
        Ok(detected)
    }

    fn estimation(&self) -> f64 {
        if self.window.width == 0 {
            return 0.0;
        }
        self.window.total / self.window.width as f64
    }

    fn variance(&self) -> f64 {
        if self.window.width == 0 {
            return 0.0;
        }
        self.window.variance / self.window.width as f64
    }

    fn width(&self) -> usize {
        self.window.width
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
        self.window = SingWindow::new(self.config.block_size);
        self.window.pareto_term = self.config.compression_term;
        self.element_count = 0;
        self.change = false;
        self.detections = 0;
        self.checks = 0;
        self.relative_position = 0.0;
    }
}
