// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Voting ensemble over heterogeneous change detectors.
//!
//! Every member sees every observation. A member that fires enters a
//! cooldown and its vote stays counted until the cooldown expires, so slow
//! members can still join a consensus. The ensemble reports a change when
//! the fraction of voting members reaches the configured threshold.

use cutpoint_core::{ChangeDetector, CutpointError};

/// Ensemble configuration.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnsembleConfig {
    /// Observations a member's vote stays active after it fires.
    pub wait_time: usize,
    /// Fraction of members that must vote, in (0, 1].
    pub vote_threshold: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            wait_time: 1000,
            vote_threshold: 0.5,
        }
    }
}

impl EnsembleConfig {
    pub fn validate(&self) -> Result<(), CutpointError> {
        // A zero cooldown expires every vote on the very next observation,
        // so no multi-member consensus could ever form.
        if self.wait_time == 0 {
            return Err(CutpointError::invalid_input("wait_time must be > 0"));
        }
        if !self.vote_threshold.is_finite()
            || self.vote_threshold <= 0.0
            || self.vote_threshold > 1.0
        {
            return Err(CutpointError::invalid_input(format!(
                "vote_threshold must be in (0, 1]; got {}",
                self.vote_threshold
            )));
        }
        Ok(())
    }
}

struct Member {
    detector: Box<dyn ChangeDetector>,
    /// Remaining observations this member's vote stays active; zero means
    /// no pending vote.
    cooldown: usize,
}

/// Majority-vote combination of change detectors.
pub struct EnsembleDetector {
    config: EnsembleConfig,
    members: Vec<Member>,
    change: bool,
    detections: usize,
}

impl EnsembleDetector {
    pub fn new(
        config: EnsembleConfig,
        detectors: Vec<Box<dyn ChangeDetector>>,
    ) -> Result<Self, CutpointError> {
        config.validate()?;
        if detectors.is_empty() {
            return Err(CutpointError::invalid_input(
                "ensemble needs at least one member detector",
            ));
        }
        Ok(Self {
            config,
            members: detectors
                .into_iter()
                .map(|detector| Member {
                    detector,
                    cooldown: 0,
                })
                .collect(),
            change: false,
            detections: 0,
        })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Number of members currently holding an active vote.
    pub fn active_votes(&self) -> usize {
        self.members
            .iter()
            .filter(|member| member.cooldown > 0)
            .count()
    }
}

impl ChangeDetector for EnsembleDetector {
    fn set_input(&mut self, value: f64) -> Result<bool, CutpointError> {
        if !value.is_finite() {
            return Err(CutpointError::invalid_input(
                "observation must be finite for update",
            ));
        }
        self.change = false;

        let wait_time = self.config.wait_time;
        for member in &mut self.members {
            let fired = member.detector.set_input(value)?;
            if fired {
                member.cooldown = wait_time;
            } else if member.cooldown > 0 {
                member.cooldown -= 1;
            }
        }

        let votes = self.active_votes();
        let needed = (self.config.vote_threshold * self.members.len() as f64).ceil() as usize;
        if votes >= needed.max(1) {
            // Consensus reached: spend every pending vote so the same alarm
            // is not reported twice.
            for member in &mut self.members {
                member.cooldown = 0;
            }
            self.change = true;
            self.detections += 1;
        }
        Ok(self.change)
    }

    /// Mean of the member estimations.
    fn estimation(&self) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .members
            .iter()
            .map(|member| member.detector.estimation())
            .sum();
        sum / self.members.len() as f64
    }

    fn variance(&self) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .members
            .iter()
            .map(|member| member.detector.variance())
            .sum();
        sum / self.members.len() as f64
    }

    /// Widest member window.
    fn width(&self) -> usize {
        self.members
            .iter()
            .map(|member| member.detector.width())
            .max()
            .unwrap_or(0)
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
        for member in &mut self.members {
            member.detector.reset();
            member.cooldown = 0;
        }
        self.change = false;
        self.detections = 0;
    }
}
