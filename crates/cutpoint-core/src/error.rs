// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

/// Error type shared by every cutpoint crate.
///
/// Detectors are pure in-memory automatons, so there is no transient or
/// retryable failure class: every error is either a rejected input/config or
/// a numerical degeneracy surfaced before it can corrupt detector state.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CutpointError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
}

impl CutpointError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn numerical_issue(message: impl Into<String>) -> Self {
        Self::NumericalIssue(message.into())
    }
}
