// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::CutpointError;

/// Streaming change-detector contract.
///
/// A detector consumes one scalar observation per call and reports, on that
/// same call, whether a statistically significant shift in the stream mean
/// was detected. Implementations keep only aggregated statistics: after
/// `set_input` returns they hold no reference to caller data.
///
/// Detectors are single-threaded automatons. Callers that share an instance
/// across threads must serialize all calls externally; no interior locking is
/// provided or implied.
pub trait ChangeDetector {
    /// Feeds one observation. Returns `Ok(true)` exactly on the call where a
    /// change was detected.
    ///
    /// Non-finite observations are rejected with
    /// [`CutpointError::InvalidInput`] before touching detector state.
    fn set_input(&mut self, value: f64) -> Result<bool, CutpointError>;

    /// Current estimate of the stream mean over the retained window, `0.0`
    /// when the window is empty.
    fn estimation(&self) -> f64;

    /// Current variance of the retained window, `0.0` when empty.
    fn variance(&self) -> f64;

    /// Number of raw observations currently represented.
    fn width(&self) -> usize;

    /// Latched change flag for callers that poll asynchronously relative to
    /// `set_input`.
    fn change_detected(&self) -> bool;

    /// Clears the latched change flag.
    fn reset_change(&mut self);

    /// Total number of changes detected since construction or `reset`.
    fn detection_count(&self) -> usize;

    /// Returns the detector to its freshly-constructed state.
    fn reset(&mut self);
}
