// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Shared contract for the cutpoint change-detection crates: the
//! [`ChangeDetector`] trait every variant implements, and the workspace-wide
//! [`CutpointError`] type.

pub mod detector;
pub mod error;

pub use detector::ChangeDetector;
pub use error::CutpointError;
