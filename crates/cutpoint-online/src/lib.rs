// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod adwin;
pub mod baseline;
pub mod ensemble;
pub mod histogram;
pub mod sing;

pub use adwin::{Adwin, AdwinConfig, BoundModulation};
pub use baseline::{Cusum, CusumConfig, PageHinkley, PageHinkleyConfig};
pub use ensemble::{EnsembleConfig, EnsembleDetector};
pub use histogram::ExponentialHistogram;
pub use sing::{CompressionMode, DecayMode, SingConfig, SingDetector};

pub use cutpoint_core::{ChangeDetector, CutpointError};
