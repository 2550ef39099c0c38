// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Inclined-shear restoration of faulted horizons.
//!
//! This library inverts for the horizontal slip of a curved fault by finding
//! the displacement whose inclined-shear restoration makes a deformed horizon
//! as planar as possible, and estimates the uncertainty of that slip by
//! bootstrap resampling the fault and horizon point sets on a worker pool.

#![warn(missing_docs)]

/// Bootstrap resampling engine and generic parallel trial map.
pub mod bootstrap;
/// Point sets, slip vectors, shear angles, and search constraints.
pub mod core;
/// Error types for the library.
pub mod error;
/// Slip inversion by roughness minimization.
pub mod inversion;
/// File I/O for point sets and bootstrap archives.
pub mod io;
/// Inclined-shear forward and inverse transforms.
pub mod kinematics;
/// Planar roughness (smallest principal-axis variance).
pub mod roughness;
/// Nelder-Mead downhill simplex minimizer.
pub mod simplex;
/// Outlier rejection, mean/covariance summaries, and projections.
pub mod stats;
/// Map-view Delaunay triangulation and point location.
pub mod triangulation;

pub use crate::bootstrap::{
    parallel_trials, BootstrapConfig, BootstrapEngine, BootstrapResult, BootstrapSample,
    DipConstraint, ProgressInfo, SeedSequence, TrialOutcome,
};
pub use crate::core::{DirectionConstraint, PointSet, ShearAngle, SlipVector};
pub use crate::error::{Result, SlipError};
pub use crate::inversion::{invert_slip, scan_shear_angles, InversionOptions, SlipInversion};
pub use crate::kinematics::{inclined_shear, FaultSurface};
pub use crate::roughness::planar_variance;
pub use crate::stats::{OutlierRule, Projection, RejectOn, SlipSummary};
