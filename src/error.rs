// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors that can occur during restoration, inversion, bootstrapping, or I/O.
#[derive(Debug)]
pub enum SlipError {
    /// A fault or horizon surface is degenerate (too few distinct or only collinear points).
    InvalidGeometry {
        /// Explanation of the degeneracy.
        reason: String,
    },
    /// Fewer points than a planar fit requires.
    InsufficientPoints {
        /// The minimum number of usable points.
        required: usize,
        /// The number of usable points found.
        found: usize,
    },
    /// The optimizer exhausted its budget without finding a valid candidate.
    NonConvergent {
        /// Simplex iterations performed.
        iterations: usize,
        /// Objective evaluations performed.
        evaluations: usize,
    },
    /// A candidate slip maps too few horizon points onto the fault.
    OverlapViolation {
        /// Fraction of points that mapped onto the fault footprint.
        overlap: f64,
        /// The minimum fraction required.
        required: f64,
    },
    /// Every bootstrap trial failed or was cancelled.
    AllTrialsFailed {
        /// Number of trials attempted.
        trials: usize,
    },
    /// A configuration value is out of range.
    InvalidParameter {
        /// The parameter name.
        name: &'static str,
        /// Explanation of why it's invalid.
        reason: String,
    },
    /// Array shape does not match expected shape.
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// Unsupported data type in file.
    UnsupportedDtype(String),
    /// Unsupported file format (unrecognized extension).
    UnsupportedFileFormat(String),
    /// Expected MAT variable not found in file.
    MatVariableNotFound {
        /// The variable name that was requested.
        expected: String,
        /// The variable names that are available.
        available: Vec<String>,
    },
    /// Horizon name cannot be used as a dataset key.
    InvalidName(String),
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl fmt::Display for SlipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlipError::InvalidGeometry { reason } => {
                write!(f, "invalid geometry: {}", reason)
            }
            SlipError::InsufficientPoints { required, found } => {
                write!(
                    f,
                    "insufficient points: found {} usable points (need at least {})",
                    found, required
                )
            }
            SlipError::NonConvergent {
                iterations,
                evaluations,
            } => {
                write!(
                    f,
                    "no valid slip found after {} iterations ({} evaluations)",
                    iterations, evaluations
                )
            }
            SlipError::OverlapViolation { overlap, required } => {
                write!(
                    f,
                    "overlap violation: {:.3} of points mapped onto the fault (need {:.3})",
                    overlap, required
                )
            }
            SlipError::AllTrialsFailed { trials } => {
                write!(f, "all {} bootstrap trials failed", trials)
            }
            SlipError::InvalidParameter { name, reason } => {
                write!(f, "invalid {}: {}", name, reason)
            }
            SlipError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            SlipError::UnsupportedDtype(dtype) => {
                write!(f, "unsupported dtype: {}", dtype)
            }
            SlipError::UnsupportedFileFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            SlipError::MatVariableNotFound {
                expected,
                available,
            } => {
                write!(
                    f,
                    "MAT variable '{}' not found; available variables: {:?}",
                    expected, available
                )
            }
            SlipError::InvalidName(name) => {
                write!(
                    f,
                    "invalid horizon name '{}' (must start with a letter and contain only \
                     ASCII letters, digits, or '_')",
                    name
                )
            }
            SlipError::IoError(e) => write!(f, "I/O error: {}", e),
            SlipError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SlipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SlipError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SlipError {
    fn from(e: std::io::Error) -> Self {
        SlipError::IoError(e)
    }
}

/// Convenience type alias for Results with SlipError.
pub type Result<T> = std::result::Result<T, SlipError>;
