// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Statistics over bootstrap samples: MAD outlier rejection, mean and
//! covariance, and directional projections with 2-sigma bands.

use crate::bootstrap::BootstrapSample;
use crate::core::{unit_from_azimuth, SlipVector};
use crate::error::{Result, SlipError};

/// Consistency constant of the modified z-score, `0.6745 * d / MAD`.
pub const MAD_SCALE: f64 = 0.6745;

/// Default modified z-score above which a sample is an outlier.
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 3.5;

/// Which per-sample quantity outlier rejection looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectOn {
    /// Distance of each slip vector from the coordinate-wise median slip.
    #[default]
    Slip,
    /// Deviation of each roughness value from the median roughness.
    Roughness,
}

/// Outlier rejection settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierRule {
    /// Modified z-score threshold; samples strictly above it are rejected.
    pub threshold: f64,
    /// Quantity the score is computed on.
    pub reject_on: RejectOn,
}

impl Default for OutlierRule {
    fn default() -> Self {
        OutlierRule {
            threshold: DEFAULT_OUTLIER_THRESHOLD,
            reject_on: RejectOn::Slip,
        }
    }
}

impl OutlierRule {
    /// Set the threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the quantity rejection is based on.
    pub fn with_reject_on(mut self, reject_on: RejectOn) -> Self {
        self.reject_on = reject_on;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.threshold.is_nan() || self.threshold <= 0.0 {
            return Err(SlipError::InvalidParameter {
                name: "outlier threshold",
                reason: format!("{} (must be > 0)", self.threshold),
            });
        }
        Ok(())
    }

    /// Outlier flags for `samples` under this rule.
    pub fn mask(&self, samples: &[BootstrapSample]) -> Vec<bool> {
        match self.reject_on {
            RejectOn::Slip => {
                let rows: Vec<[f64; 2]> = samples.iter().map(|s| s.slip.to_array()).collect();
                outlier_mask(&rows, self.threshold)
            }
            RejectOn::Roughness => {
                let rows: Vec<[f64; 1]> = samples.iter().map(|s| [s.roughness]).collect();
                outlier_mask(&rows, self.threshold)
            }
        }
    }
}

/// Median of `values`; `None` when empty. NaNs sort last.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some(0.5 * (v[mid - 1] + v[mid]))
    } else {
        Some(v[mid])
    }
}

/// Modified z-score of every row's distance from the coordinate-wise median.
///
/// When the median absolute deviation is zero, rows at the median score 0
/// and every other row scores infinity.
pub fn modified_z_scores<const D: usize>(rows: &[[f64; D]]) -> Vec<f64> {
    if rows.is_empty() {
        return Vec::new();
    }
    let mut center = [0.0; D];
    for (d, c) in center.iter_mut().enumerate() {
        let column: Vec<f64> = rows.iter().map(|r| r[d]).collect();
        *c = median(&column).unwrap_or(0.0);
    }
    let distances: Vec<f64> = rows
        .iter()
        .map(|r| {
            r.iter()
                .zip(&center)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt()
        })
        .collect();
    let mad = median(&distances).unwrap_or(0.0);

    distances
        .iter()
        .map(|&d| {
            if mad > 0.0 {
                MAD_SCALE * d / mad
            } else if d > 0.0 {
                f64::INFINITY
            } else {
                0.0
            }
        })
        .collect()
}

/// Outlier flags: `true` where the modified z-score exceeds `threshold`.
pub fn outlier_mask<const D: usize>(rows: &[[f64; D]], threshold: f64) -> Vec<bool> {
    modified_z_scores(rows)
        .into_iter()
        .map(|z| z > threshold)
        .collect()
}

/// Mean and sample covariance (n - 1) of 2D rows; zero covariance for one row.
fn mean_and_covariance(rows: &[[f64; 2]]) -> ([f64; 2], [[f64; 2]; 2]) {
    let n = rows.len() as f64;
    let mut mean = [0.0; 2];
    for r in rows {
        mean[0] += r[0] / n;
        mean[1] += r[1] / n;
    }
    let mut cov = [[0.0; 2]; 2];
    if rows.len() > 1 {
        for r in rows {
            let d = [r[0] - mean[0], r[1] - mean[1]];
            for i in 0..2 {
                for j in 0..2 {
                    cov[i][j] += d[i] * d[j];
                }
            }
        }
        for row in cov.iter_mut() {
            for c in row.iter_mut() {
                *c /= n - 1.0;
            }
        }
    }
    (mean, cov)
}

/// Compass azimuth of a map-view vector, degrees in [0, 360).
pub fn azimuth(v: [f64; 2]) -> f64 {
    SlipVector::from(v).azimuth()
}

/// The direction 90 degrees clockwise (in map view) from `d`.
pub fn perpendicular(d: [f64; 2]) -> [f64; 2] {
    [d[1], -d[0]]
}

/// A projected value with its 2-sigma uncertainty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Projection of the mean slip.
    pub value: f64,
    /// Twice the standard deviation of the projected distribution.
    pub two_sigma: f64,
}

/// Mean and covariance of bootstrap slips after outlier rejection.
#[derive(Debug, Clone)]
pub struct SlipSummary {
    /// Mean slip of the kept samples.
    pub mean: SlipVector,
    /// 2x2 sample covariance of the kept samples.
    pub covariance: [[f64; 2]; 2],
    /// Outlier flags aligned with the input samples.
    pub outliers: Vec<bool>,
    /// Number of samples kept.
    pub kept: usize,
}

impl SlipSummary {
    /// Summarize `samples`, excluding outliers under `rule`.
    ///
    /// # Errors
    /// Returns `InsufficientPoints` when `samples` is empty and
    /// `InvalidParameter` for a non-positive threshold.
    pub fn from_samples(samples: &[BootstrapSample], rule: &OutlierRule) -> Result<Self> {
        rule.validate()?;
        if samples.is_empty() {
            return Err(SlipError::InsufficientPoints {
                required: 1,
                found: 0,
            });
        }
        let outliers = rule.mask(samples);
        let kept: Vec<[f64; 2]> = samples
            .iter()
            .zip(&outliers)
            .filter(|(_, &out)| !out)
            .map(|(s, _)| s.slip.to_array())
            .collect();
        // The median row always scores 0, so at least one sample survives.
        let (mean, covariance) = mean_and_covariance(&kept);
        Ok(SlipSummary {
            mean: SlipVector::from(mean),
            covariance,
            kept: kept.len(),
            outliers,
        })
    }

    /// Summarize several horizons together: outliers are rejected per horizon,
    /// then the kept samples are pooled.
    ///
    /// The returned outlier flags are the per-horizon flags concatenated in order.
    ///
    /// # Errors
    /// See [`SlipSummary::from_samples`]; any empty horizon is an error.
    pub fn pooled(horizons: &[&[BootstrapSample]], rule: &OutlierRule) -> Result<Self> {
        rule.validate()?;
        let mut kept = Vec::new();
        let mut outliers = Vec::new();
        for samples in horizons {
            let single = SlipSummary::from_samples(samples, rule)?;
            kept.extend(
                samples
                    .iter()
                    .zip(&single.outliers)
                    .filter(|(_, &out)| !out)
                    .map(|(s, _)| s.slip.to_array()),
            );
            outliers.extend(single.outliers);
        }
        if kept.is_empty() {
            return Err(SlipError::InsufficientPoints {
                required: 1,
                found: 0,
            });
        }
        let (mean, covariance) = mean_and_covariance(&kept);
        Ok(SlipSummary {
            mean: SlipVector::from(mean),
            covariance,
            kept: kept.len(),
            outliers,
        })
    }

    /// Number of samples rejected as outliers.
    pub fn rejected(&self) -> usize {
        self.outliers.len() - self.kept
    }

    /// Project the mean and covariance onto a unit `direction`.
    pub fn project(&self, direction: [f64; 2]) -> Projection {
        let c = &self.covariance;
        let var = direction[0] * (c[0][0] * direction[0] + c[0][1] * direction[1])
            + direction[1] * (c[1][0] * direction[0] + c[1][1] * direction[1]);
        Projection {
            value: self.mean.dot(direction),
            two_sigma: 2.0 * var.abs().sqrt(),
        }
    }

    /// Projection onto a compass azimuth (e.g. a cross-section line).
    pub fn along_azimuth(&self, azimuth_deg: f64) -> Projection {
        self.project(unit_from_azimuth(azimuth_deg))
    }

    /// Projection onto the direction perpendicular to a compass azimuth.
    pub fn across_azimuth(&self, azimuth_deg: f64) -> Projection {
        self.project(perpendicular(unit_from_azimuth(azimuth_deg)))
    }

    /// Slip magnitude: projection onto the mean's own direction.
    pub fn magnitude(&self) -> Projection {
        match self.mean.unit() {
            Some(u) => self.project(u),
            None => Projection {
                value: 0.0,
                two_sigma: 2.0 * self.covariance[0][0].max(self.covariance[1][1]).sqrt(),
            },
        }
    }

    /// Compass azimuth of the mean slip.
    pub fn azimuth(&self) -> f64 {
        self.mean.azimuth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dx: f64, dy: f64, roughness: f64) -> BootstrapSample {
        BootstrapSample {
            slip: SlipVector::new(dx, dy),
            roughness,
        }
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn azimuth_quadrants() {
        assert!((azimuth([0.0, 1.0]) - 0.0).abs() < 1e-12);
        assert!((azimuth([1.0, 0.0]) - 90.0).abs() < 1e-12);
        assert!((azimuth([0.0, -1.0]) - 180.0).abs() < 1e-12);
        assert!((azimuth([-1.0, 0.0]) - 270.0).abs() < 1e-12);
        let a = azimuth([-1.0, 1.0]);
        assert!((a - 315.0).abs() < 1e-12 && a < 360.0);
    }

    #[test]
    fn perpendicular_turns_clockwise() {
        let north = unit_from_azimuth(0.0);
        let p = perpendicular(north);
        assert!((azimuth(p) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn zero_mad_keeps_only_median() {
        let rows = [[1.0, 1.0], [1.0, 1.0], [1.0, 1.0], [5.0, 1.0]];
        assert_eq!(outlier_mask(&rows, 3.5), vec![false, false, false, true]);
        let same = [[2.0], [2.0]];
        assert_eq!(outlier_mask(&same, 3.5), vec![false, false]);
    }

    #[test]
    fn single_sample_has_zero_covariance() {
        let single = [sample(3.0, 4.0, 0.1)];
        let s = SlipSummary::from_samples(&single, &OutlierRule::default()).unwrap();
        assert_eq!(s.mean, SlipVector::new(3.0, 4.0));
        assert_eq!(s.covariance, [[0.0; 2]; 2]);
        assert_eq!(s.kept, 1);
        let m = s.magnitude();
        assert!((m.value - 5.0).abs() < 1e-12);
        assert_eq!(m.two_sigma, 0.0);
    }

    #[test]
    fn sample_covariance_uses_n_minus_one() {
        let samples = [sample(0.0, 0.0, 0.0), sample(2.0, 2.0, 0.0)];
        let s = SlipSummary::from_samples(&samples, &OutlierRule::default()).unwrap();
        assert_eq!(s.mean, SlipVector::new(1.0, 1.0));
        assert!((s.covariance[0][0] - 2.0).abs() < 1e-12);
        assert!((s.covariance[0][1] - 2.0).abs() < 1e-12);
        let along = s.project([1.0, 0.0]);
        assert!((along.two_sigma - 2.0 * 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn projections_on_section() {
        let samples = [sample(10.0, 0.0, 0.0), sample(12.0, 0.0, 0.0), sample(11.0, 0.0, 0.0)];
        let s = SlipSummary::from_samples(&samples, &OutlierRule::default()).unwrap();
        let east = s.along_azimuth(90.0);
        assert!((east.value - 11.0).abs() < 1e-9);
        assert!((east.two_sigma - 2.0).abs() < 1e-9);
        let across = s.across_azimuth(90.0);
        assert!(across.value.abs() < 1e-9);
        assert!(across.two_sigma.abs() < 1e-6);
        assert!((s.azimuth() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn reject_on_roughness() {
        let mut samples: Vec<BootstrapSample> = (0..20)
            .map(|i| sample(i as f64, 0.0, 1.0 + 0.01 * i as f64))
            .collect();
        samples.push(sample(5.0, 0.0, 100.0));
        let rule = OutlierRule::default().with_reject_on(RejectOn::Roughness);
        let s = SlipSummary::from_samples(&samples, &rule).unwrap();
        assert_eq!(s.rejected(), 1);
        assert!(s.outliers[20]);
    }

    #[test]
    fn pooled_rejects_per_horizon() {
        let a = [
            sample(1.0, 0.0, 0.0),
            sample(1.1, 0.0, 0.0),
            sample(0.9, 0.0, 0.0),
            sample(50.0, 0.0, 0.0),
        ];
        let b = [sample(3.0, 0.0, 0.0), sample(3.1, 0.0, 0.0), sample(2.9, 0.0, 0.0)];
        let s = SlipSummary::pooled(&[&a, &b], &OutlierRule::default()).unwrap();
        assert_eq!(s.outliers.len(), 7);
        assert_eq!(s.kept, 6);
        assert!((s.mean.dx - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_samples_error() {
        assert!(matches!(
            SlipSummary::from_samples(&[], &OutlierRule::default()),
            Err(SlipError::InsufficientPoints { .. })
        ));
        assert!(matches!(
            SlipSummary::from_samples(
                &[sample(0.0, 0.0, 0.0)],
                &OutlierRule::default().with_threshold(0.0)
            ),
            Err(SlipError::InvalidParameter { .. })
        ));
    }
}
