// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Planar roughness of a point cloud.
//!
//! The roughness is the smallest eigenvalue of the sample covariance of the
//! finite points, i.e. the variance along the best-fit plane's normal.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};

use crate::core::{is_finite_point, PointSet};
use crate::error::{Result, SlipError};

/// Minimum number of finite points for a planar fit.
pub const MIN_PLANE_POINTS: usize = 3;

/// Principal-axes decomposition of a point cloud.
#[derive(Debug, Clone)]
pub struct PrincipalAxes {
    /// Mean of the finite points.
    pub centroid: [f64; 3],
    /// Covariance eigenvalues, largest first.
    pub eigenvalues: [f64; 3],
    /// Unit eigenvectors matching `eigenvalues`; the last is the plane normal.
    pub axes: [[f64; 3]; 3],
    /// Number of finite points used.
    pub count: usize,
}

impl PrincipalAxes {
    /// Normal of the best-fit plane.
    pub fn normal(&self) -> [f64; 3] {
        self.axes[2]
    }
}

/// Sample covariance (n - 1) of the finite points and their centroid.
fn covariance(points: &PointSet) -> Result<(Vector3<f64>, Matrix3<f64>, usize)> {
    let mut sum = Vector3::zeros();
    let mut n = 0usize;
    for p in points.iter().filter(|p| is_finite_point(p)) {
        sum += Vector3::new(p[0], p[1], p[2]);
        n += 1;
    }
    if n < MIN_PLANE_POINTS {
        return Err(SlipError::InsufficientPoints {
            required: MIN_PLANE_POINTS,
            found: n,
        });
    }
    let mean = sum / n as f64;

    let mut cov = Matrix3::zeros();
    for p in points.iter().filter(|p| is_finite_point(p)) {
        let d = Vector3::new(p[0], p[1], p[2]) - mean;
        cov += d * d.transpose();
    }
    cov /= (n - 1) as f64;
    Ok((mean, cov, n))
}

/// Eigen-decompose the covariance of the finite rows of `points`.
///
/// # Errors
/// Returns `InsufficientPoints` when fewer than 3 rows are finite.
pub fn principal_axes(points: &PointSet) -> Result<PrincipalAxes> {
    let (mean, cov, count) = covariance(points)?;
    let eigen = SymmetricEigen::new(cov);

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let mut eigenvalues = [0.0; 3];
    let mut axes = [[0.0; 3]; 3];
    for (k, &i) in order.iter().enumerate() {
        eigenvalues[k] = eigen.eigenvalues[i];
        let col = eigen.eigenvectors.column(i);
        axes[k] = [col[0], col[1], col[2]];
    }

    Ok(PrincipalAxes {
        centroid: [mean[0], mean[1], mean[2]],
        eigenvalues,
        axes,
        count,
    })
}

/// Roughness of `points`: the smallest principal-axis variance, never negative.
///
/// Non-finite rows are ignored.
///
/// # Errors
/// Returns `InsufficientPoints` when fewer than 3 rows are finite.
pub fn planar_variance(points: &PointSet) -> Result<f64> {
    let (_, cov, _) = covariance(points)?;
    let eigen = SymmetricEigen::new(cov);
    let smallest = eigen.eigenvalues.min();
    Ok(smallest.max(0.0))
}

/// `roughness` as a fraction of the roughness of `original`, the horizon before restoration.
///
/// Makes restorations of horizons with different relief comparable: 1 means
/// restoring did not flatten at all, 0 means perfectly planar. `None` when
/// `original` is already planar.
///
/// # Errors
/// Returns `InsufficientPoints` when `original` has fewer than 3 finite rows.
pub fn relative_roughness(roughness: f64, original: &PointSet) -> Result<Option<f64>> {
    let base = planar_variance(original)?;
    Ok((base > 0.0).then(|| roughness / base))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(nx: usize, ny: usize, f: impl Fn(f64, f64) -> f64) -> Vec<[f64; 3]> {
        let mut pts = Vec::new();
        for i in 0..nx {
            for j in 0..ny {
                let x = 10.0 * i as f64;
                let y = 10.0 * j as f64;
                pts.push([x, y, f(x, y)]);
            }
        }
        pts
    }

    #[test]
    fn plane_has_zero_roughness() {
        let pts = PointSet::new(plane(8, 6, |x, y| 3.0 + 0.4 * x - 0.7 * y));
        let r = planar_variance(&pts).unwrap();
        assert!(r.abs() < 1e-9, "roughness {}", r);
    }

    #[test]
    fn nan_rows_are_ignored() {
        let mut rows = plane(5, 5, |x, _| 0.1 * x);
        rows.push([f64::NAN, 0.0, 0.0]);
        rows.push([1.0, f64::INFINITY, 2.0]);
        let r = planar_variance(&PointSet::new(rows)).unwrap();
        assert!(r.is_finite());
        assert!(r < 1e-9);
    }

    #[test]
    fn too_few_points() {
        let pts = PointSet::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [f64::NAN, 0.0, 0.0]]);
        match planar_variance(&pts) {
            Err(SlipError::InsufficientPoints { required, found }) => {
                assert_eq!(required, 3);
                assert_eq!(found, 2);
            }
            other => panic!("expected InsufficientPoints, got {:?}", other),
        }
    }

    #[test]
    fn bumpy_surface_is_rough() {
        let checker = |x: f64, y: f64| {
            if ((x + y) / 10.0) as i64 % 2 == 0 {
                1.0
            } else {
                -1.0
            }
        };
        let pts = PointSet::new(plane(6, 6, checker));
        let r = planar_variance(&pts).unwrap();
        // Checkerboard of +-1 on an even grid: variance along z is 36/35.
        assert!((r - 36.0 / 35.0).abs() < 1e-9, "roughness {}", r);
    }

    #[test]
    fn principal_axes_find_plane_normal() {
        let pts = PointSet::new(plane(7, 7, |_, _| 5.0));
        let axes = principal_axes(&pts).unwrap();
        assert_eq!(axes.count, 49);
        assert!((axes.centroid[2] - 5.0).abs() < 1e-12);
        assert!(axes.eigenvalues[0] >= axes.eigenvalues[1]);
        assert!(axes.eigenvalues[1] >= axes.eigenvalues[2]);
        let n = axes.normal();
        assert!((n[2].abs() - 1.0).abs() < 1e-9, "normal {:?}", n);
    }

    #[test]
    fn relative_roughness_scales_by_original() {
        let bumpy = PointSet::new(plane(6, 6, |x, y| ((x + 2.0 * y) * 0.05).sin()));
        let base = planar_variance(&bumpy).unwrap();
        let rel = relative_roughness(0.25 * base, &bumpy).unwrap().unwrap();
        assert!((rel - 0.25).abs() < 1e-12);

        let flat = PointSet::new(plane(4, 4, |_, _| 2.0));
        assert_eq!(relative_roughness(1.0, &flat).unwrap(), None);
    }
}
