// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, SlipError};

/// An ordered set of 3D points (x, y, z) describing a fault or horizon surface.
///
/// Rows may be non-finite to mark undefined elevations. A point set is never
/// mutated after construction; transforms always return a new set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointSet {
    points: Vec<[f64; 3]>,
}

impl PointSet {
    /// Create a point set from rows of `[x, y, z]`.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        PointSet { points }
    }

    /// Create a point set from a flat row-major `[x0, y0, z0, x1, ...]` buffer.
    ///
    /// # Errors
    /// Returns an error if the buffer length is not a multiple of 3.
    pub fn from_flat(data: &[f64]) -> Result<Self> {
        if data.len() % 3 != 0 {
            return Err(SlipError::ShapeMismatch {
                expected: vec![data.len() / 3, 3],
                got: vec![data.len()],
            });
        }
        Ok(PointSet {
            points: data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
        })
    }

    /// Get the rows of the point set.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Iterate over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, [f64; 3]> {
        self.points.iter()
    }

    /// Number of rows, including non-finite ones.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the set has no rows.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of rows whose three coordinates are all finite.
    pub fn finite_count(&self) -> usize {
        self.points.iter().filter(|p| is_finite_point(p)).count()
    }

    /// Return a new set holding only the finite rows, in their original order.
    pub fn finite(&self) -> PointSet {
        PointSet {
            points: self
                .points
                .iter()
                .filter(|p| is_finite_point(p))
                .copied()
                .collect(),
        }
    }

    /// Return a new set made of the rows at `indices` (indices may repeat).
    ///
    /// # Panics
    /// Panics if an index is out of bounds.
    pub fn select(&self, indices: &[usize]) -> PointSet {
        PointSet {
            points: indices.iter().map(|&i| self.points[i]).collect(),
        }
    }

    /// Return every `step`-th row, starting from the first. A step of zero is treated as one.
    pub fn every_nth(&self, step: usize) -> PointSet {
        PointSet {
            points: self.points.iter().step_by(step.max(1)).copied().collect(),
        }
    }

    /// Flatten into a row-major `[x0, y0, z0, x1, ...]` buffer.
    pub fn to_flat(&self) -> Vec<f64> {
        self.points.iter().flat_map(|p| p.iter().copied()).collect()
    }

    /// Consume the set and return its rows.
    pub fn into_inner(self) -> Vec<[f64; 3]> {
        self.points
    }
}

impl From<Vec<[f64; 3]>> for PointSet {
    fn from(points: Vec<[f64; 3]>) -> Self {
        PointSet::new(points)
    }
}

impl FromIterator<[f64; 3]> for PointSet {
    fn from_iter<I: IntoIterator<Item = [f64; 3]>>(iter: I) -> Self {
        PointSet::new(iter.into_iter().collect())
    }
}

pub(crate) fn is_finite_point(p: &[f64; 3]) -> bool {
    p[0].is_finite() && p[1].is_finite() && p[2].is_finite()
}

/// A horizontal rigid displacement of the hanging wall along the fault.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SlipVector {
    /// Displacement along x.
    pub dx: f64,
    /// Displacement along y.
    pub dy: f64,
}

impl SlipVector {
    /// Create a slip vector from its components.
    pub fn new(dx: f64, dy: f64) -> Self {
        SlipVector { dx, dy }
    }

    /// The identity slip.
    pub fn zero() -> Self {
        SlipVector { dx: 0.0, dy: 0.0 }
    }

    /// A slip of length `magnitude` toward a compass azimuth (degrees clockwise from north).
    pub fn from_azimuth(azimuth_deg: f64, magnitude: f64) -> Self {
        let [ux, uy] = unit_from_azimuth(azimuth_deg);
        SlipVector {
            dx: ux * magnitude,
            dy: uy * magnitude,
        }
    }

    /// Euclidean length.
    pub fn magnitude(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    /// True if both components are exactly zero.
    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }

    /// Unit vector along the slip, or `None` for the zero slip.
    pub fn unit(&self) -> Option<[f64; 2]> {
        let m = self.magnitude();
        if m > 0.0 && m.is_finite() {
            Some([self.dx / m, self.dy / m])
        } else {
            None
        }
    }

    /// Dot product with a 2D direction.
    pub fn dot(&self, direction: [f64; 2]) -> f64 {
        self.dx * direction[0] + self.dy * direction[1]
    }

    /// Compass azimuth of the slip direction in degrees, in [0, 360).
    pub fn azimuth(&self) -> f64 {
        let azi = 90.0 - self.dy.atan2(self.dx).to_degrees();
        azi.rem_euclid(360.0)
    }

    /// Components as an array.
    pub fn to_array(&self) -> [f64; 2] {
        [self.dx, self.dy]
    }
}

impl From<[f64; 2]> for SlipVector {
    fn from(v: [f64; 2]) -> Self {
        SlipVector::new(v[0], v[1])
    }
}

impl std::ops::Add for SlipVector {
    type Output = SlipVector;

    fn add(self, rhs: SlipVector) -> SlipVector {
        SlipVector::new(self.dx + rhs.dx, self.dy + rhs.dy)
    }
}

impl std::ops::Mul<f64> for SlipVector {
    type Output = SlipVector;

    fn mul(self, rhs: f64) -> SlipVector {
        SlipVector::new(self.dx * rhs, self.dy * rhs)
    }
}

/// Unit map-view vector pointing toward a compass azimuth (degrees clockwise from north).
pub fn unit_from_azimuth(azimuth_deg: f64) -> [f64; 2] {
    let theta = (90.0 - azimuth_deg).to_radians();
    [theta.cos(), theta.sin()]
}

/// Inclination of the shear direction from vertical, in degrees.
///
/// Positive angles tilt the shear direction toward the slip direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShearAngle(f64);

impl ShearAngle {
    /// Create a shear angle.
    ///
    /// # Errors
    /// Returns an error unless the angle is finite and strictly between -90 and 90 degrees.
    pub fn new(degrees: f64) -> Result<Self> {
        if !degrees.is_finite() || degrees.abs() >= 90.0 {
            return Err(SlipError::InvalidParameter {
                name: "shear angle",
                reason: format!("{} degrees (must be finite and within (-90, 90))", degrees),
            });
        }
        Ok(ShearAngle(degrees))
    }

    /// Vertical shear.
    pub fn vertical() -> Self {
        ShearAngle(0.0)
    }

    /// The angle in degrees.
    pub fn degrees(&self) -> f64 {
        self.0
    }

    /// Tangent of the angle, the horizontal offset per unit of depth along the shear direction.
    pub fn tan(&self) -> f64 {
        self.0.to_radians().tan()
    }
}

/// Restricts the slip search to a subspace.
///
/// A slip is expressed as `sum(t_i * b_i)` over the basis vectors returned by
/// [`DirectionConstraint::basis`]; the optimizer searches over the `t_i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DirectionConstraint {
    /// Slip may only lie along this unit vector (a 1D search).
    Azimuth {
        /// Unit direction in map view.
        unit: [f64; 2],
    },
    /// Each slip component is scaled independently; a zero scale pins that component at zero.
    PerAxis {
        /// Scale applied to the x and y search coordinates.
        scale: [f64; 2],
    },
}

impl DirectionConstraint {
    /// Constrain slip to a compass azimuth (degrees clockwise from north).
    pub fn from_azimuth(azimuth_deg: f64) -> Self {
        DirectionConstraint::Azimuth {
            unit: unit_from_azimuth(azimuth_deg),
        }
    }

    /// Scale the search axes by the components of a compass direction.
    pub fn per_axis_from_azimuth(azimuth_deg: f64) -> Self {
        DirectionConstraint::PerAxis {
            scale: unit_from_azimuth(azimuth_deg),
        }
    }

    /// Orthogonal basis of the search subspace (one or two vectors).
    ///
    /// # Errors
    /// Returns an error if the constraint leaves no searchable direction.
    pub fn basis(&self) -> Result<Vec<[f64; 2]>> {
        let basis: Vec<[f64; 2]> = match *self {
            DirectionConstraint::Azimuth { unit } => {
                let n = unit[0].hypot(unit[1]);
                if n > 0.0 && n.is_finite() {
                    vec![[unit[0] / n, unit[1] / n]]
                } else {
                    Vec::new()
                }
            }
            DirectionConstraint::PerAxis { scale } => {
                let mut b = Vec::with_capacity(2);
                if scale[0] != 0.0 && scale[0].is_finite() {
                    b.push([scale[0], 0.0]);
                }
                if scale[1] != 0.0 && scale[1].is_finite() {
                    b.push([0.0, scale[1]]);
                }
                b
            }
        };
        if basis.is_empty() {
            return Err(SlipError::InvalidParameter {
                name: "direction constraint",
                reason: format!("{:?} spans no direction", self),
            });
        }
        Ok(basis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_flat_roundtrip() {
        let flat = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let set = PointSet::from_flat(&flat).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.points()[1], [3.0, 4.0, 5.0]);
        assert_eq!(set.to_flat(), flat);
    }

    #[test]
    fn from_flat_bad_length() {
        let result = PointSet::from_flat(&[1.0, 2.0]);
        assert!(matches!(result, Err(SlipError::ShapeMismatch { .. })));
    }

    #[test]
    fn finite_rows_filtered_in_order() {
        let set = PointSet::new(vec![
            [0.0, 0.0, 1.0],
            [f64::NAN, 0.0, 0.0],
            [1.0, 1.0, f64::INFINITY],
            [2.0, 2.0, 2.0],
        ]);
        assert_eq!(set.finite_count(), 2);
        assert_eq!(set.finite().points(), &[[0.0, 0.0, 1.0], [2.0, 2.0, 2.0]]);
    }

    #[test]
    fn select_allows_repeats() {
        let set = PointSet::new(vec![[0.0; 3], [1.0; 3], [2.0; 3]]);
        let picked = set.select(&[2, 2, 0]);
        assert_eq!(picked.points(), &[[2.0; 3], [2.0; 3], [0.0; 3]]);
    }

    #[test]
    fn azimuth_of_cardinal_directions() {
        assert!((SlipVector::new(0.0, 1.0).azimuth() - 0.0).abs() < 1e-12);
        assert!((SlipVector::new(1.0, 0.0).azimuth() - 90.0).abs() < 1e-12);
        assert!((SlipVector::new(0.0, -1.0).azimuth() - 180.0).abs() < 1e-12);
        assert!((SlipVector::new(-1.0, 0.0).azimuth() - 270.0).abs() < 1e-12);
        let nw = SlipVector::new(-1.0, 1.0).azimuth();
        assert!((nw - 315.0).abs() < 1e-12, "azimuth {}", nw);
    }

    #[test]
    fn from_azimuth_matches_azimuth() {
        for az in [0.0, 30.0, 150.0, 302.8, 359.0] {
            let s = SlipVector::from_azimuth(az, 12.5);
            assert!((s.magnitude() - 12.5).abs() < 1e-12);
            assert!((s.azimuth() - az).abs() < 1e-9, "az {} -> {}", az, s.azimuth());
        }
    }

    #[test]
    fn shear_angle_bounds() {
        assert!(ShearAngle::new(70.0).is_ok());
        assert!(ShearAngle::new(-89.9).is_ok());
        assert!(matches!(
            ShearAngle::new(90.0),
            Err(SlipError::InvalidParameter { .. })
        ));
        assert!(ShearAngle::new(f64::NAN).is_err());
        assert_eq!(ShearAngle::vertical().tan(), 0.0);
    }

    #[test]
    fn per_axis_basis_drops_zero_scales() {
        let c = DirectionConstraint::PerAxis { scale: [0.0, -0.5] };
        assert_eq!(c.basis().unwrap(), vec![[0.0, -0.5]]);
        let c = DirectionConstraint::PerAxis { scale: [0.0, 0.0] };
        assert!(c.basis().is_err());
    }

    #[test]
    fn azimuth_basis_is_normalized() {
        let c = DirectionConstraint::Azimuth { unit: [3.0, 4.0] };
        let b = c.basis().unwrap();
        assert_eq!(b.len(), 1);
        assert!((b[0][0] - 0.6).abs() < 1e-12);
        assert!((b[0][1] - 0.8).abs() < 1e-12);
    }
}
