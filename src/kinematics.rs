// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Inclined-shear kinematics.
//!
//! A hanging-wall point is carried along with the fault by rotating into a
//! frame whose +u axis follows the slip, shearing so the inclined shear
//! direction becomes vertical (`u' = u - z tan(alpha)`), and applying vertical
//! simple shear: the point moves `m` along u' and its elevation changes by
//! the fault's elevation change between the old and new positions.

use std::collections::HashSet;

use crate::core::{is_finite_point, PointSet, ShearAngle, SlipVector};
use crate::error::Result;
use crate::triangulation::{TriangleLocator, Triangulation};

/// A fault surface triangulated in map view, ready for repeated transforms.
#[derive(Debug, Clone)]
pub struct FaultSurface {
    vertices: Vec<[f64; 3]>,
    triangulation: Triangulation,
}

impl FaultSurface {
    /// Triangulate the finite rows of `fault`.
    ///
    /// Rows repeating an earlier (x, y) position exactly are skipped, so
    /// resampled-with-replacement point sets are accepted.
    ///
    /// # Errors
    /// Returns `InvalidGeometry` if fewer than 3 distinct positions remain or they are collinear.
    pub fn new(fault: &PointSet) -> Result<Self> {
        let mut seen: HashSet<(u64, u64)> = HashSet::with_capacity(fault.len());
        let mut vertices = Vec::with_capacity(fault.len());
        for p in fault.iter().filter(|p| is_finite_point(p)) {
            // +0.0 and -0.0 must collide.
            let key = ((p[0] + 0.0).to_bits(), (p[1] + 0.0).to_bits());
            if seen.insert(key) {
                vertices.push(*p);
            }
        }
        let xy: Vec<[f64; 2]> = vertices.iter().map(|p| [p[0], p[1]]).collect();
        let triangulation = Triangulation::new(&xy)?;
        Ok(FaultSurface {
            vertices,
            triangulation,
        })
    }

    /// The distinct fault vertices used for interpolation.
    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    /// Number of triangles in the map-view triangulation.
    pub fn num_triangles(&self) -> usize {
        self.triangulation.len()
    }

    /// Elevation of the fault at map position (x, y), or `None` outside its footprint.
    pub fn elevation(&self, x: f64, y: f64) -> Option<f64> {
        let frame = self.frame([1.0, 0.0], 0.0);
        frame.locator.interpolate([x, y], &frame.z)
    }

    /// Move `target` with the hanging wall by `slip` (forward deformation).
    ///
    /// The output has the same length and order as `target`; points whose shear
    /// line misses the fault footprint (before or after the move) come back as
    /// NaN rows, or are dropped when `remove_invalid` is set.
    pub fn inclined_shear(
        &self,
        target: &PointSet,
        slip: SlipVector,
        alpha: ShearAngle,
        remove_invalid: bool,
    ) -> PointSet {
        let (direction, magnitude) = split_slip(slip);
        self.frame(direction, alpha.tan())
            .displace(target, magnitude, remove_invalid)
    }

    /// Undo a displacement by `slip`: the exact inverse of [`FaultSurface::inclined_shear`].
    pub fn restore(
        &self,
        target: &PointSet,
        slip: SlipVector,
        alpha: ShearAngle,
        remove_invalid: bool,
    ) -> PointSet {
        let (direction, magnitude) = split_slip(slip);
        self.frame(direction, alpha.tan())
            .displace(target, -magnitude, remove_invalid)
    }

    /// Mean 3D displacement (heave in x and y, throw in z) of `target` moved by `slip`.
    ///
    /// Returns `None` if no point maps onto the fault.
    pub fn heave(
        &self,
        target: &PointSet,
        slip: SlipVector,
        alpha: ShearAngle,
    ) -> Option<[f64; 3]> {
        let moved = self.inclined_shear(target, slip, alpha, false);
        let mut sum = [0.0; 3];
        let mut count = 0usize;
        for (a, b) in target.iter().zip(moved.iter()) {
            if is_finite_point(a) && is_finite_point(b) {
                for d in 0..3 {
                    sum[d] += b[d] - a[d];
                }
                count += 1;
            }
        }
        if count == 0 {
            return None;
        }
        Some([
            sum[0] / count as f64,
            sum[1] / count as f64,
            sum[2] / count as f64,
        ])
    }

    /// Build the sheared frame for a unit slip direction.
    pub(crate) fn frame(&self, direction: [f64; 2], tan_alpha: f64) -> ShearFrame<'_> {
        let [c, s] = direction;
        let mut uv = Vec::with_capacity(self.vertices.len());
        let mut z = Vec::with_capacity(self.vertices.len());
        for p in &self.vertices {
            let u = c * p[0] + s * p[1];
            let v = -s * p[0] + c * p[1];
            uv.push([u - p[2] * tan_alpha, v]);
            z.push(p[2]);
        }
        ShearFrame {
            cos: c,
            sin: s,
            tan_alpha,
            locator: TriangleLocator::new(uv, self.triangulation.triangles()),
            z,
        }
    }
}

/// Unit direction and magnitude of a slip; the zero slip uses +x.
pub(crate) fn split_slip(slip: SlipVector) -> ([f64; 2], f64) {
    match slip.unit() {
        Some(u) => (u, slip.magnitude()),
        None => ([1.0, 0.0], 0.0),
    }
}

/// The fault seen in a slip-aligned, shear-straightened coordinate frame.
pub(crate) struct ShearFrame<'a> {
    cos: f64,
    sin: f64,
    tan_alpha: f64,
    locator: TriangleLocator<'a>,
    z: Vec<f64>,
}

impl ShearFrame<'_> {
    /// Move one point by `magnitude` along the frame's slip direction.
    fn displace_point(&self, p: &[f64; 3], magnitude: f64) -> Option<[f64; 3]> {
        if !is_finite_point(p) {
            return None;
        }
        let u = self.cos * p[0] + self.sin * p[1];
        let v = -self.sin * p[0] + self.cos * p[1];
        let us = u - p[2] * self.tan_alpha;

        let before = self.locator.interpolate([us, v], &self.z)?;
        let moved = us + magnitude;
        let after = self.locator.interpolate([moved, v], &self.z)?;

        let z = p[2] + (after - before);
        let u = moved + z * self.tan_alpha;
        Some([self.cos * u - self.sin * v, self.sin * u + self.cos * v, z])
    }

    /// Move every point of `target`; unmapped points become NaN rows or are dropped.
    pub(crate) fn displace(
        &self,
        target: &PointSet,
        magnitude: f64,
        remove_invalid: bool,
    ) -> PointSet {
        let mut out = Vec::with_capacity(target.len());
        for p in target.iter() {
            match self.displace_point(p, magnitude) {
                Some(q) => out.push(q),
                None if remove_invalid => {}
                None => out.push([f64::NAN; 3]),
            }
        }
        PointSet::new(out)
    }
}

/// Deform `target` by moving the hanging wall of `fault` by `slip` under inclined shear.
///
/// Convenience wrapper that triangulates the fault on every call; build a
/// [`FaultSurface`] once when transforming repeatedly.
///
/// # Errors
/// Returns `InvalidGeometry` if the fault is degenerate.
pub fn inclined_shear(
    fault: &PointSet,
    target: &PointSet,
    slip: SlipVector,
    alpha: ShearAngle,
    remove_invalid: bool,
) -> Result<PointSet> {
    let surface = FaultSurface::new(fault)?;
    Ok(surface.inclined_shear(target, slip, alpha, remove_invalid))
}
