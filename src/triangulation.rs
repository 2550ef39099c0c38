// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Map-view Delaunay triangulation and triangle location.
//!
//! The fault surface is interpolated linearly over a Delaunay triangulation of
//! its (x, y) positions, built once per fault with `spade`'s bulk loader. The
//! vertices may later be moved in the plane (the inclined-shear frame), which
//! `spade` cannot follow, so located queries go through a [`TriangleLocator`]
//! built over the moved positions and the fixed connectivity.

use spade::{DelaunayTriangulation, HasPosition, Point2, Triangulation as _};

use crate::error::{Result, SlipError};

/// Barycentric slack accepted when testing whether a point lies in a triangle.
const BARY_TOL: f64 = 1e-9;

/// A map-view vertex remembering its position in the caller's slice.
#[derive(Debug, Clone, Copy)]
struct IndexedVertex {
    position: Point2<f64>,
    index: usize,
}

impl HasPosition for IndexedVertex {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

/// A Delaunay triangulation of a set of distinct 2D points.
#[derive(Debug, Clone)]
pub struct Triangulation {
    triangles: Vec<[usize; 3]>,
}

impl Triangulation {
    /// Triangulate `points`, which must be finite and pairwise distinct.
    ///
    /// Triangles are returned counter-clockwise as indices into `points`.
    ///
    /// # Errors
    /// Returns `InvalidGeometry` for fewer than 3 points, for coordinates the
    /// triangulation cannot represent, or when all points are collinear.
    pub fn new(points: &[[f64; 2]]) -> Result<Self> {
        let n = points.len();
        if n < 3 {
            return Err(SlipError::InvalidGeometry {
                reason: format!("{} distinct map-view points (need at least 3)", n),
            });
        }

        let vertices: Vec<IndexedVertex> = points
            .iter()
            .enumerate()
            .map(|(index, p)| IndexedVertex {
                position: Point2::new(p[0], p[1]),
                index,
            })
            .collect();
        let delaunay = DelaunayTriangulation::<IndexedVertex>::bulk_load(vertices).map_err(|e| {
            SlipError::InvalidGeometry {
                reason: format!("map-view triangulation failed: {:?}", e),
            }
        })?;

        let triangles: Vec<[usize; 3]> = delaunay
            .inner_faces()
            .map(|face| face.vertices().map(|v| v.data().index))
            .collect();

        if triangles.is_empty() {
            return Err(SlipError::InvalidGeometry {
                reason: "all map-view points are collinear".to_string(),
            });
        }
        Ok(Triangulation { triangles })
    }

    /// Vertex indices of each triangle.
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// Number of triangles.
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    /// True if there are no triangles (never the case for a successfully built triangulation).
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Uniform bucket grid answering "which triangle contains this point".
///
/// Built from triangle connectivity and a (possibly moved) set of vertex
/// positions. When moved triangles overlap, the first match wins.
pub struct TriangleLocator<'a> {
    vertices: Vec<[f64; 2]>,
    triangles: &'a [[usize; 3]],
    origin: [f64; 2],
    inv_cell: [f64; 2],
    dims: [usize; 2],
    offsets: Vec<usize>,
    items: Vec<u32>,
}

impl<'a> TriangleLocator<'a> {
    /// Index `triangles` over the vertex positions `vertices`.
    pub fn new(vertices: Vec<[f64; 2]>, triangles: &'a [[usize; 3]]) -> Self {
        let (mut xmin, mut xmax, mut ymin, mut ymax) = (
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
        );
        for t in triangles {
            for &v in t {
                let p = vertices[v];
                xmin = xmin.min(p[0]);
                xmax = xmax.max(p[0]);
                ymin = ymin.min(p[1]);
                ymax = ymax.max(p[1]);
            }
        }

        let side = ((triangles.len() as f64).sqrt().ceil() as usize).clamp(1, 1024);
        let dims = [side, side];
        let span = [(xmax - xmin).max(1e-12), (ymax - ymin).max(1e-12)];
        let inv_cell = [side as f64 / span[0], side as f64 / span[1]];
        let origin = [xmin, ymin];

        let cell_range = |t: &[usize; 3]| -> ([usize; 2], [usize; 2]) {
            let mut lo = [f64::INFINITY; 2];
            let mut hi = [f64::NEG_INFINITY; 2];
            for &v in t {
                for d in 0..2 {
                    lo[d] = lo[d].min(vertices[v][d]);
                    hi[d] = hi[d].max(vertices[v][d]);
                }
            }
            let mut a = [0usize; 2];
            let mut b = [0usize; 2];
            for d in 0..2 {
                a[d] = cell_of(lo[d], origin[d], inv_cell[d], dims[d]);
                b[d] = cell_of(hi[d], origin[d], inv_cell[d], dims[d]);
            }
            (a, b)
        };

        // Two-pass CSR fill: count, then place.
        let num_cells = dims[0] * dims[1];
        let mut counts = vec![0usize; num_cells + 1];
        for t in triangles {
            let (a, b) = cell_range(t);
            for i in a[0]..=b[0] {
                for j in a[1]..=b[1] {
                    counts[i * dims[1] + j + 1] += 1;
                }
            }
        }
        for c in 1..=num_cells {
            counts[c] += counts[c - 1];
        }
        let offsets = counts.clone();
        let mut cursor = counts;
        let mut items = vec![0u32; offsets[num_cells]];
        for (k, t) in triangles.iter().enumerate() {
            let (a, b) = cell_range(t);
            for i in a[0]..=b[0] {
                for j in a[1]..=b[1] {
                    let c = i * dims[1] + j;
                    items[cursor[c]] = k as u32;
                    cursor[c] += 1;
                }
            }
        }

        TriangleLocator {
            vertices,
            triangles,
            origin,
            inv_cell,
            dims,
            offsets,
            items,
        }
    }

    /// Find a triangle containing `p`, returning its index and barycentric weights.
    pub fn locate(&self, p: [f64; 2]) -> Option<(usize, [f64; 3])> {
        if !p[0].is_finite() || !p[1].is_finite() {
            return None;
        }
        let fx = (p[0] - self.origin[0]) * self.inv_cell[0];
        let fy = (p[1] - self.origin[1]) * self.inv_cell[1];
        let slack = 1e-9 * self.dims[0].max(self.dims[1]) as f64;
        if fx < -slack
            || fy < -slack
            || fx > self.dims[0] as f64 + slack
            || fy > self.dims[1] as f64 + slack
        {
            return None;
        }
        let i = (fx.max(0.0) as usize).min(self.dims[0] - 1);
        let j = (fy.max(0.0) as usize).min(self.dims[1] - 1);
        let c = i * self.dims[1] + j;

        for &k in &self.items[self.offsets[c]..self.offsets[c + 1]] {
            let k = k as usize;
            let t = self.triangles[k];
            if let Some(w) = barycentric(
                p,
                self.vertices[t[0]],
                self.vertices[t[1]],
                self.vertices[t[2]],
            ) {
                if w.iter().all(|&l| l >= -BARY_TOL) {
                    return Some((k, w));
                }
            }
        }
        None
    }

    /// Linearly interpolate per-vertex `values` at `p`, or `None` outside the triangulation.
    pub fn interpolate(&self, p: [f64; 2], values: &[f64]) -> Option<f64> {
        let (k, w) = self.locate(p)?;
        let t = self.triangles[k];
        Some(w[0] * values[t[0]] + w[1] * values[t[1]] + w[2] * values[t[2]])
    }
}

fn cell_of(x: f64, origin: f64, inv_cell: f64, dim: usize) -> usize {
    let f = ((x - origin) * inv_cell).max(0.0);
    (f as usize).min(dim - 1)
}

fn barycentric(p: [f64; 2], a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Option<[f64; 3]> {
    let det = (b[1] - c[1]) * (a[0] - c[0]) + (c[0] - b[0]) * (a[1] - c[1]);
    if det.abs() < 1e-300 {
        return None;
    }
    let l1 = ((b[1] - c[1]) * (p[0] - c[0]) + (c[0] - b[0]) * (p[1] - c[1])) / det;
    let l2 = ((c[1] - a[1]) * (p[0] - c[0]) + (a[0] - c[0]) * (p[1] - c[1])) / det;
    Some([l1, l2, 1.0 - l1 - l2])
}
