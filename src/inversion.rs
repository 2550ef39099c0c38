// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Slip inversion: find the slip whose restoration flattens a horizon.
//!
//! For a candidate slip the deformed horizon is moved back along the fault
//! ([`FaultSurface::restore`]) and scored with [`planar_variance`]. Candidates
//! that leave too many horizon points off the fault footprint are penalized
//! above every valid candidate so the simplex search walks away from them.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::core::{is_finite_point, DirectionConstraint, PointSet, ShearAngle, SlipVector};
use crate::error::{Result, SlipError};
use crate::kinematics::{split_slip, FaultSurface, ShearFrame};
use crate::roughness::{planar_variance, relative_roughness, MIN_PLANE_POINTS};
use crate::simplex::{minimize_multistart, MultiStart, SimplexOptions};

/// Base value of the objective for candidates below the overlap threshold.
pub const OVERLAP_PENALTY: f64 = 1e30;

/// Configuration for [`invert_slip`].
#[derive(Debug, Clone)]
pub struct InversionOptions {
    /// Starting slip for the search.
    pub guess: SlipVector,
    /// Optional restriction of the search subspace.
    pub constraint: Option<DirectionConstraint>,
    /// Minimum fraction of finite horizon points that must map onto the fault, in (0, 1].
    pub overlap_thresh: f64,
    /// Simplex tolerances and budget.
    pub simplex: SimplexOptions,
    /// Optional seeded random restarts around the guess.
    pub multi_start: Option<MultiStart>,
}

impl Default for InversionOptions {
    fn default() -> Self {
        InversionOptions {
            guess: SlipVector::zero(),
            constraint: None,
            overlap_thresh: 1.0,
            simplex: SimplexOptions::default(),
            multi_start: None,
        }
    }
}

impl InversionOptions {
    /// Set the starting slip.
    pub fn with_guess(mut self, guess: SlipVector) -> Self {
        self.guess = guess;
        self
    }

    /// Restrict the search subspace.
    pub fn with_constraint(mut self, constraint: DirectionConstraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    /// Set the minimum mapped fraction.
    pub fn with_overlap_thresh(mut self, overlap_thresh: f64) -> Self {
        self.overlap_thresh = overlap_thresh;
        self
    }

    /// Replace the simplex options.
    pub fn with_simplex(mut self, simplex: SimplexOptions) -> Self {
        self.simplex = simplex;
        self
    }

    /// Add `starts` seeded random restarts drawn within `radius` of the guess.
    pub fn with_multi_start(mut self, starts: usize, radius: f64, seed: u64) -> Self {
        self.multi_start = Some(MultiStart {
            starts,
            radius,
            seed,
        });
        self
    }

    /// Check the options without running anything.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for an out-of-range option.
    pub fn validate(&self) -> Result<()> {
        validate_overlap(self.overlap_thresh)?;
        if !(self.guess.dx.is_finite() && self.guess.dy.is_finite()) {
            return Err(SlipError::InvalidParameter {
                name: "guess",
                reason: format!("must be finite, got {:?}", self.guess),
            });
        }
        if let Some(c) = &self.constraint {
            c.basis()?;
        }
        self.simplex.validate()
    }
}

fn validate_overlap(overlap_thresh: f64) -> Result<()> {
    if overlap_thresh > 0.0 && overlap_thresh <= 1.0 {
        Ok(())
    } else {
        Err(SlipError::InvalidParameter {
            name: "overlap threshold",
            reason: format!("{} (must be in (0, 1])", overlap_thresh),
        })
    }
}

/// Outcome of a slip inversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlipInversion {
    /// Slip that best flattens the horizon.
    pub slip: SlipVector,
    /// Roughness of the horizon restored by `slip`.
    pub roughness: f64,
    /// Simplex iterations used.
    pub iterations: usize,
    /// Objective evaluations used.
    pub evaluations: usize,
    /// Whether the search met its tolerances within budget.
    pub converged: bool,
}

/// Roughness of a restored horizon as a function of slip.
///
/// The sheared fault frame is cached per slip direction, so a search along a
/// fixed direction rebuilds the point locator only once.
pub struct SlipObjective<'a> {
    surface: &'a FaultSurface,
    horizon: &'a PointSet,
    tan_alpha: f64,
    overlap_thresh: f64,
    finite: usize,
    frame: Option<([u64; 2], ShearFrame<'a>)>,
}

impl<'a> SlipObjective<'a> {
    /// Score restorations of `horizon` on `surface` at shear angle `alpha`.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for an overlap threshold outside (0, 1] and
    /// `InsufficientPoints` when the horizon has fewer than 3 finite rows.
    pub fn new(
        surface: &'a FaultSurface,
        horizon: &'a PointSet,
        alpha: ShearAngle,
        overlap_thresh: f64,
    ) -> Result<Self> {
        validate_overlap(overlap_thresh)?;
        let finite = horizon.finite_count();
        if finite < MIN_PLANE_POINTS {
            return Err(SlipError::InsufficientPoints {
                required: MIN_PLANE_POINTS,
                found: finite,
            });
        }
        Ok(SlipObjective {
            surface,
            horizon,
            tan_alpha: alpha.tan(),
            overlap_thresh,
            finite,
            frame: None,
        })
    }

    /// The horizon restored by `slip`, NaN rows included unless `remove_invalid`.
    pub fn restored(&mut self, slip: SlipVector, remove_invalid: bool) -> PointSet {
        let (direction, magnitude) = split_slip(slip);
        let key = [direction[0].to_bits(), direction[1].to_bits()];
        if !matches!(&self.frame, Some((k, _)) if *k == key) {
            self.frame = None;
        }
        let surface: &'a FaultSurface = self.surface;
        let tan_alpha = self.tan_alpha;
        let (_, frame) = self
            .frame
            .get_or_insert_with(|| (key, surface.frame(direction, tan_alpha)));
        frame.displace(self.horizon, -magnitude, remove_invalid)
    }

    /// Fraction of finite horizon rows that map onto the fault when restored by `slip`.
    pub fn overlap(&mut self, slip: SlipVector) -> f64 {
        let restored = self.restored(slip, false);
        overlap_of(&restored, self.finite)
    }

    /// Roughness of the horizon restored by `slip`.
    ///
    /// # Errors
    /// Returns `OverlapViolation` below the overlap threshold and
    /// `InsufficientPoints` if fewer than 3 restored rows remain.
    pub fn roughness_at(&mut self, slip: SlipVector) -> Result<f64> {
        let restored = self.restored(slip, true);
        let overlap = restored.len() as f64 / self.finite as f64;
        if overlap < self.overlap_thresh {
            return Err(SlipError::OverlapViolation {
                overlap,
                required: self.overlap_thresh,
            });
        }
        planar_variance(&restored)
    }

    /// Objective value: roughness, or `OVERLAP_PENALTY * (2 - overlap)` for a
    /// candidate below the threshold or with fewer than 3 restored rows.
    pub fn evaluate(&mut self, slip: SlipVector) -> Result<f64> {
        match self.roughness_at(slip) {
            Err(SlipError::OverlapViolation { overlap, .. }) => {
                Ok(OVERLAP_PENALTY * (2.0 - overlap))
            }
            Err(SlipError::InsufficientPoints { found, .. }) => {
                Ok(OVERLAP_PENALTY * (2.0 - found as f64 / self.finite as f64))
            }
            other => other,
        }
    }
}

fn overlap_of(restored: &PointSet, finite: usize) -> f64 {
    let mapped = restored.iter().filter(|p| is_finite_point(p)).count();
    mapped as f64 / finite as f64
}

/// Slip spanned by search coordinates `t` over `basis`.
fn combine(basis: &[[f64; 2]], t: &[f64]) -> SlipVector {
    basis
        .iter()
        .zip(t)
        .fold(SlipVector::zero(), |acc, (b, &ti)| acc + SlipVector::new(b[0], b[1]) * ti)
}

/// Search coordinates of the projection of `slip` onto `basis`.
fn project(basis: &[[f64; 2]], slip: SlipVector) -> Vec<f64> {
    basis
        .iter()
        .map(|b| slip.dot(*b) / (b[0] * b[0] + b[1] * b[1]))
        .collect()
}

fn search_basis(constraint: Option<&DirectionConstraint>) -> Result<Vec<[f64; 2]>> {
    match constraint {
        Some(c) => c.basis(),
        None => Ok(vec![[1.0, 0.0], [0.0, 1.0]]),
    }
}

/// Find the slip that, undone along `fault` at shear angle `alpha`, best flattens `horizon`.
///
/// Triangulates the fault on every call; see [`invert_slip_on`] to reuse a surface.
///
/// # Errors
/// Returns `InvalidGeometry` for a degenerate fault, `InsufficientPoints` for
/// a horizon with fewer than 3 finite rows, `InvalidParameter` for bad
/// options, and `NonConvergent` when no candidate met the overlap threshold.
pub fn invert_slip(
    fault: &PointSet,
    horizon: &PointSet,
    alpha: ShearAngle,
    options: &InversionOptions,
) -> Result<SlipInversion> {
    options.validate()?;
    let surface = FaultSurface::new(fault)?;
    invert_slip_on(&surface, horizon, alpha, options)
}

/// [`invert_slip`] against an already triangulated fault.
///
/// # Errors
/// See [`invert_slip`].
pub fn invert_slip_on(
    surface: &FaultSurface,
    horizon: &PointSet,
    alpha: ShearAngle,
    options: &InversionOptions,
) -> Result<SlipInversion> {
    options.validate()?;
    let basis = search_basis(options.constraint.as_ref())?;
    let mut objective = SlipObjective::new(surface, horizon, alpha, options.overlap_thresh)?;

    let guess = project(&basis, options.guess);
    let outcome = minimize_multistart(
        |t| objective.evaluate(combine(&basis, t)),
        &guess,
        &options.simplex,
        options.multi_start,
    )?;

    if outcome.value >= OVERLAP_PENALTY {
        debug!(
            evaluations = outcome.evaluations,
            "no candidate slip met the overlap threshold"
        );
        return Err(SlipError::NonConvergent {
            iterations: outcome.iterations,
            evaluations: outcome.evaluations,
        });
    }

    let slip = combine(&basis, &outcome.x);
    if !outcome.converged {
        warn!(
            iterations = outcome.iterations,
            evaluations = outcome.evaluations,
            "simplex budget exhausted; returning best valid slip"
        );
    }
    debug!(
        dx = slip.dx,
        dy = slip.dy,
        roughness = outcome.value,
        evaluations = outcome.evaluations,
        "slip inversion finished"
    );

    Ok(SlipInversion {
        slip,
        roughness: outcome.value,
        iterations: outcome.iterations,
        evaluations: outcome.evaluations,
        converged: outcome.converged,
    })
}

/// Summed misfit of a set of horizons at one shear angle.
#[derive(Debug, Clone)]
pub struct AlphaMisfit {
    /// Shear angle tried.
    pub alpha: ShearAngle,
    /// Sum of restored roughness over all horizons; infinite if any inversion failed.
    pub misfit: f64,
    /// Per-horizon inversion, `None` where no valid slip was found.
    pub inversions: Vec<Option<SlipInversion>>,
}

/// Inclusive grid of shear angles from `min` to `max` in steps of `step` degrees.
///
/// # Errors
/// Returns `InvalidParameter` for a non-positive step, an empty range, or an
/// angle outside (-90, 90).
pub fn alpha_grid(min: f64, max: f64, step: f64) -> Result<Vec<ShearAngle>> {
    if !(step.is_finite() && step > 0.0) || !(min.is_finite() && max.is_finite()) || min > max {
        return Err(SlipError::InvalidParameter {
            name: "shear angle grid",
            reason: format!("min {} max {} step {}", min, max, step),
        });
    }
    let count = ((max - min) / step + 1e-9).floor() as usize + 1;
    (0..count)
        .map(|i| ShearAngle::new(min + step * i as f64))
        .collect()
}

/// Invert every horizon at every shear angle and sum the restored roughness.
///
/// Angles are processed in parallel; the output follows the order of `alphas`.
/// A horizon with no valid slip at some angle makes that angle's misfit infinite.
///
/// # Errors
/// Returns `InvalidGeometry`, `InsufficientPoints`, or `InvalidParameter`
/// from any inversion; `NonConvergent` is recorded, not returned.
pub fn scan_shear_angles(
    fault: &PointSet,
    horizons: &[PointSet],
    alphas: &[ShearAngle],
    options: &InversionOptions,
) -> Result<Vec<AlphaMisfit>> {
    options.validate()?;
    let surface = FaultSurface::new(fault)?;
    alphas
        .par_iter()
        .map(|&alpha| {
            let mut misfit = 0.0;
            let mut inversions = Vec::with_capacity(horizons.len());
            for horizon in horizons {
                match invert_slip_on(&surface, horizon, alpha, options) {
                    Ok(inv) => {
                        misfit += inv.roughness;
                        inversions.push(Some(inv));
                    }
                    Err(SlipError::NonConvergent { .. }) => {
                        misfit = f64::INFINITY;
                        inversions.push(None);
                    }
                    Err(e) => return Err(e),
                }
            }
            debug!(alpha = alpha.degrees(), misfit, "shear angle evaluated");
            Ok(AlphaMisfit {
                alpha,
                misfit,
                inversions,
            })
        })
        .collect()
}

/// The angle with the smallest finite misfit.
pub fn best_alpha(scan: &[AlphaMisfit]) -> Option<&AlphaMisfit> {
    scan.iter()
        .filter(|m| m.misfit.is_finite())
        .min_by(|a, b| a.misfit.total_cmp(&b.misfit))
}

/// Objective values over a regular grid of slips.
#[derive(Debug, Clone)]
pub struct MisfitGrid {
    /// Slip x components, ascending.
    pub dx: Vec<f64>,
    /// Slip y components, ascending.
    pub dy: Vec<f64>,
    /// Objective at `(dx[i], dy[j])`, stored at `i * dy.len() + j`.
    pub values: Vec<f64>,
}

impl MisfitGrid {
    /// Objective at grid node `(i, j)`.
    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.dy.len() + j]
    }

    /// Grid node with the smallest objective.
    pub fn minimum(&self) -> Option<(SlipVector, f64)> {
        let (k, &v) = self
            .values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))?;
        let ny = self.dy.len();
        Some((SlipVector::new(self.dx[k / ny], self.dy[k % ny]), v))
    }

    /// One `(dx, dy, value)` row per node, in storage order.
    pub fn rows(&self) -> Vec<[f64; 3]> {
        let mut out = Vec::with_capacity(self.values.len());
        for (i, &x) in self.dx.iter().enumerate() {
            for (j, &y) in self.dy.iter().enumerate() {
                out.push([x, y, self.value(i, j)]);
            }
        }
        out
    }
}

/// Evaluate the penalized objective on a square grid of slips around `center`.
///
/// Nodes sit at `center + (i, j) * step` for integer offsets with
/// `|i * step|, |j * step| <= half_width`. Penalized nodes keep their penalty
/// value, so the overlap boundary shows up as a cliff in the grid.
///
/// # Errors
/// Returns `InvalidParameter` for a non-positive step or a negative half-width.
pub fn misfit_grid(
    objective: &mut SlipObjective<'_>,
    center: SlipVector,
    half_width: f64,
    step: f64,
) -> Result<MisfitGrid> {
    if !(step.is_finite() && step > 0.0) || !(half_width.is_finite() && half_width >= 0.0) {
        return Err(SlipError::InvalidParameter {
            name: "misfit grid",
            reason: format!("half-width {} step {}", half_width, step),
        });
    }
    let k = (half_width / step + 1e-9).floor() as i64;
    let offsets: Vec<f64> = (-k..=k).map(|i| i as f64 * step).collect();
    let dx: Vec<f64> = offsets.iter().map(|o| center.dx + o).collect();
    let dy: Vec<f64> = offsets.iter().map(|o| center.dy + o).collect();

    let mut values = Vec::with_capacity(dx.len() * dy.len());
    for &x in &dx {
        for &y in &dy {
            values.push(objective.evaluate(SlipVector::new(x, y))?);
        }
    }
    Ok(MisfitGrid { dx, dy, values })
}

/// One horizon of a sequential restoration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequentialStep {
    /// Slip recorded by this horizon alone.
    pub slip: SlipVector,
    /// Total slip since this horizon was deposited (this and all younger increments).
    pub cumulative: SlipVector,
    /// Roughness after restoring this horizon.
    pub roughness: f64,
    /// `roughness` relative to the horizon's roughness before its own
    /// inversion; `None` if it was already planar.
    pub relative_roughness: Option<f64>,
}

/// Restore a stack of horizons from youngest to oldest.
///
/// Each horizon is first moved back by every younger horizon's slip, in
/// order, and then inverted for its own increment. The cumulative slips trace
/// the movement path of the hanging wall back through time.
///
/// # Errors
/// Returns the first inversion error, `NonConvergent` included.
pub fn restore_sequence(
    fault: &PointSet,
    youngest_first: &[PointSet],
    alpha: ShearAngle,
    options: &InversionOptions,
) -> Result<Vec<SequentialStep>> {
    options.validate()?;
    let surface = FaultSurface::new(fault)?;
    let mut steps: Vec<SequentialStep> = Vec::with_capacity(youngest_first.len());
    let mut cumulative = SlipVector::zero();

    for (k, horizon) in youngest_first.iter().enumerate() {
        let mut restored = horizon.clone();
        for step in &steps {
            restored = surface.restore(&restored, step.slip, alpha, false);
        }
        let inv = invert_slip_on(&surface, &restored, alpha, options)?;
        cumulative = cumulative + inv.slip;
        debug!(
            horizon = k,
            dx = inv.slip.dx,
            dy = inv.slip.dy,
            "sequential restoration step"
        );
        steps.push(SequentialStep {
            slip: inv.slip,
            cumulative,
            roughness: inv.roughness,
            relative_roughness: relative_roughness(inv.roughness, &restored)?,
        });
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault() -> PointSet {
        let mut pts = Vec::new();
        for i in 0..=20 {
            for j in 0..=20 {
                let x = -1500.0 + 200.0 * i as f64;
                let y = -1500.0 + 200.0 * j as f64;
                let r2 = (x - 500.0).powi(2) + (y - 500.0).powi(2);
                pts.push([x, y, -120.0 + 80.0 * (-r2 / (2.0 * 400.0 * 400.0)).exp()]);
            }
        }
        PointSet::new(pts)
    }

    fn horizon(x0: f64) -> PointSet {
        let mut pts = Vec::new();
        for i in 0..=10 {
            for j in 0..=10 {
                pts.push([x0 + 100.0 * i as f64, 100.0 * j as f64, 0.0]);
            }
        }
        PointSet::new(pts)
    }

    #[test]
    fn default_options() {
        let opts = InversionOptions::default();
        assert_eq!(opts.overlap_thresh, 1.0);
        assert!(opts.constraint.is_none());
        assert!(opts.multi_start.is_none());
        assert!(opts.validate().is_ok());
        assert!(matches!(
            opts.with_overlap_thresh(0.0).validate(),
            Err(SlipError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn basis_projection() {
        let basis = [[0.5, 0.0], [0.0, -2.0]];
        let t = project(&basis, SlipVector::new(3.0, 4.0));
        assert_eq!(t, vec![6.0, -2.0]);
        assert_eq!(combine(&basis, &t), SlipVector::new(3.0, 4.0));
    }

    #[test]
    fn penalty_grades_overlap() {
        let surface = FaultSurface::new(&fault()).unwrap();
        let h = horizon(0.0);
        let mut obj = SlipObjective::new(&surface, &h, ShearAngle::vertical(), 1.0).unwrap();
        assert_eq!(obj.overlap(SlipVector::zero()), 1.0);
        assert!(obj.evaluate(SlipVector::zero()).unwrap() < 1.0);

        // Restoring by +2000 m pulls the horizon partly off the footprint.
        let partial = obj.evaluate(SlipVector::new(2000.0, 0.0)).unwrap();
        let total = obj.evaluate(SlipVector::new(9000.0, 0.0)).unwrap();
        assert!(partial >= OVERLAP_PENALTY);
        assert!(total > partial);
        assert_eq!(total, 2.0 * OVERLAP_PENALTY);

        match obj.roughness_at(SlipVector::new(9000.0, 0.0)) {
            Err(SlipError::OverlapViolation { overlap, required }) => {
                assert_eq!(overlap, 0.0);
                assert_eq!(required, 1.0);
            }
            other => panic!("expected OverlapViolation, got {:?}", other),
        }
    }

    #[test]
    fn horizon_off_fault_does_not_converge() {
        let result = invert_slip(
            &fault(),
            &horizon(20_000.0),
            ShearAngle::vertical(),
            &InversionOptions::default(),
        );
        assert!(matches!(result, Err(SlipError::NonConvergent { .. })));
    }

    #[test]
    fn sparse_horizon_is_rejected() {
        let h = PointSet::new(vec![[0.0, 0.0, 0.0], [1.0, 1.0, 0.0]]);
        assert!(matches!(
            invert_slip(&fault(), &h, ShearAngle::vertical(), &InversionOptions::default()),
            Err(SlipError::InsufficientPoints { .. })
        ));
    }

    #[test]
    fn recovers_slip_under_vertical_shear() {
        let surface = FaultSurface::new(&fault()).unwrap();
        let truth = SlipVector::new(80.0, 30.0);
        let deformed = surface.inclined_shear(&horizon(0.0), truth, ShearAngle::vertical(), false);
        let opts = InversionOptions::default();
        let inv = invert_slip_on(&surface, &deformed, ShearAngle::vertical(), &opts).unwrap();
        assert!((inv.slip.dx - truth.dx).abs() < 0.1, "slip {:?}", inv.slip);
        assert!((inv.slip.dy - truth.dy).abs() < 0.1, "slip {:?}", inv.slip);
        assert!(inv.roughness < 1e-6);
    }

    #[test]
    fn azimuth_constraint_stays_on_line() {
        let surface = FaultSurface::new(&fault()).unwrap();
        let truth = SlipVector::from_azimuth(120.0, 100.0);
        let deformed = surface.inclined_shear(&horizon(0.0), truth, ShearAngle::vertical(), false);
        let opts = InversionOptions::default()
            .with_constraint(DirectionConstraint::from_azimuth(120.0))
            .with_guess(SlipVector::from_azimuth(120.0, 1.0));
        let inv = invert_slip_on(&surface, &deformed, ShearAngle::vertical(), &opts).unwrap();
        assert!((inv.slip.azimuth() - 120.0).abs() < 1e-6);
        assert!((inv.slip.magnitude() - 100.0).abs() < 0.1, "slip {:?}", inv.slip);
    }

    #[test]
    fn alpha_grid_is_inclusive() {
        let grid = alpha_grid(-80.0, 80.0, 5.0).unwrap();
        assert_eq!(grid.len(), 33);
        assert_eq!(grid[0].degrees(), -80.0);
        assert_eq!(grid[32].degrees(), 80.0);
        assert!(alpha_grid(-90.0, 0.0, 10.0).is_err());
        assert!(alpha_grid(0.0, 10.0, 0.0).is_err());
    }

    #[test]
    fn best_alpha_skips_failures() {
        let scan = vec![
            AlphaMisfit {
                alpha: ShearAngle::new(-10.0).unwrap(),
                misfit: f64::INFINITY,
                inversions: vec![None],
            },
            AlphaMisfit {
                alpha: ShearAngle::new(0.0).unwrap(),
                misfit: 2.0,
                inversions: Vec::new(),
            },
            AlphaMisfit {
                alpha: ShearAngle::new(10.0).unwrap(),
                misfit: 1.0,
                inversions: Vec::new(),
            },
        ];
        assert_eq!(best_alpha(&scan).unwrap().alpha.degrees(), 10.0);
    }

    #[test]
    fn misfit_grid_bottoms_out_at_true_slip() {
        let surface = FaultSurface::new(&fault()).unwrap();
        let truth = SlipVector::new(60.0, 20.0);
        let alpha = ShearAngle::vertical();
        let deformed = surface.inclined_shear(&horizon(0.0), truth, alpha, false);
        let mut obj = SlipObjective::new(&surface, &deformed, alpha, 1.0).unwrap();

        let grid = misfit_grid(&mut obj, truth, 40.0, 20.0).unwrap();
        assert_eq!(grid.dx, vec![20.0, 40.0, 60.0, 80.0, 100.0]);
        assert_eq!(grid.dy, vec![-20.0, 0.0, 20.0, 40.0, 60.0]);
        assert_eq!(grid.values.len(), 25);
        let (best, value) = grid.minimum().unwrap();
        assert_eq!(best, truth);
        assert!(value < 1e-9);
        assert_eq!(grid.value(2, 2), value);
        assert_eq!(grid.rows()[12], [60.0, 20.0, value]);
    }

    #[test]
    fn misfit_grid_keeps_penalties() {
        let surface = FaultSurface::new(&fault()).unwrap();
        let h = horizon(0.0);
        let mut obj = SlipObjective::new(&surface, &h, ShearAngle::vertical(), 1.0).unwrap();
        let grid = misfit_grid(&mut obj, SlipVector::zero(), 9000.0, 9000.0).unwrap();
        assert_eq!(grid.values.len(), 9);
        assert!(grid.value(1, 1) < 1.0);
        assert_eq!(grid.value(0, 0), 2.0 * OVERLAP_PENALTY);
        assert!(misfit_grid(&mut obj, SlipVector::zero(), 10.0, 0.0).is_err());
        assert!(misfit_grid(&mut obj, SlipVector::zero(), -1.0, 5.0).is_err());
    }

    #[test]
    fn sequential_restoration_separates_increments() {
        let f = fault();
        let surface = FaultSurface::new(&f).unwrap();
        let alpha = ShearAngle::vertical();
        let young_slip = SlipVector::new(60.0, 20.0);
        let old_slip = SlipVector::new(-40.0, 50.0);

        // The old horizon records its own increment and then the young one.
        let young = surface.inclined_shear(&horizon(0.0), young_slip, alpha, false);
        let old = surface.inclined_shear(&horizon(0.0), old_slip, alpha, false);
        let old = surface.inclined_shear(&old, young_slip, alpha, false);

        let opts = InversionOptions::default();
        let steps = restore_sequence(&f, &[young, old], alpha, &opts).unwrap();
        assert_eq!(steps.len(), 2);
        let close = |a: SlipVector, b: SlipVector| (a.dx - b.dx).hypot(a.dy - b.dy) < 0.5;
        assert!(close(steps[0].slip, young_slip), "{:?}", steps[0]);
        assert!(close(steps[0].cumulative, young_slip), "{:?}", steps[0]);
        assert!(close(steps[1].slip, old_slip), "{:?}", steps[1]);
        assert!(close(steps[1].cumulative, young_slip + old_slip), "{:?}", steps[1]);
        for step in &steps {
            assert!(step.relative_roughness.unwrap() < 1e-3, "{:?}", step);
        }
    }
}
