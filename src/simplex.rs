// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Downhill-simplex (Nelder-Mead) minimization.
//!
//! # Algorithm
//!
//! The search keeps `n + 1` vertices in an `n`-dimensional parameter space,
//! ordered by objective value, and replaces the worst vertex by reflecting it
//! through the centroid of the others (expanding or contracting the step as
//! the new value warrants). When no such move improves on the worst vertex
//! the whole simplex shrinks toward the best one.
//!
//! The search stops when both the vertex spread (`xtol`) and the value spread
//! (`ftol`) are small, or when the iteration/evaluation budget runs out. The
//! budget is checked between iterations, so a single iteration may overshoot
//! `max_evaluations` by at most `n + 1` evaluations.
//!
//! A converged search is restarted once from its best vertex with a fresh
//! simplex, which recovers from simplices that collapsed prematurely.
//! Optional seeded multi-start runs additional searches from random offsets
//! around the guess and keeps the best outcome.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SlipError};

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Relative size of the initial simplex edge for non-zero guess components.
const RELATIVE_STEP: f64 = 0.05;

/// Stopping rules and budget for [`minimize`].
#[derive(Debug, Clone)]
pub struct SimplexOptions {
    /// Largest vertex-to-best distance (per component) accepted as converged.
    pub xtol: f64,
    /// Largest value difference from the best vertex accepted as converged.
    pub ftol: f64,
    /// Iteration budget, shared by the initial search and its restart.
    pub max_iterations: usize,
    /// Objective-evaluation budget, shared by the initial search and its restart.
    pub max_evaluations: usize,
    /// Initial simplex edge for guess components that are exactly zero.
    pub initial_step: f64,
    /// Restart once from the best vertex after the first convergence.
    pub restart: bool,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        SimplexOptions {
            xtol: 1e-4,
            ftol: 1e-10,
            max_iterations: 1000,
            max_evaluations: 2000,
            initial_step: 10.0,
            restart: true,
        }
    }
}

impl SimplexOptions {
    /// Set the convergence tolerances.
    pub fn with_tolerances(mut self, xtol: f64, ftol: f64) -> Self {
        self.xtol = xtol;
        self.ftol = ftol;
        self
    }

    /// Set the iteration and evaluation budget.
    pub fn with_budget(mut self, max_iterations: usize, max_evaluations: usize) -> Self {
        self.max_iterations = max_iterations;
        self.max_evaluations = max_evaluations;
        self
    }

    /// Set the initial edge used for zero guess components.
    pub fn with_initial_step(mut self, step: f64) -> Self {
        self.initial_step = step;
        self
    }

    /// Enable or disable the single restart after convergence.
    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    /// Check that tolerances, budgets, and step are usable.
    ///
    /// # Errors
    /// Returns `InvalidParameter` naming the offending option.
    pub fn validate(&self) -> Result<()> {
        if !(self.xtol.is_finite() && self.xtol >= 0.0) {
            return Err(invalid("xtol", format!("must be finite and >= 0, got {}", self.xtol)));
        }
        if !(self.ftol.is_finite() && self.ftol >= 0.0) {
            return Err(invalid("ftol", format!("must be finite and >= 0, got {}", self.ftol)));
        }
        if self.max_iterations == 0 || self.max_evaluations == 0 {
            return Err(invalid(
                "simplex budget",
                "iterations and evaluations must be > 0".to_string(),
            ));
        }
        if !(self.initial_step.is_finite() && self.initial_step > 0.0) {
            return Err(invalid(
                "initial step",
                format!("must be finite and > 0, got {}", self.initial_step),
            ));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: String) -> SlipError {
    SlipError::InvalidParameter { name, reason }
}

/// Seeded random restarts around the initial guess.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiStart {
    /// Number of additional starts after the one at the guess.
    pub starts: usize,
    /// Half-width of the uniform box the extra starts are drawn from.
    pub radius: f64,
    /// Seed of the generator drawing the start offsets.
    pub seed: u64,
}

/// Result of a simplex search.
#[derive(Debug, Clone)]
pub struct SimplexOutcome {
    /// Best parameter vector found.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub value: f64,
    /// Iterations performed across all searches.
    pub iterations: usize,
    /// Objective evaluations performed across all searches.
    pub evaluations: usize,
    /// Whether the search that produced `x` met the tolerances.
    pub converged: bool,
}

struct Vertex {
    x: Vec<f64>,
    f: f64,
}

/// Running totals shared by consecutive searches.
#[derive(Default)]
struct Budget {
    iterations: usize,
    evaluations: usize,
}

struct Search<'o, F> {
    objective: F,
    options: &'o SimplexOptions,
    budget: Budget,
}

impl<F> Search<'_, F>
where
    F: FnMut(&[f64]) -> Result<f64>,
{
    fn eval(&mut self, x: Vec<f64>) -> Result<Vertex> {
        self.budget.evaluations += 1;
        let f = (self.objective)(&x)?;
        // NaN never wins a comparison.
        let f = if f.is_nan() { f64::INFINITY } else { f };
        Ok(Vertex { x, f })
    }

    fn exhausted(&self) -> bool {
        self.budget.iterations >= self.options.max_iterations
            || self.budget.evaluations >= self.options.max_evaluations
    }

    fn converged(&self, simplex: &[Vertex]) -> bool {
        let best = &simplex[0];
        simplex[1..].iter().all(|v| {
            (v.f - best.f).abs() <= self.options.ftol
                && v
                    .x
                    .iter()
                    .zip(&best.x)
                    .all(|(a, b)| (a - b).abs() <= self.options.xtol)
        })
    }

    fn initial_simplex(&mut self, start: &[f64]) -> Result<Vec<Vertex>> {
        let mut simplex = Vec::with_capacity(start.len() + 1);
        simplex.push(self.eval(start.to_vec())?);
        for i in 0..start.len() {
            let mut x = start.to_vec();
            x[i] = if x[i] != 0.0 {
                x[i] * (1.0 + RELATIVE_STEP)
            } else {
                self.options.initial_step
            };
            simplex.push(self.eval(x)?);
        }
        Ok(simplex)
    }

    /// One Nelder-Mead descent from `start`; returns the best vertex and whether it converged.
    fn descend(&mut self, start: &[f64]) -> Result<(Vertex, bool)> {
        let n = start.len();
        let mut simplex = self.initial_simplex(start)?;

        loop {
            simplex.sort_by(|a, b| a.f.total_cmp(&b.f));
            if self.converged(&simplex) {
                return Ok((simplex.swap_remove(0), true));
            }
            if self.exhausted() {
                return Ok((simplex.swap_remove(0), false));
            }
            self.budget.iterations += 1;

            let mut centroid = vec![0.0; n];
            for v in &simplex[..n] {
                for (c, x) in centroid.iter_mut().zip(&v.x) {
                    *c += x / n as f64;
                }
            }
            let worst_f = simplex[n].f;
            let toward = |coef: f64, from: &[f64]| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(from)
                    .map(|(c, w)| c + coef * (c - w))
                    .collect()
            };

            let reflected = self.eval(toward(REFLECTION, &simplex[n].x))?;
            if reflected.f < simplex[0].f {
                let expanded = self.eval(toward(REFLECTION * EXPANSION, &simplex[n].x))?;
                simplex[n] = if expanded.f < reflected.f {
                    expanded
                } else {
                    reflected
                };
                continue;
            }
            if reflected.f < simplex[n - 1].f {
                simplex[n] = reflected;
                continue;
            }

            let contracted = if reflected.f < worst_f {
                let outside = self.eval(toward(REFLECTION * CONTRACTION, &simplex[n].x))?;
                (outside.f <= reflected.f).then_some(outside)
            } else {
                let inside = self.eval(toward(-CONTRACTION, &simplex[n].x))?;
                (inside.f < worst_f).then_some(inside)
            };
            if let Some(v) = contracted {
                simplex[n] = v;
                continue;
            }

            let best = simplex[0].x.clone();
            for i in 1..=n {
                let x: Vec<f64> = best
                    .iter()
                    .zip(&simplex[i].x)
                    .map(|(b, x)| b + SHRINK * (x - b))
                    .collect();
                simplex[i] = self.eval(x)?;
            }
        }
    }

    fn run(&mut self, guess: &[f64]) -> Result<(Vertex, bool)> {
        let (best, converged) = self.descend(guess)?;
        if !(converged && self.options.restart) || self.exhausted() {
            return Ok((best, converged));
        }
        let (again, converged) = self.descend(&best.x)?;
        if again.f <= best.f {
            Ok((again, converged))
        } else {
            Ok((best, converged))
        }
    }
}

/// Minimize `objective` starting from `guess`.
///
/// The objective may fail; its error aborts the search and is returned as is.
///
/// # Errors
/// Returns `InvalidParameter` for an empty guess or invalid options, or the
/// objective's own error.
pub fn minimize<F>(objective: F, guess: &[f64], options: &SimplexOptions) -> Result<SimplexOutcome>
where
    F: FnMut(&[f64]) -> Result<f64>,
{
    minimize_multistart(objective, guess, options, None)
}

/// Minimize `objective` from `guess` and, if given, from seeded random starts around it.
///
/// Each start receives the full budget; the reported counts are totals.
///
/// # Errors
/// See [`minimize`].
pub fn minimize_multistart<F>(
    objective: F,
    guess: &[f64],
    options: &SimplexOptions,
    multi: Option<MultiStart>,
) -> Result<SimplexOutcome>
where
    F: FnMut(&[f64]) -> Result<f64>,
{
    if guess.is_empty() {
        return Err(invalid("guess", "parameter space is empty".to_string()));
    }
    if guess.iter().any(|g| !g.is_finite()) {
        return Err(invalid("guess", format!("must be finite, got {:?}", guess)));
    }
    options.validate()?;

    let mut search = Search {
        objective,
        options,
        budget: Budget::default(),
    };
    let (mut best, mut converged) = search.run(guess)?;
    let mut totals = std::mem::take(&mut search.budget);

    if let Some(multi) = multi {
        if !(multi.radius.is_finite() && multi.radius > 0.0) && multi.starts > 0 {
            return Err(invalid(
                "multi-start radius",
                format!("must be finite and > 0, got {}", multi.radius),
            ));
        }
        let mut rng = StdRng::seed_from_u64(multi.seed);
        for _ in 0..multi.starts {
            let start: Vec<f64> = guess
                .iter()
                .map(|g| g + rng.gen_range(-multi.radius..=multi.radius))
                .collect();
            let (candidate, ok) = search.run(&start)?;
            totals.iterations += search.budget.iterations;
            totals.evaluations += search.budget.evaluations;
            search.budget = Budget::default();
            if candidate.f < best.f {
                best = candidate;
                converged = ok;
            }
        }
    }

    Ok(SimplexOutcome {
        x: best.x,
        value: best.f,
        iterations: totals.iterations,
        evaluations: totals.evaluations,
        converged,
    })
}
