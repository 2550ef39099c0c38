// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Bootstrap estimation of slip uncertainty.
//!
//! Each trial resamples the fault and horizon with its own seed and inverts
//! the resampled pair. Trials run on a dedicated rayon pool; results are
//! collected in trial order, so a given seed sequence always yields the same
//! output regardless of the number of worker threads.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::core::{DirectionConstraint, PointSet, ShearAngle, SlipVector};
use crate::error::{Result, SlipError};
use crate::inversion::{invert_slip, InversionOptions};
use crate::kinematics::FaultSurface;
use crate::roughness::MIN_PLANE_POINTS;
use crate::simplex::SimplexOptions;
use crate::stats::{OutlierRule, SlipSummary};

/// Progress information passed to the optional callback.
#[derive(Debug, Clone, Copy)]
pub struct ProgressInfo {
    /// Number of trials finished so far, failed ones included.
    pub trials_completed: usize,
    /// Number of finished trials that failed.
    pub trials_failed: usize,
    /// Total number of trials in the batch.
    pub total_trials: usize,
    /// Elapsed time since the batch started.
    pub elapsed: Duration,
}

/// Minimum interval between two progress callbacks.
const PROGRESS_INTERVAL_MS: u64 = 500;

/// Per-trial seeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSequence {
    /// Trial `i` uses a seed derived from this base seed and `i`.
    Base(u64),
    /// Trial `i` uses element `i`; the length must equal the trial count.
    Explicit(Vec<u64>),
}

impl SeedSequence {
    /// Seed of trial `index`, or `None` for an empty explicit list.
    ///
    /// For an explicit list, indices past its end wrap around.
    pub fn seed(&self, index: usize) -> Option<u64> {
        match self {
            SeedSequence::Base(base) => {
                let offset = (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                Some(splitmix64(base.wrapping_add(offset)))
            }
            SeedSequence::Explicit(seeds) => seeds.get(index.checked_rem(seeds.len())?).copied(),
        }
    }

    /// The first `trials` seeds; empty for an empty explicit list.
    pub fn take(&self, trials: usize) -> Vec<u64> {
        (0..trials).map_while(|i| self.seed(i)).collect()
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// How the down-dip azimuth constrains each trial's inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DipConstraint {
    /// Search both axes, each scaled by the matching down-dip component.
    #[default]
    Scaled,
    /// Search only along the down-dip direction.
    Fixed,
}

impl DipConstraint {
    /// The search constraint for a down-dip compass azimuth.
    pub fn constraint(self, down_dip_azimuth: f64) -> DirectionConstraint {
        match self {
            DipConstraint::Scaled => DirectionConstraint::per_axis_from_azimuth(down_dip_azimuth),
            DipConstraint::Fixed => DirectionConstraint::from_azimuth(down_dip_azimuth),
        }
    }
}

/// Configuration for a bootstrap batch.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Number of trials.
    pub trials: usize,
    /// Horizon points drawn per trial; `None` uses the horizon size.
    pub horizon_samples: Option<usize>,
    /// Worker threads; `None` uses the available parallelism.
    pub threads: Option<usize>,
    /// Per-trial seeds.
    pub seeds: SeedSequence,
    /// Compass azimuth of the fault's down-dip direction, in degrees.
    pub down_dip_azimuth: f64,
    /// Length of the initial guess along the down-dip direction.
    pub nudge: f64,
    /// How the down-dip direction constrains the search.
    pub dip_constraint: DipConstraint,
    /// Overlap threshold passed to each inversion.
    pub overlap_thresh: f64,
    /// Simplex options passed to each inversion.
    pub simplex: SimplexOptions,
}

impl BootstrapConfig {
    /// Configuration with `trials` trials for a fault dipping toward `down_dip_azimuth`.
    ///
    /// Defaults: full-size horizon resamples, all cores, base seed 0, nudge 1.0,
    /// scaled dip constraint, full overlap required.
    pub fn new(trials: usize, down_dip_azimuth: f64) -> Self {
        BootstrapConfig {
            trials,
            horizon_samples: None,
            threads: None,
            seeds: SeedSequence::Base(0),
            down_dip_azimuth,
            nudge: 1.0,
            dip_constraint: DipConstraint::Scaled,
            overlap_thresh: 1.0,
            simplex: SimplexOptions::default(),
        }
    }

    /// Set the number of horizon points drawn per trial (builder method).
    pub fn with_horizon_samples(mut self, samples: usize) -> Self {
        self.horizon_samples = Some(samples);
        self
    }

    /// Set the number of worker threads (builder method).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Derive per-trial seeds from `seed` (builder method).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seeds = SeedSequence::Base(seed);
        self
    }

    /// Use one explicit seed per trial (builder method).
    pub fn with_seeds(mut self, seeds: Vec<u64>) -> Self {
        self.seeds = SeedSequence::Explicit(seeds);
        self
    }

    /// Set the initial guess length along down-dip (builder method).
    pub fn with_nudge(mut self, nudge: f64) -> Self {
        self.nudge = nudge;
        self
    }

    /// Set how the down-dip direction constrains the search (builder method).
    pub fn with_dip_constraint(mut self, dip_constraint: DipConstraint) -> Self {
        self.dip_constraint = dip_constraint;
        self
    }

    /// Override the overlap threshold (builder method).
    pub fn with_overlap_thresh(mut self, overlap_thresh: f64) -> Self {
        self.overlap_thresh = overlap_thresh;
        self
    }

    /// Replace the simplex options (builder method).
    pub fn with_simplex(mut self, simplex: SimplexOptions) -> Self {
        self.simplex = simplex;
        self
    }

    fn num_threads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Inversion options shared by every trial.
    fn inversion_options(&self) -> InversionOptions {
        InversionOptions::default()
            .with_guess(SlipVector::from_azimuth(self.down_dip_azimuth, self.nudge))
            .with_constraint(self.dip_constraint.constraint(self.down_dip_azimuth))
            .with_overlap_thresh(self.overlap_thresh)
            .with_simplex(self.simplex.clone())
    }

    fn validate(&self) -> Result<()> {
        let invalid =
            |name: &'static str, reason: String| SlipError::InvalidParameter { name, reason };
        if self.trials == 0 {
            return Err(invalid("trial count", "must be > 0".to_string()));
        }
        if self.threads == Some(0) {
            return Err(invalid("thread count", "must be > 0".to_string()));
        }
        if let Some(m) = self.horizon_samples {
            if m < MIN_PLANE_POINTS {
                return Err(invalid(
                    "horizon sample count",
                    format!("{} (must be at least {})", m, MIN_PLANE_POINTS),
                ));
            }
        }
        if let SeedSequence::Explicit(seeds) = &self.seeds {
            if seeds.len() != self.trials {
                return Err(invalid(
                    "seed sequence",
                    format!("{} seeds for {} trials", seeds.len(), self.trials),
                ));
            }
        }
        if !self.down_dip_azimuth.is_finite() {
            return Err(invalid("down-dip azimuth", format!("{}", self.down_dip_azimuth)));
        }
        if !self.nudge.is_finite() || self.nudge == 0.0 {
            return Err(invalid("nudge", format!("{} (must be finite and non-zero)", self.nudge)));
        }
        self.inversion_options().validate()
    }
}

/// One trial's inverted slip and the roughness it achieved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapSample {
    /// Inverted slip.
    pub slip: SlipVector,
    /// Roughness of the restored resampled horizon.
    pub roughness: f64,
}

/// What became of one trial.
#[derive(Debug)]
pub enum TrialOutcome<T = BootstrapSample> {
    /// The trial produced a value.
    Completed(T),
    /// The trial failed; the batch carried on without it.
    Failed(SlipError),
    /// The batch was cancelled before the trial started.
    Cancelled,
}

impl<T> TrialOutcome<T> {
    /// The completed value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            TrialOutcome::Completed(v) => Some(v),
            _ => None,
        }
    }
}

/// Outcomes of a bootstrap batch, indexed by trial.
#[derive(Debug)]
pub struct BootstrapResult {
    /// Shear angle used for every trial.
    pub alpha: ShearAngle,
    /// One outcome per trial, in trial order.
    pub outcomes: Vec<TrialOutcome>,
}

impl BootstrapResult {
    /// Valid samples in trial order.
    pub fn samples(&self) -> Vec<BootstrapSample> {
        self.outcomes.iter().filter_map(|o| o.value().copied()).collect()
    }

    /// Number of trials that failed or were cancelled.
    pub fn discarded(&self) -> usize {
        self.outcomes.len() - self.outcomes.iter().filter(|o| o.value().is_some()).count()
    }

    /// Number of trials cancelled before they started.
    pub fn cancelled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TrialOutcome::Cancelled))
            .count()
    }

    /// Mean and covariance of the valid samples after outlier rejection.
    ///
    /// # Errors
    /// See [`SlipSummary::from_samples`].
    pub fn summary(&self, rule: &OutlierRule) -> Result<SlipSummary> {
        SlipSummary::from_samples(&self.samples(), rule)
    }
}

/// Run `task` once per seed on a pool of `threads` workers.
///
/// Outcomes are returned in seed order. A failing task is recorded as
/// [`TrialOutcome::Failed`] and does not stop the others. Once `cancel` is
/// set, tasks that have not started yet are recorded as
/// [`TrialOutcome::Cancelled`]. The progress callback, if any, is invoked at
/// most every 500 ms and once more when the batch ends.
///
/// # Errors
/// Returns an error only if the thread pool cannot be built.
pub fn parallel_trials<T, F>(
    seeds: &[u64],
    threads: usize,
    cancel: Option<&AtomicBool>,
    progress: Option<&(dyn Fn(ProgressInfo) + Sync)>,
    task: F,
) -> Result<Vec<TrialOutcome<T>>>
where
    T: Send,
    F: Fn(u64) -> Result<T> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| SlipError::Other(e.to_string()))?;

    let total_trials = seeds.len();
    let completed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start_time = Instant::now();
    let last_progress = AtomicU64::new(0);

    let outcomes = pool.install(|| {
        seeds
            .par_iter()
            .map(|&seed| {
                if cancel.is_some_and(|c| c.load(Ordering::Acquire)) {
                    return TrialOutcome::Cancelled;
                }
                let outcome = match task(seed) {
                    Ok(v) => TrialOutcome::Completed(v),
                    Err(e) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        TrialOutcome::Failed(e)
                    }
                };
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;

                if let Some(cb) = progress {
                    let elapsed_ms = start_time.elapsed().as_millis() as u64;
                    let last = last_progress.load(Ordering::Relaxed);
                    if elapsed_ms >= last + PROGRESS_INTERVAL_MS
                        && last_progress
                            .compare_exchange(
                                last,
                                elapsed_ms,
                                Ordering::Relaxed,
                                Ordering::Relaxed,
                            )
                            .is_ok()
                    {
                        cb(ProgressInfo {
                            trials_completed: done,
                            trials_failed: failed.load(Ordering::Relaxed),
                            total_trials,
                            elapsed: start_time.elapsed(),
                        });
                    }
                }
                outcome
            })
            .collect::<Vec<_>>()
    });

    if let Some(cb) = progress {
        cb(ProgressInfo {
            trials_completed: completed.load(Ordering::Relaxed),
            trials_failed: failed.load(Ordering::Relaxed),
            total_trials,
            elapsed: start_time.elapsed(),
        });
    }

    Ok(outcomes)
}

/// Draws resampled inputs and inverts them, one trial per seed.
///
/// The fault and horizon are borrowed by every worker; only the per-trial
/// resamples are allocated.
pub struct BootstrapEngine<'a> {
    fault: &'a PointSet,
    horizon: &'a PointSet,
    alpha: ShearAngle,
    config: BootstrapConfig,
    cancel: Option<&'a AtomicBool>,
    progress_callback: Option<Box<dyn Fn(ProgressInfo) + Send + Sync>>,
}

impl<'a> BootstrapEngine<'a> {
    /// Create an engine for one fault/horizon pair.
    ///
    /// # Parameters
    /// - `fault`: fault surface points, resampled with replacement per trial
    /// - `horizon`: deformed horizon points
    /// - `alpha`: shear angle used by every trial
    /// - `config`: batch configuration
    ///
    /// # Errors
    /// Returns `InvalidParameter` for an invalid configuration.
    pub fn new(
        fault: &'a PointSet,
        horizon: &'a PointSet,
        alpha: ShearAngle,
        config: BootstrapConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(BootstrapEngine {
            fault,
            horizon,
            alpha,
            config,
            cancel: None,
            progress_callback: None,
        })
    }

    /// Abort the batch when `flag` becomes true (builder method).
    ///
    /// Trials already running finish; the rest are recorded as cancelled.
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Set a progress callback invoked roughly every 500ms (builder method).
    pub fn with_progress(mut self, callback: Box<dyn Fn(ProgressInfo) + Send + Sync>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// The batch configuration.
    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Run every trial.
    ///
    /// # Errors
    /// Returns `InvalidGeometry` if the full fault is degenerate,
    /// `InsufficientPoints` if the horizon has fewer than 3 finite rows, and
    /// `AllTrialsFailed` if no trial produced a sample.
    pub fn run(&self) -> Result<BootstrapResult> {
        FaultSurface::new(self.fault)?;
        let finite = self.horizon.finite_count();
        if finite < MIN_PLANE_POINTS {
            return Err(SlipError::InsufficientPoints {
                required: MIN_PLANE_POINTS,
                found: finite,
            });
        }

        let options = self.config.inversion_options();
        let seeds = self.config.seeds.take(self.config.trials);
        let threads = self.config.num_threads();
        info!(
            trials = self.config.trials,
            threads,
            alpha = self.alpha.degrees(),
            "starting bootstrap"
        );

        let progress = self
            .progress_callback
            .as_deref()
            .map(|cb| cb as &(dyn Fn(ProgressInfo) + Sync));
        let outcomes = parallel_trials(&seeds, threads, self.cancel, progress, |seed| {
            self.trial(seed, &options)
        })?;

        let result = BootstrapResult {
            alpha: self.alpha,
            outcomes,
        };
        let discarded = result.discarded();
        if discarded == result.outcomes.len() {
            return Err(SlipError::AllTrialsFailed {
                trials: self.config.trials,
            });
        }
        if discarded > 0 {
            warn!(
                discarded,
                cancelled = result.cancelled(),
                trials = self.config.trials,
                "bootstrap trials discarded"
            );
        }
        info!(
            samples = result.outcomes.len() - discarded,
            "bootstrap finished"
        );
        Ok(result)
    }

    /// Resample both inputs with `seed` and invert.
    fn trial(&self, seed: u64, options: &InversionOptions) -> Result<BootstrapSample> {
        let mut rng = StdRng::seed_from_u64(seed);

        let n = self.fault.len();
        let fault_idx: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

        let len = self.horizon.len();
        let m = self.config.horizon_samples.unwrap_or(len);
        let horizon_idx: Vec<usize> = if m >= len {
            (0..m).map(|_| rng.gen_range(0..len)).collect()
        } else {
            rand::seq::index::sample(&mut rng, len, m).into_vec()
        };

        let fault = self.fault.select(&fault_idx);
        let horizon = self.horizon.select(&horizon_idx);
        let inv = invert_slip(&fault, &horizon, self.alpha, options)?;
        Ok(BootstrapSample {
            slip: inv.slip,
            roughness: inv.roughness,
        })
    }
}
