// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fault_slip::bootstrap::{BootstrapConfig, BootstrapEngine, DipConstraint, ProgressInfo};
use fault_slip::core::{DirectionConstraint, ShearAngle, SlipVector};
use fault_slip::inversion::{
    alpha_grid, best_alpha, invert_slip_on, misfit_grid, restore_sequence, scan_shear_angles,
    InversionOptions, SlipObjective,
};
use fault_slip::io::{self, BootstrapArchive, HorizonRecord};
use fault_slip::kinematics::FaultSurface;
use fault_slip::roughness::relative_roughness;
use fault_slip::stats::{OutlierRule, Projection, RejectOn, SlipSummary};
use fault_slip::PointSet;

#[derive(Parser)]
#[command(
    name = "fault-slip",
    about = "Inclined-shear slip inversion with bootstrap uncertainty"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Invert one horizon for the slip that best flattens it
    Invert {
        /// Fault points (.npy or .mat with variable `xyz`)
        #[arg(long)]
        fault: PathBuf,

        /// Deformed horizon points (.npy or .mat)
        #[arg(long)]
        horizon: PathBuf,

        /// Shear angle from vertical, degrees
        #[arg(long, allow_negative_numbers = true)]
        alpha: f64,

        /// Initial guess "dx,dy"
        #[arg(long, allow_hyphen_values = true)]
        guess: Option<String>,

        /// Minimum fraction of horizon points that must map onto the fault
        #[arg(long, default_value = "1.0")]
        overlap: f64,

        /// Restrict the slip to this compass azimuth, degrees
        #[arg(long)]
        azimuth: Option<f64>,

        /// Extra seeded random starts around the guess
        #[arg(long, default_value = "0")]
        restarts: usize,

        /// Half-width of the box extra starts are drawn from
        #[arg(long, default_value = "100.0")]
        radius: f64,

        /// Seed for the extra starts
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Write the restored horizon here (.npy or .mat)
        #[arg(long)]
        restored: Option<PathBuf>,
    },

    /// Bootstrap slip uncertainty for one or more horizons
    Bootstrap {
        /// Fault points (.npy or .mat)
        #[arg(long)]
        fault: PathBuf,

        /// Horizon as NAME=PATH (repeatable)
        #[arg(long = "horizon", num_args = 1, required = true)]
        horizons: Vec<String>,

        /// Shear angle from vertical, degrees
        #[arg(long, allow_negative_numbers = true)]
        alpha: f64,

        /// Number of trials per horizon
        #[arg(short = 'n', long, default_value = "200")]
        trials: usize,

        /// Horizon points drawn per trial (default: all, with replacement)
        #[arg(long)]
        samples: Option<usize>,

        /// Number of Rayon worker threads
        #[arg(long)]
        threads: Option<usize>,

        /// Base seed for per-trial seeds
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Compass azimuth of the fault's down-dip direction, degrees
        #[arg(long)]
        down_dip_azimuth: f64,

        /// Search only along the down-dip direction
        #[arg(long)]
        fixed_azimuth: bool,

        /// Initial guess length along down-dip
        #[arg(long, default_value = "1.0")]
        nudge: f64,

        /// Output archive: a .mat file or a directory of .npy files
        #[arg(short = 'o', long, default_value = "bootstrap.mat")]
        output: PathBuf,

        /// Print trial progress to stderr
        #[arg(long)]
        progress: bool,
    },

    /// Summarize a bootstrap archive
    Summarize {
        /// Archive written by `bootstrap`
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Horizons to include (default: all)
        #[arg(long = "horizon", num_args = 1)]
        horizons: Vec<String>,

        /// Report projections along and across this section azimuth, degrees
        #[arg(long)]
        section_azimuth: Option<f64>,

        /// Modified z-score threshold for outliers
        #[arg(long, default_value = "3.5")]
        threshold: f64,

        /// Quantity outliers are detected on
        #[arg(long, value_enum, default_value = "slip")]
        reject_on: RejectOnArg,

        /// Also report all selected horizons pooled together
        #[arg(long)]
        pooled: bool,
    },

    /// Grid-search the shear angle that best flattens all horizons together
    FitAlpha {
        /// Fault points (.npy or .mat)
        #[arg(long)]
        fault: PathBuf,

        /// Horizon points (repeatable)
        #[arg(long = "horizon", num_args = 1, required = true)]
        horizons: Vec<PathBuf>,

        /// Smallest shear angle, degrees
        #[arg(long, default_value = "-80", allow_negative_numbers = true)]
        min: f64,

        /// Largest shear angle, degrees
        #[arg(long, default_value = "80", allow_negative_numbers = true)]
        max: f64,

        /// Shear angle step, degrees
        #[arg(long, default_value = "5")]
        step: f64,

        /// Minimum fraction of horizon points that must map onto the fault
        #[arg(long, default_value = "1.0")]
        overlap: f64,
    },

    /// Restore horizons youngest to oldest, each by all younger slips first
    Sequence {
        /// Fault points (.npy or .mat)
        #[arg(long)]
        fault: PathBuf,

        /// Horizon points, youngest first (repeatable)
        #[arg(long = "horizon", num_args = 1, required = true)]
        horizons: Vec<PathBuf>,

        /// Shear angle from vertical, degrees
        #[arg(long, allow_negative_numbers = true)]
        alpha: f64,

        /// Minimum fraction of horizon points that must map onto the fault
        #[arg(long, default_value = "1.0")]
        overlap: f64,
    },

    /// Evaluate the restoration misfit over a grid of slips
    MisfitGrid {
        /// Fault points (.npy or .mat)
        #[arg(long)]
        fault: PathBuf,

        /// Deformed horizon points (.npy or .mat)
        #[arg(long)]
        horizon: PathBuf,

        /// Shear angle from vertical, degrees
        #[arg(long, allow_negative_numbers = true)]
        alpha: f64,

        /// Grid center "dx,dy" (default: the inverted slip)
        #[arg(long, allow_hyphen_values = true)]
        center: Option<String>,

        /// Half-width of the grid in each slip component
        #[arg(long, default_value = "2000.0")]
        half_width: f64,

        /// Grid spacing
        #[arg(long, default_value = "100.0")]
        step: f64,

        /// Minimum fraction of horizon points that must map onto the fault
        #[arg(long, default_value = "0.1")]
        overlap: f64,

        /// Output file (.npy rows of dx, dy, misfit, or .mat)
        #[arg(short = 'o', long, default_value = "misfit_grid.npy")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RejectOnArg {
    Slip,
    Roughness,
}

impl From<RejectOnArg> for RejectOn {
    fn from(arg: RejectOnArg) -> Self {
        match arg {
            RejectOnArg::Slip => RejectOn::Slip,
            RejectOnArg::Roughness => RejectOn::Roughness,
        }
    }
}

fn parse_slip(flag: &str, s: &str) -> Result<SlipVector> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid --{}: expected comma-separated floats", flag))?;
    if parts.len() != 2 {
        bail!("--{} has {} components, expected 2", flag, parts.len());
    }
    Ok(SlipVector::new(parts[0], parts[1]))
}

fn parse_named_path(s: &str) -> Result<(String, PathBuf)> {
    let Some((name, path)) = s.split_once('=') else {
        bail!("invalid --horizon '{}': expected NAME=PATH", s);
    };
    io::validate_horizon_name(name)?;
    Ok((name.to_string(), PathBuf::from(path)))
}

fn load(path: &std::path::Path) -> Result<PointSet> {
    io::load_points(path).with_context(|| format!("failed to load points from {}", path.display()))
}

fn print_projection(label: &str, p: Projection) {
    println!("  {:<24} {:>12.3} +/- {:.3}", label, p.value, p.two_sigma);
}

fn print_summary(name: &str, summary: &SlipSummary, section_azimuth: Option<f64>) {
    println!(
        "{}: {} samples kept, {} outliers",
        name,
        summary.kept,
        summary.rejected()
    );
    println!(
        "  {:<24} ({:.3}, {:.3})",
        "mean slip", summary.mean.dx, summary.mean.dy
    );
    println!("  {:<24} {:>12.2}", "azimuth (deg)", summary.azimuth());
    print_projection("magnitude", summary.magnitude());
    if let Some(az) = section_azimuth {
        print_projection("along section", summary.along_azimuth(az));
        print_projection("across section", summary.across_azimuth(az));
    }
}

#[allow(clippy::too_many_arguments)]
fn run_invert(
    fault: PathBuf,
    horizon: PathBuf,
    alpha: f64,
    guess: Option<String>,
    overlap: f64,
    azimuth: Option<f64>,
    restarts: usize,
    radius: f64,
    seed: u64,
    restored: Option<PathBuf>,
) -> Result<()> {
    let alpha = ShearAngle::new(alpha)?;
    let fault = load(&fault)?;
    let horizon = load(&horizon)?;

    let mut options = InversionOptions::default().with_overlap_thresh(overlap);
    if let Some(g) = guess {
        options = options.with_guess(parse_slip("guess", &g)?);
    }
    if let Some(az) = azimuth {
        options = options.with_constraint(DirectionConstraint::from_azimuth(az));
        if options.guess.is_zero() {
            options = options.with_guess(SlipVector::from_azimuth(az, 1.0));
        }
    }
    if restarts > 0 {
        options = options.with_multi_start(restarts, radius, seed);
    }

    let surface = FaultSurface::new(&fault).context("fault surface is unusable")?;
    let inv = invert_slip_on(&surface, &horizon, alpha, &options).context("slip inversion failed")?;

    println!("slip        ({:.4}, {:.4})", inv.slip.dx, inv.slip.dy);
    println!("magnitude   {:.4}", inv.slip.magnitude());
    println!("azimuth     {:.2}", inv.slip.azimuth());
    println!("roughness   {:.6e}", inv.roughness);
    if let Some(rel) = relative_roughness(inv.roughness, &horizon)? {
        println!("relative    {:.6e}", rel);
    }
    println!(
        "search      {} iterations, {} evaluations, converged={}",
        inv.iterations, inv.evaluations, inv.converged
    );

    let mut objective = SlipObjective::new(&surface, &horizon, alpha, options.overlap_thresh)?;
    let flattened = objective.restored(inv.slip, true);
    if let Some(heave) = surface.heave(&flattened, inv.slip, alpha) {
        println!(
            "heave       ({:.4}, {:.4}), throw {:.4}",
            heave[0], heave[1], heave[2]
        );
    }
    if let Some(path) = restored {
        io::save_points(&objective.restored(inv.slip, false), &path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "restored horizon written");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_bootstrap(
    fault: PathBuf,
    horizons: Vec<String>,
    alpha: f64,
    trials: usize,
    samples: Option<usize>,
    threads: Option<usize>,
    seed: u64,
    down_dip_azimuth: f64,
    fixed_azimuth: bool,
    nudge: f64,
    output: PathBuf,
    progress: bool,
) -> Result<()> {
    let alpha = ShearAngle::new(alpha)?;
    let fault = load(&fault)?;
    let named: Vec<(String, PathBuf)> = horizons
        .iter()
        .map(|s| parse_named_path(s))
        .collect::<Result<_>>()?;

    let mut config = BootstrapConfig::new(trials, down_dip_azimuth)
        .with_seed(seed)
        .with_nudge(nudge);
    if fixed_azimuth {
        config = config.with_dip_constraint(DipConstraint::Fixed);
    }
    if let Some(m) = samples {
        config = config.with_horizon_samples(m);
    }
    if let Some(t) = threads {
        config = config.with_threads(t);
    }

    let mut archive = BootstrapArchive::new(alpha.degrees());
    for (name, path) in named {
        let horizon = load(&path)?;
        let mut engine = BootstrapEngine::new(&fault, &horizon, alpha, config.clone())?;
        if progress {
            let label = name.clone();
            engine = engine.with_progress(Box::new(move |info: ProgressInfo| {
                eprintln!(
                    "[{:.1}s] {}: {}/{} trials, {} failed",
                    info.elapsed.as_secs_f64(),
                    label,
                    info.trials_completed,
                    info.total_trials,
                    info.trials_failed,
                );
            }));
        }
        let result = engine
            .run()
            .with_context(|| format!("bootstrap failed for horizon '{}'", name))?;
        let summary = result.summary(&OutlierRule::default())?;
        println!("({} of {} trials discarded)", result.discarded(), trials);
        print_summary(&name, &summary, None);
        archive.push(HorizonRecord::from_result(&name, &result)?)?;
    }

    archive
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(path = %output.display(), "bootstrap archive written");
    Ok(())
}

fn run_summarize(
    input: PathBuf,
    horizons: Vec<String>,
    section_azimuth: Option<f64>,
    threshold: f64,
    reject_on: RejectOnArg,
    pooled: bool,
) -> Result<()> {
    let archive = BootstrapArchive::load(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let rule = OutlierRule::default()
        .with_threshold(threshold)
        .with_reject_on(reject_on.into());

    let selected: Vec<&HorizonRecord> = if horizons.is_empty() {
        archive.horizons.iter().collect()
    } else {
        horizons
            .iter()
            .map(|n| {
                archive
                    .get(n)
                    .with_context(|| format!("horizon '{}' not in archive", n))
            })
            .collect::<Result<_>>()?
    };

    println!("alpha = {:.2} deg", archive.alpha);
    let mut all = Vec::with_capacity(selected.len());
    for record in &selected {
        let samples = record.samples();
        let summary = SlipSummary::from_samples(&samples, &rule)?;
        print_summary(&record.name, &summary, section_azimuth);
        all.push(samples);
    }
    if pooled {
        let slices: Vec<&[_]> = all.iter().map(|s| s.as_slice()).collect();
        let summary = SlipSummary::pooled(&slices, &rule)?;
        print_summary("pooled", &summary, section_azimuth);
    }
    Ok(())
}

fn run_fit_alpha(
    fault: PathBuf,
    horizons: Vec<PathBuf>,
    min: f64,
    max: f64,
    step: f64,
    overlap: f64,
) -> Result<()> {
    let fault = load(&fault)?;
    let horizons: Vec<PointSet> = horizons.iter().map(|p| load(p)).collect::<Result<_>>()?;
    let alphas = alpha_grid(min, max, step)?;
    let options = InversionOptions::default().with_overlap_thresh(overlap);

    let scan = scan_shear_angles(&fault, &horizons, &alphas, &options)?;
    for entry in &scan {
        println!("{:>8.2} {:>16.6e}", entry.alpha.degrees(), entry.misfit);
    }
    match best_alpha(&scan) {
        Some(best) => println!("best alpha = {:.2} deg", best.alpha.degrees()),
        None => bail!("no shear angle produced a valid slip for every horizon"),
    }
    Ok(())
}

fn run_sequence(fault: PathBuf, horizons: Vec<PathBuf>, alpha: f64, overlap: f64) -> Result<()> {
    let alpha = ShearAngle::new(alpha)?;
    let fault = load(&fault)?;
    let horizons: Vec<PointSet> = horizons.iter().map(|p| load(p)).collect::<Result<_>>()?;
    let options = InversionOptions::default().with_overlap_thresh(overlap);

    let steps = restore_sequence(&fault, &horizons, alpha, &options)
        .context("sequential restoration failed")?;
    println!(
        "{:>4} {:>12} {:>12} {:>12} {:>12} {:>14}",
        "#", "dx", "dy", "total dx", "total dy", "relative"
    );
    for (k, step) in steps.iter().enumerate() {
        let rel = step
            .relative_roughness
            .map_or_else(|| "-".to_string(), |r| format!("{:.6e}", r));
        println!(
            "{:>4} {:>12.3} {:>12.3} {:>12.3} {:>12.3} {:>14}",
            k, step.slip.dx, step.slip.dy, step.cumulative.dx, step.cumulative.dy, rel
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_misfit_grid(
    fault: PathBuf,
    horizon: PathBuf,
    alpha: f64,
    center: Option<String>,
    half_width: f64,
    step: f64,
    overlap: f64,
    output: PathBuf,
) -> Result<()> {
    let alpha = ShearAngle::new(alpha)?;
    let fault = load(&fault)?;
    let horizon = load(&horizon)?;
    let surface = FaultSurface::new(&fault).context("fault surface is unusable")?;

    let center = match center {
        Some(c) => parse_slip("center", &c)?,
        None => {
            let options = InversionOptions::default().with_overlap_thresh(overlap);
            invert_slip_on(&surface, &horizon, alpha, &options)
                .context("slip inversion failed")?
                .slip
        }
    };
    let mut objective = SlipObjective::new(&surface, &horizon, alpha, overlap)?;
    let grid = misfit_grid(&mut objective, center, half_width, step)?;
    if let Some((best, value)) = grid.minimum() {
        println!(
            "{}x{} nodes around ({:.3}, {:.3}); lowest misfit {:.6e} at ({:.3}, {:.3})",
            grid.dx.len(),
            grid.dy.len(),
            center.dx,
            center.dy,
            value,
            best.dx,
            best.dy
        );
    }
    io::save_misfit_grid(&grid, &output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(path = %output.display(), "misfit grid written");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Invert {
            fault,
            horizon,
            alpha,
            guess,
            overlap,
            azimuth,
            restarts,
            radius,
            seed,
            restored,
        } => run_invert(
            fault, horizon, alpha, guess, overlap, azimuth, restarts, radius, seed, restored,
        ),
        Command::Bootstrap {
            fault,
            horizons,
            alpha,
            trials,
            samples,
            threads,
            seed,
            down_dip_azimuth,
            fixed_azimuth,
            nudge,
            output,
            progress,
        } => run_bootstrap(
            fault,
            horizons,
            alpha,
            trials,
            samples,
            threads,
            seed,
            down_dip_azimuth,
            fixed_azimuth,
            nudge,
            output,
            progress,
        ),
        Command::Summarize {
            input,
            horizons,
            section_azimuth,
            threshold,
            reject_on,
            pooled,
        } => run_summarize(input, horizons, section_azimuth, threshold, reject_on, pooled),
        Command::FitAlpha {
            fault,
            horizons,
            min,
            max,
            step,
            overlap,
        } => run_fit_alpha(fault, horizons, min, max, step, overlap),
        Command::Sequence {
            fault,
            horizons,
            alpha,
            overlap,
        } => run_sequence(fault, horizons, alpha, overlap),
        Command::MisfitGrid {
            fault,
            horizon,
            alpha,
            center,
            half_width,
            step,
            overlap,
            output,
        } => run_misfit_grid(
            fault, horizon, alpha, center, half_width, step, overlap, output,
        ),
    }
}
