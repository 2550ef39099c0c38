// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use fault_slip::bootstrap::{BootstrapConfig, BootstrapEngine, BootstrapSample, TrialOutcome};
use fault_slip::core::{PointSet, ShearAngle, SlipVector};
use fault_slip::error::SlipError;
use fault_slip::inversion::{invert_slip, invert_slip_on, InversionOptions, SlipObjective};
use fault_slip::io::{BootstrapArchive, HorizonRecord};
use fault_slip::kinematics::{inclined_shear, FaultSurface};
use fault_slip::roughness::planar_variance;
use fault_slip::stats::{OutlierRule, SlipSummary};

/// Dome-shaped fault sampled on a 21x21 grid spanning [-1500, 2500]^2.
/// A planar fault leaves a planar horizon planar for every slip, so the
/// curvature is what makes the slip identifiable.
fn dome_fault() -> PointSet {
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

/// Flat horizon at z=0 on an 11x11 grid over [x0, x0+1000] x [0, 1000].
fn flat_horizon(x0: f64) -> PointSet {
    let mut pts = Vec::new();
    for i in 0..=10 {
        for j in 0..=10 {
            pts.push([x0 + 100.0 * i as f64, 100.0 * j as f64, 0.0]);
        }
    }
    PointSet::new(pts)
}

fn sample(dx: f64, dy: f64) -> BootstrapSample {
    BootstrapSample {
        slip: SlipVector::new(dx, dy),
        roughness: 0.0,
    }
}

/// Test 1: Round trip
/// Shear a flat horizon by a known slip, then invert. Recovers the slip to
/// 1e-3 of its magnitude for shear angles across [-80, 80] and several magnitudes.
#[test]
fn round_trip_recovers_applied_slip() {
    let fault = dome_fault();
    let surface = FaultSurface::new(&fault).unwrap();
    let horizon = flat_horizon(0.0);
    let slips = [
        SlipVector::new(100.0, 0.0),
        SlipVector::new(-60.0, 120.0),
        SlipVector::new(150.0, -40.0),
    ];

    for &deg in &[-80.0, -70.0, -60.0, -30.0, 0.0, 30.0, 60.0, 70.0, 80.0] {
        let alpha = ShearAngle::new(deg).unwrap();
        for &truth in &slips {
            let deformed = surface.inclined_shear(&horizon, truth, alpha, false);
            let inv = invert_slip_on(&surface, &deformed, alpha, &InversionOptions::default())
                .unwrap();
            let err = ((inv.slip.dx - truth.dx).powi(2) + (inv.slip.dy - truth.dy).powi(2)).sqrt();
            assert!(
                err <= 1e-3 * truth.magnitude(),
                "alpha={} truth={:?} got={:?} err={}",
                deg,
                truth,
                inv.slip,
                err
            );
        }
    }
}

/// Test 2: Concrete scenario
/// True slip (150, -40) under 70 degree inclined shear, zero initial guess.
#[test]
fn concrete_scenario_alpha_70() {
    let fault = dome_fault();
    let horizon = flat_horizon(0.0);
    let alpha = ShearAngle::new(70.0).unwrap();
    let truth = SlipVector::new(150.0, -40.0);

    let deformed = inclined_shear(&fault, &horizon, truth, alpha, false).unwrap();
    let inv = invert_slip(&fault, &deformed, alpha, &InversionOptions::default()).unwrap();

    assert!((inv.slip.dx - 150.0).abs() < 1.0, "slip {:?}", inv.slip);
    assert!((inv.slip.dy + 40.0).abs() < 1.0, "slip {:?}", inv.slip);
    assert!(inv.roughness < 1e-6, "roughness {}", inv.roughness);
    assert!(inv.converged);
}

/// Test 3: Zero slip is the identity for any shear angle.
#[test]
fn zero_slip_is_identity() {
    let fault = dome_fault();
    // Non-flat input and a NaN row, both passed through untouched.
    let horizon: PointSet = flat_horizon(0.0)
        .iter()
        .map(|p| [p[0], p[1], 0.01 * p[0] - 0.02 * p[1]])
        .chain(std::iter::once([f64::NAN, 0.0, 0.0]))
        .collect();

    for &deg in &[-80.0, -45.0, 0.0, 45.0, 80.0] {
        let alpha = ShearAngle::new(deg).unwrap();
        let out = inclined_shear(&fault, &horizon, SlipVector::zero(), alpha, false).unwrap();
        assert_eq!(out.len(), horizon.len());
        for (a, b) in horizon.iter().zip(out.iter()) {
            if a[0].is_nan() {
                assert!(b[0].is_nan());
                continue;
            }
            for d in 0..3 {
                assert!((a[d] - b[d]).abs() < 1e-9, "alpha={} {:?} -> {:?}", deg, a, b);
            }
        }
    }
}

/// Test 4: Roughness grows with non-planar noise.
#[test]
fn roughness_is_monotone_in_noise() {
    let base: Vec<[f64; 3]> = flat_horizon(0.0)
        .iter()
        .map(|p| [p[0], p[1], 5.0 + 0.1 * p[0] + 0.05 * p[1]])
        .collect();
    let noise = |x: f64, y: f64| (x * 0.0137).sin() * (y * 0.0091).cos();

    let mut previous = -1.0;
    for &k in &[0.0, 0.5, 1.0, 2.0, 4.0] {
        let pts: PointSet = base
            .iter()
            .map(|p| [p[0], p[1], p[2] + k * noise(p[0], p[1])])
            .collect();
        let r = planar_variance(&pts).unwrap();
        assert!(r >= previous, "k={} roughness {} < {}", k, r, previous);
        previous = r;
    }

    let plane: PointSet = base.clone().into();
    assert!(planar_variance(&plane).unwrap() < 1e-9);
}

/// Test 5: Outlier rejection
/// 100 tightly clustered samples around (100, -50) plus 5 extreme ones.
#[test]
fn outliers_are_rejected() {
    let mut samples = Vec::new();
    for i in 0..10 {
        for j in 0..10 {
            let ox = -0.9 + 0.2 * i as f64;
            let oy = -0.9 + 0.2 * j as f64;
            samples.push(sample(100.0 + ox, -50.0 + oy));
        }
    }
    for &(dx, dy) in &[
        (600.0, -50.0),
        (-400.0, -50.0),
        (100.0, 450.0),
        (100.0, -550.0),
        (900.0, 900.0),
    ] {
        samples.push(sample(dx, dy));
    }

    let summary = SlipSummary::from_samples(&samples, &OutlierRule::default()).unwrap();
    assert_eq!(summary.rejected(), 5);
    assert_eq!(summary.kept, 100);
    assert!(summary.outliers[100..].iter().all(|&o| o));
    assert!(summary.outliers[..100].iter().all(|&o| !o));
    assert!((summary.mean.dx - 100.0).abs() < 1.0);
    assert!((summary.mean.dy + 50.0).abs() < 0.5);
}

/// Test 6: Overlap enforcement
/// A horizon wider than the fault never fully maps onto it.
#[test]
fn overlap_threshold_is_enforced() {
    let fault = dome_fault();
    let mut pts = Vec::new();
    for i in 0..=20 {
        for j in 0..=10 {
            pts.push([-2000.0 + 250.0 * i as f64, 100.0 * j as f64, 0.0]);
        }
    }
    let horizon = PointSet::new(pts);
    let alpha = ShearAngle::vertical();

    let strict = invert_slip(&fault, &horizon, alpha, &InversionOptions::default());
    assert!(matches!(strict, Err(SlipError::NonConvergent { .. })));

    let opts = InversionOptions::default().with_overlap_thresh(0.5);
    let inv = invert_slip(&fault, &horizon, alpha, &opts).unwrap();
    let surface = FaultSurface::new(&fault).unwrap();
    let mut objective = SlipObjective::new(&surface, &horizon, alpha, 0.5).unwrap();
    assert!(objective.overlap(inv.slip) >= 0.5);
}

/// Test 7: Reproducibility across pool sizes
/// Same seeds with 1 and 8 workers give bit-identical per-trial output.
#[test]
fn bootstrap_is_reproducible_across_threads() {
    let fault = dome_fault();
    let surface = FaultSurface::new(&fault).unwrap();
    let deformed = surface.inclined_shear(
        &flat_horizon(0.0),
        SlipVector::new(60.0, 20.0),
        ShearAngle::vertical(),
        false,
    );

    let run = |threads: usize| {
        let config = BootstrapConfig::new(8, 60.0)
            .with_seed(2026)
            .with_horizon_samples(60)
            .with_threads(threads);
        BootstrapEngine::new(&fault, &deformed, ShearAngle::vertical(), config)
            .unwrap()
            .run()
            .unwrap()
    };

    let one = run(1);
    let eight = run(8);
    assert_eq!(one.outcomes.len(), 8);
    assert_eq!(eight.outcomes.len(), 8);
    for (i, (a, b)) in one.outcomes.iter().zip(eight.outcomes.iter()).enumerate() {
        match (a, b) {
            (TrialOutcome::Completed(x), TrialOutcome::Completed(y)) => {
                assert_eq!(x.slip.dx.to_bits(), y.slip.dx.to_bits(), "trial {}", i);
                assert_eq!(x.slip.dy.to_bits(), y.slip.dy.to_bits(), "trial {}", i);
                assert_eq!(x.roughness.to_bits(), y.roughness.to_bits(), "trial {}", i);
            }
            (TrialOutcome::Failed(_), TrialOutcome::Failed(_)) => {}
            _ => panic!("trial {} differs: {:?} vs {:?}", i, a, b),
        }
    }
}

/// Test 8: A batch where no trial can succeed is reported as such.
#[test]
fn all_trials_failed_is_reported() {
    let fault = dome_fault();
    let horizon = flat_horizon(20_000.0);
    let config = BootstrapConfig::new(4, 60.0).with_seed(1).with_threads(2);
    let result = BootstrapEngine::new(&fault, &horizon, ShearAngle::vertical(), config)
        .unwrap()
        .run();
    assert!(matches!(result, Err(SlipError::AllTrialsFailed { trials: 4 })));
}

/// Test 9: Bootstrap output survives a save/load cycle in both archive layouts.
#[test]
fn bootstrap_archive_round_trip() {
    let fault = dome_fault();
    let surface = FaultSurface::new(&fault).unwrap();
    let alpha = ShearAngle::new(30.0).unwrap();
    let truth = SlipVector::new(80.0, -20.0);
    let deformed = surface.inclined_shear(&flat_horizon(0.0), truth, alpha, false);
    let config = BootstrapConfig::new(4, 60.0).with_seed(7).with_threads(2);
    let result = BootstrapEngine::new(&fault, &deformed, alpha, config)
        .unwrap()
        .run()
        .unwrap();

    let mut archive = BootstrapArchive::new(alpha.degrees());
    archive
        .push(HorizonRecord::from_result("top", &result).unwrap())
        .unwrap();
    archive
        .push(HorizonRecord::new("base", &[sample(1.0, 2.0), sample(3.0, 4.0)]).unwrap())
        .unwrap();

    let dir = std::env::temp_dir();
    let mat_path = dir.join("fault_slip_verification_archive.mat");
    archive.save(&mat_path).unwrap();
    let from_mat = BootstrapArchive::load(&mat_path).unwrap();
    std::fs::remove_file(&mat_path).ok();
    assert_eq!(from_mat, archive);

    let npy_dir = dir.join("fault_slip_verification_archive");
    archive.save(&npy_dir).unwrap();
    let from_dir = BootstrapArchive::load(&npy_dir).unwrap();
    std::fs::remove_dir_all(&npy_dir).ok();
    assert_eq!(from_dir.alpha, archive.alpha);
    for record in &archive.horizons {
        assert_eq!(from_dir.get(&record.name), Some(record));
    }
    assert_eq!(from_mat.get("top").unwrap().samples(), result.samples());
}
