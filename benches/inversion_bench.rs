// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use fault_slip::bootstrap::{BootstrapConfig, BootstrapEngine};
use fault_slip::core::{PointSet, ShearAngle, SlipVector};
use fault_slip::inversion::{invert_slip_on, InversionOptions};
use fault_slip::kinematics::FaultSurface;

fn dome_fault(n: usize) -> PointSet {
    let step = 4000.0 / (n - 1) as f64;
    let mut pts = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let x = -1500.0 + step * i as f64;
            let y = -1500.0 + step * j as f64;
            let r2 = (x - 500.0).powi(2) + (y - 500.0).powi(2);
            pts.push([x, y, -120.0 + 80.0 * (-r2 / (2.0 * 400.0 * 400.0)).exp()]);
        }
    }
    PointSet::new(pts)
}

fn flat_horizon(n: usize) -> PointSet {
    let step = 1000.0 / (n - 1) as f64;
    let mut pts = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            pts.push([step * i as f64, step * j as f64, 0.0]);
        }
    }
    PointSet::new(pts)
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Fault triangulation for increasing point counts.
fn bench_triangulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("triangulation");
    for &n in &[21, 41, 81] {
        let fault = dome_fault(n);
        group.bench_function(format!("{}x{}", n, n), |b| {
            b.iter(|| black_box(FaultSurface::new(&fault).unwrap()));
        });
    }
    group.finish();
}

/// One forward transform of a 41x41 horizon.
fn bench_forward(c: &mut Criterion) {
    let surface = FaultSurface::new(&dome_fault(41)).unwrap();
    let horizon = flat_horizon(41);
    let alpha = ShearAngle::new(30.0).unwrap();
    c.bench_function("inclined_shear_41x41", |b| {
        b.iter(|| {
            black_box(surface.inclined_shear(&horizon, SlipVector::new(120.0, -35.0), alpha, false))
        });
    });
}

/// A single unconstrained inversion.
fn bench_inversion(c: &mut Criterion) {
    let surface = FaultSurface::new(&dome_fault(21)).unwrap();
    let alpha = ShearAngle::new(30.0).unwrap();
    let truth = SlipVector::new(120.0, -35.0);
    let deformed = surface.inclined_shear(&flat_horizon(11), truth, alpha, false);
    let options = InversionOptions::default();
    c.bench_function("invert_slip_21x21_fault", |b| {
        b.iter(|| black_box(invert_slip_on(&surface, &deformed, alpha, &options).unwrap()));
    });
}

/// Bootstrap thread scaling: 32 trials with varying pool sizes.
fn bench_bootstrap_scaling(c: &mut Criterion) {
    let cpus = num_cpus();
    let fault = dome_fault(21);
    let surface = FaultSurface::new(&fault).unwrap();
    let alpha = ShearAngle::vertical();
    let truth = SlipVector::new(60.0, 20.0);
    let deformed = surface.inclined_shear(&flat_horizon(11), truth, alpha, false);

    let mut group = c.benchmark_group("bootstrap_32_trials");
    group.sample_size(10);
    for &threads in &[1, 2, 4, 8] {
        if threads <= cpus {
            group.bench_function(format!("{}threads", threads), |b| {
                b.iter(|| {
                    let config = BootstrapConfig::new(32, 60.0).with_seed(1).with_threads(threads);
                    let engine = BootstrapEngine::new(&fault, &deformed, alpha, config).unwrap();
                    black_box(engine.run().unwrap())
                });
            });
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_triangulation,
    bench_forward,
    bench_inversion,
    bench_bootstrap_scaling,
);
criterion_main!(benches);
