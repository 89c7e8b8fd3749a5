//! Demo reconstruction on a synthetic phantom: forward-project a known
//! volume, then recover it with the iterative engine and report residuals.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::iproduct;
use ndarray::Array3;

use conebeam::config::log_warnings;
use conebeam::utils::{group_digits, timing::Stopwatch};
use conebeam::{
    Angles, Config, Geometry, IterationEngine, OrderStrategy, Plugins, ProgressEvent, Projector,
    RaySum, ScanMode,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Voxels per volume axis
    #[arg(long, default_value_t = 32)]
    nvoxel: usize,

    /// Number of projection angles
    #[arg(long, default_value_t = 60)]
    nangles: usize,

    /// Number of engine iterations
    #[arg(long, default_value_t = 10)]
    niter: usize,

    /// Angles per ordered-subsets block
    #[arg(long, default_value_t = 20)]
    blocksize: usize,

    /// Relaxation parameter of the data-fidelity update
    #[arg(long, default_value_t = 1.0)]
    lambda: f32,

    /// Subset ordering: ordered, random or angular_distance
    #[arg(long, default_value = "ordered")]
    strategy: String,

    /// Acquisition mode: cone or parallel
    #[arg(long, default_value = "parallel")]
    mode: String,

    /// Optional TOML configuration; command-line flags win on conflict
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_strategy(s: &str) -> Result<OrderStrategy> {
    match s {
        "ordered" => Ok(OrderStrategy::Ordered),
        "random" => Ok(OrderStrategy::Random),
        "angular_distance" => Ok(OrderStrategy::AngularDistance),
        other => Err(anyhow!("unknown ordering strategy `{other}`")),
    }
}

fn parse_mode(s: &str) -> Result<ScanMode> {
    match s {
        "cone" => Ok(ScanMode::Cone),
        "parallel" => Ok(ScanMode::Parallel),
        other => Err(anyhow!("unknown scan mode `{other}`")),
    }
}

/// A centred ball with a smaller, hotter inclusion.
fn phantom(n: usize) -> Array3<f32> {
    let mut volume = Array3::zeros([n, n, n]);
    let c = (n as f32 - 1.0) / 2.0;
    let r_outer = 0.4 * n as f32;
    let r_inner = 0.15 * n as f32;
    for (x, y, z) in iproduct!(0..n, 0..n, 0..n) {
        let (dx, dy, dz) = (x as f32 - c, y as f32 - c, z as f32 - c);
        let r = (dx * dx + dy * dy + dz * dz).sqrt();
        if r < r_inner {
            volume[[x, y, z]] = 2.0;
        } else if r < r_outer {
            volume[[x, y, z]] = 1.0;
        }
    }
    volume
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, warnings) = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => (Config::default(), vec![]),
    };
    if config.verbose {
        log_warnings(&warnings);
        for w in &warnings {
            eprintln!("warning: {w}");
        }
    }
    config.blocksize = args.blocksize;
    config.lambda = args.lambda;
    config.order_strategy = parse_strategy(&args.strategy)?;
    config.compute_l2 = true;
    config.verbose = false; // the progress bar replaces console reporting

    let n = args.nvoxel;
    let size = n as f32;
    let mode = parse_mode(&args.mode)?;
    let geo = Geometry::new(
        [n, n, n],
        [size, size, size],
        [n, n],
        [size * 1.5, size],
        size * 4.0,
        size * 2.0,
    )
    .with_mode(mode);
    let arc = match mode {
        ScanMode::Parallel => std::f32::consts::PI,
        ScanMode::Cone => std::f32::consts::TAU,
    };
    let angles = Angles::evenly_spaced(args.nangles, arc);

    println!(
        "Reconstructing {} voxels from {} angles, {} iterations",
        group_digits(geo.n_voxels_total()),
        args.nangles,
        args.niter,
    );

    let projector = RaySum::default();
    let mut watch = Stopwatch::new();
    let sinogram = projector
        .project(phantom(n).view(), &geo, angles.poses())
        .map_err(|e| anyhow!(e))?;
    println!("Forward projection of the phantom: {} ms", group_digits(watch.lap()));

    let bar = ProgressBar::new(args.niter as u64).with_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?,
    );
    let observer_bar = bar.clone();
    let plugins = Plugins {
        observer: Some(Box::new(move |event: ProgressEvent| match event {
            ProgressEvent::EstimatedTotal(d) => {
                observer_bar.set_message(format!("~{} ms total", group_digits(d.as_millis())));
            }
            ProgressEvent::IterationDone { .. } => observer_bar.inc(1),
            _ => {}
        })),
        ..Plugins::default()
    };

    let mut engine =
        IterationEngine::new(&projector, sinogram, &geo, angles, args.niter, config, plugins)?;
    engine.run()?;
    bar.finish();

    println!("Reconstruction: {} ms", group_digits(watch.lap()));
    for (i, l2) in engine.residual_log().iter().enumerate() {
        println!("  iteration {:>3}: residual L2 = {l2:.4}", i + 1);
    }
    Ok(())
}
