//! End-to-end reconstruction of a synthetic, noise-free data set.

use ndarray::Array3;

use conebeam::{
    Angles, Config, Geometry, IterationEngine, OrderStrategy, Plugins, Projector, RaySum,
    RegularizerKind, ScanMode,
};

fn geometry() -> Geometry {
    Geometry::new([4, 4, 4], [4.0, 4.0, 4.0], [4, 4], [4.0, 4.0], 8.0, 4.0)
        .with_mode(ScanMode::Parallel)
}

fn phantom(geo: &Geometry) -> Array3<f32> {
    Array3::from_shape_fn(geo.n_voxel, |(x, y, z)| {
        let d = |i: usize| i as f32 - 1.5;
        if d(x).powi(2) + d(y).powi(2) + d(z).powi(2) < 2.0 {
            1.0
        } else {
            0.0
        }
    })
}

fn config() -> Config {
    Config {
        blocksize: 4,
        lambda: 0.2,
        order_strategy: OrderStrategy::Ordered,
        regularisation: RegularizerKind::None,
        compute_l2: true,
        verbose: false,
        ..Config::default()
    }
}

fn run_once() -> (Array3<f32>, Vec<f32>, Vec<usize>) {
    let geo = geometry();
    let angles = Angles::evenly_spaced(8, std::f32::consts::PI);
    let projector = RaySum::default();
    let sinogram = projector
        .project(phantom(&geo).view(), &geo, angles.poses())
        .unwrap();
    let mut engine = IterationEngine::new(
        &projector,
        sinogram,
        &geo,
        angles,
        3,
        config(),
        Plugins::default(),
    )
    .unwrap();
    let block_sizes = engine
        .state()
        .schedule
        .blocks
        .iter()
        .map(Vec::len)
        .collect();
    engine.run().unwrap();
    let residuals = engine.residual_log().to_vec();
    (engine.into_volume(), residuals, block_sizes)
}

#[test]
fn eight_angles_with_blocksize_four_make_two_full_blocks() {
    let (_, _, block_sizes) = run_once();
    assert_eq!(block_sizes, vec![4, 4]);
}

#[test]
fn returned_volume_has_the_geometry_shape() {
    let (volume, _, _) = run_once();
    assert_eq!(volume.shape(), [4, 4, 4]);
}

#[test]
fn residual_log_has_one_entry_per_iteration_and_does_not_increase() {
    let (_, residuals, _) = run_once();
    assert_eq!(residuals.len(), 3);
    for pair in residuals.windows(2) {
        assert!(
            pair[1] <= pair[0] * 1.001,
            "residuals increased: {residuals:?}"
        );
    }
    assert!(
        residuals[2] < residuals[0],
        "no overall progress: {residuals:?}"
    );
}

#[test]
fn deterministic_strategies_make_reruns_bit_identical() {
    let (first, _, _) = run_once();
    let (second, _, _) = run_once();
    assert_eq!(first, second);
}
