//! The iteration engine: construction-time derivation of weights, initial
//! volume and angle schedule, then the main loop alternating the
//! data-minimization and regularisation capabilities while tracking
//! convergence.

use std::time::{Duration, Instant};

use ndarray::{Array3, ArrayView3};

use crate::angles::Angles;
use crate::config::Config;
use crate::error::Error;
use crate::fom::{l2_norm, Metric, QualityMeasurement, QualityRecord, StandardMetrics};
use crate::geometry::Geometry;
use crate::init::{initial_volume, DirectSolver, MultigridSolver};
use crate::projector::Projector;
use crate::sart::{ArtDataMinimization, DataMinimization, MinimizerKind};
use crate::subsets::{order_subsets, AngleSchedule};
use crate::tv::{MinimizeTv, NoRegularisation, Regularisation, RegularizerKind};
use crate::types::Intensityf32;
use crate::utils::group_digits;
use crate::weights::{distance_falloff, ray_normalization};

/// Everything a data-minimization or regularisation capability may read or
/// mutate. `res` is the only field updated during the run; the rest is fixed
/// at construction.
pub struct ReconState {
    pub geo: Geometry,
    pub angles: Angles,
    pub sinogram: Array3<Intensityf32>,
    /// The volume estimate, mutated in place every iteration
    pub res: Array3<Intensityf32>,
    /// Ray-length normalization field, sinogram-shaped
    pub w: Array3<f32>,
    /// Distance-falloff field, shape `(n_angles, n_y, n_x)`
    pub v: Array3<f32>,
    pub schedule: AngleSchedule,
    /// Non-negativity clamp, honoured by the data-minimization capability
    pub noneg: bool,
}

/// Progress notifications; purely informational, never influencing results.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    Started { niter: usize },
    /// Stage of the initial-volume computation
    InitStage(&'static str),
    /// Projected total duration, extrapolated from the first iteration
    EstimatedTotal(Duration),
    IterationDone { iteration: usize, niter: usize },
}

/// Caller-supplied values for the four derived quantities. Any field left
/// `None` is computed by the corresponding builder at construction.
#[derive(Default)]
pub struct Overrides {
    pub w: Option<Array3<f32>>,
    pub v: Option<Array3<f32>>,
    pub res: Option<Array3<f32>>,
    pub schedule: Option<AngleSchedule>,
}

/// Injected capabilities and overrides. Defaults select the built-in
/// reference implementations named by the configuration.
#[derive(Default)]
pub struct Plugins<'a> {
    pub data_min: Option<Box<dyn DataMinimization + 'a>>,
    pub regularisation: Option<Box<dyn Regularisation + 'a>>,
    pub quality: Option<Box<dyn QualityMeasurement + 'a>>,
    pub multigrid: Option<&'a dyn MultigridSolver>,
    pub direct: Option<&'a dyn DirectSolver>,
    pub observer: Option<Box<dyn FnMut(ProgressEvent) + 'a>>,
    pub overrides: Overrides,
}

pub struct IterationEngine<'a> {
    projector: &'a dyn Projector,
    state: ReconState,
    niter: usize,
    data_min: Box<dyn DataMinimization + 'a>,
    regularisation: Box<dyn Regularisation + 'a>,
    quality: Box<dyn QualityMeasurement + 'a>,
    quality_metrics: Option<Vec<Metric>>,
    compute_l2: bool,
    observer: Option<Box<dyn FnMut(ProgressEvent) + 'a>>,
    lq: Vec<QualityRecord>,
    l2l: Vec<f32>,
}

impl<'a> IterationEngine<'a> {
    /// Validate the inputs, derive whatever the caller did not pre-supply,
    /// and assemble the engine. No iteration happens yet.
    pub fn new(
        projector: &'a dyn Projector,
        sinogram: Array3<f32>,
        geo: &Geometry,
        angles: Angles,
        niter: usize,
        config: Config,
        plugins: Plugins<'a>,
    ) -> Result<Self, Error> {
        let expected = [angles.len(), geo.n_detector[0], geo.n_detector[1]];
        if sinogram.shape() != expected {
            return Err(Error::shape_mismatch("sinogram", &expected, sinogram.shape()));
        }

        let mut observer = plugins.observer.or_else(|| {
            config.verbose.then(|| Box::new(console_observer) as Box<dyn FnMut(ProgressEvent)>)
        });

        let res = match plugins.overrides.res {
            Some(res) => {
                if res.shape() != geo.n_voxel {
                    return Err(Error::shape_mismatch("initial volume", &geo.n_voxel, res.shape()));
                }
                res
            }
            None => {
                if let Some(obs) = observer.as_mut() {
                    obs(ProgressEvent::InitStage("initializing volume estimate"));
                }
                initial_volume(
                    config.init,
                    sinogram.view(),
                    geo,
                    &angles,
                    plugins.multigrid,
                    plugins.direct,
                )?
            }
        };

        let w = match plugins.overrides.w {
            Some(w) => {
                if w.shape() != expected {
                    return Err(Error::shape_mismatch("W field", &expected, w.shape()));
                }
                w
            }
            None => ray_normalization(projector, geo, &angles)?,
        };

        let v_shape = [angles.len(), geo.n_voxel[1], geo.n_voxel[0]];
        let v = match plugins.overrides.v {
            Some(v) => {
                if v.shape() != v_shape {
                    return Err(Error::shape_mismatch("V field", &v_shape, v.shape()));
                }
                v
            }
            None => distance_falloff(geo, &angles),
        };

        let schedule = match plugins.overrides.schedule {
            Some(schedule) => {
                schedule.validate(angles.len())?;
                schedule
            }
            None => order_subsets(&angles, config.blocksize, config.order_strategy),
        };

        let data_min: Box<dyn DataMinimization> =
            plugins.data_min.unwrap_or_else(|| match config.data_minimizing {
                MinimizerKind::ArtDataMinimizing => {
                    Box::new(ArtDataMinimization::new(config.lambda, config.lambda_red))
                }
            });
        let regularisation: Box<dyn Regularisation> =
            plugins.regularisation.unwrap_or_else(|| match config.regularisation {
                RegularizerKind::MinimizeTv => Box::new(MinimizeTv::default()),
                RegularizerKind::None => Box::new(NoRegularisation),
            });
        let quality = plugins
            .quality
            .unwrap_or_else(|| Box::new(StandardMetrics));

        Ok(IterationEngine {
            projector,
            state: ReconState {
                geo: geo.clone(),
                angles,
                sinogram,
                res,
                w,
                v,
                schedule,
                noneg: config.noneg,
            },
            niter,
            data_min,
            regularisation,
            quality,
            quality_metrics: config.quality_metrics,
            compute_l2: config.compute_l2,
            observer,
            lq: Vec::new(),
            l2l: Vec::new(),
        })
    }

    /// Run the main loop: exactly `niter` rounds of data-minimization,
    /// regularisation and convergence recording. Any capability failure
    /// aborts the run, leaving the volume in whatever state it reached.
    pub fn run(&mut self) -> Result<(), Error> {
        self.emit(ProgressEvent::Started { niter: self.niter });
        let mut first_iteration_started = None;
        for i in 0..self.niter {
            if i == 0 {
                first_iteration_started = Some(Instant::now());
            }
            if i == 1 {
                if let Some(t0) = first_iteration_started {
                    let estimate = t0.elapsed() * (self.niter.saturating_sub(1)) as u32;
                    self.emit(ProgressEvent::EstimatedTotal(estimate));
                }
            }

            // snapshot strictly before any mutation of this iteration
            let snapshot = self
                .quality_metrics
                .is_some()
                .then(|| self.state.res.clone());

            self.data_min
                .apply(&mut self.state, self.projector)
                .map_err(Error::Capability)?;
            self.regularisation
                .apply(&mut self.state)
                .map_err(Error::Capability)?;

            self.record(snapshot.as_ref(), i)?;
            self.emit(ProgressEvent::IterationDone { iteration: i, niter: self.niter });
        }
        Ok(())
    }

    /// Append convergence measurements for iteration `i`. The quality log
    /// deliberately starts at the second iteration: before iteration 1 there
    /// is no previous estimate worth comparing against.
    fn record(&mut self, snapshot: Option<&Array3<f32>>, i: usize) -> Result<(), Error> {
        if let (Some(metrics), Some(previous)) = (&self.quality_metrics, snapshot) {
            if i > 0 {
                self.lq
                    .push(self.quality.measure(self.state.res.view(), previous.view(), metrics));
            }
        }
        if self.compute_l2 {
            let reprojected = self
                .projector
                .project(self.state.res.view(), &self.state.geo, self.state.angles.poses())
                .map_err(Error::Capability)?;
            let residual = &self.state.sinogram - &reprojected;
            self.l2l.push(l2_norm(residual.view()));
        }
        Ok(())
    }

    fn emit(&mut self, event: ProgressEvent) {
        if let Some(obs) = self.observer.as_mut() {
            obs(event);
        }
    }

    pub fn volume(&self) -> ArrayView3<Intensityf32> {
        self.state.res.view()
    }

    pub fn into_volume(self) -> Array3<Intensityf32> {
        self.state.res
    }

    pub fn quality_log(&self) -> &[QualityRecord] {
        &self.lq
    }

    pub fn residual_log(&self) -> &[f32] {
        &self.l2l
    }

    pub fn state(&self) -> &ReconState {
        &self.state
    }
}

fn console_observer(event: ProgressEvent) {
    match event {
        ProgressEvent::Started { .. } => println!("Algorithm in progress."),
        ProgressEvent::InitStage(stage) => println!("{stage} ..."),
        ProgressEvent::EstimatedTotal(d) => {
            println!("Estimated time until completion: {} ms", group_digits(d.as_millis()));
        }
        ProgressEvent::IterationDone { .. } => {}
    }
}

/// Construct, run, and return the reconstruction in one call, mirroring the
/// common use of the engine. The residual log is empty unless
/// `config.compute_l2` is set.
pub fn reconstruct(
    projector: &dyn Projector,
    sinogram: Array3<f32>,
    geo: &Geometry,
    angles: Angles,
    niter: usize,
    config: Config,
) -> Result<(Array3<f32>, Vec<f32>), Error> {
    let mut engine = IterationEngine::new(
        projector,
        sinogram,
        geo,
        angles,
        niter,
        config,
        Plugins::default(),
    )?;
    engine.run()?;
    let l2l = engine.residual_log().to_vec();
    Ok((engine.into_volume(), l2l))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapabilityError;
    use crate::geometry::ScanMode;
    use crate::init::InitStrategy;
    use crate::projector::RaySum;
    use ndarray::Array3;

    fn geo() -> Geometry {
        Geometry::new([4, 4, 4], [4.0, 4.0, 4.0], [4, 4], [4.0, 4.0], 8.0, 4.0)
            .with_mode(ScanMode::Parallel)
    }

    fn quiet() -> Config {
        Config { verbose: false, ..Config::default() }
    }

    fn angles() -> Angles {
        Angles::evenly_spaced(8, std::f32::consts::PI)
    }

    fn sinogram() -> Array3<f32> {
        Array3::zeros((8, 4, 4))
    }

    /// Counts invocations without touching the volume.
    struct CountingMin(usize);
    impl DataMinimization for CountingMin {
        fn apply(
            &mut self,
            _state: &mut ReconState,
            _projector: &dyn Projector,
        ) -> Result<(), CapabilityError> {
            self.0 += 1;
            Ok(())
        }
    }

    /// Nudges the volume so consecutive iterations differ.
    struct Nudge;
    impl DataMinimization for Nudge {
        fn apply(
            &mut self,
            state: &mut ReconState,
            _projector: &dyn Projector,
        ) -> Result<(), CapabilityError> {
            state.res += 1.0;
            Ok(())
        }
    }

    fn engine_with<'a>(
        projector: &'a RaySum,
        config: Config,
        plugins: Plugins<'a>,
        niter: usize,
    ) -> IterationEngine<'a> {
        IterationEngine::new(projector, sinogram(), &geo(), angles(), niter, config, plugins)
            .unwrap()
    }

    #[test]
    fn quality_log_skips_the_first_iteration() {
        let projector = RaySum::default();
        let config = Config {
            quality_metrics: Some(vec![Metric::Rmse]),
            regularisation: RegularizerKind::None,
            ..quiet()
        };
        let plugins = Plugins {
            data_min: Some(Box::new(Nudge)),
            ..Plugins::default()
        };
        let mut engine = engine_with(&projector, config, plugins, 5);
        engine.run().unwrap();
        assert_eq!(engine.quality_log().len(), 4);
        assert!(engine.residual_log().is_empty());
    }

    #[test]
    fn quality_log_is_empty_when_tracking_is_disabled() {
        let projector = RaySum::default();
        let config = Config { regularisation: RegularizerKind::None, ..quiet() };
        let plugins = Plugins {
            data_min: Some(Box::new(Nudge)),
            ..Plugins::default()
        };
        let mut engine = engine_with(&projector, config, plugins, 3);
        engine.run().unwrap();
        assert!(engine.quality_log().is_empty());
    }

    #[test]
    fn residual_log_gains_one_entry_per_iteration() {
        let projector = RaySum::default();
        let config = Config {
            compute_l2: true,
            regularisation: RegularizerKind::None,
            ..quiet()
        };
        let plugins = Plugins {
            data_min: Some(Box::new(Nudge)),
            ..Plugins::default()
        };
        let mut engine = engine_with(&projector, config, plugins, 3);
        engine.run().unwrap();
        assert_eq!(engine.residual_log().len(), 3);
    }

    #[test]
    fn runs_exactly_niter_rounds() {
        let projector = RaySum::default();
        let config = Config {
            compute_l2: true,
            regularisation: RegularizerKind::None,
            ..quiet()
        };
        let plugins = Plugins {
            data_min: Some(Box::new(CountingMin(0))),
            ..Plugins::default()
        };
        let mut engine = engine_with(&projector, config, plugins, 7);
        engine.run().unwrap();
        assert_eq!(engine.residual_log().len(), 7);
    }

    #[test]
    fn mismatched_user_volume_fails_before_any_iteration() {
        let projector = RaySum::default();
        let config = Config {
            init: InitStrategy::Volume(Array3::zeros((3, 3, 3))),
            ..quiet()
        };
        let err = IterationEngine::new(
            &projector, sinogram(), &geo(), angles(), 3, config, Plugins::default(),
        )
        .map(|_| ())
        .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn mismatched_sinogram_is_rejected() {
        let projector = RaySum::default();
        let err = IterationEngine::new(
            &projector,
            Array3::zeros((8, 3, 4)),
            &geo(),
            angles(),
            3,
            quiet(),
            Plugins::default(),
        )
        .map(|_| ())
        .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn capability_failure_aborts_the_run() {
        struct Failing;
        impl DataMinimization for Failing {
            fn apply(
                &mut self,
                _state: &mut ReconState,
                _projector: &dyn Projector,
            ) -> Result<(), CapabilityError> {
                Err("synthetic failure".into())
            }
        }
        let projector = RaySum::default();
        let plugins = Plugins {
            data_min: Some(Box::new(Failing)),
            ..Plugins::default()
        };
        let mut engine = engine_with(&projector, quiet(), plugins, 3);
        let err = engine.run().unwrap_err();
        assert!(matches!(err, Error::Capability(_)));
    }

    #[test]
    fn overrides_skip_the_builders() {
        let projector = RaySum::default();
        let w = Array3::from_elem((8, 4, 4), 0.5);
        let plugins = Plugins {
            overrides: Overrides { w: Some(w.clone()), ..Overrides::default() },
            data_min: Some(Box::new(Nudge)),
            ..Plugins::default()
        };
        let config = Config { regularisation: RegularizerKind::None, ..quiet() };
        let engine = engine_with(&projector, config, plugins, 1);
        assert_eq!(engine.state().w, w);
    }

    #[test]
    fn override_with_wrong_shape_is_fatal() {
        let projector = RaySum::default();
        let plugins = Plugins {
            overrides: Overrides {
                w: Some(Array3::zeros((2, 2, 2))),
                ..Overrides::default()
            },
            ..Plugins::default()
        };
        let err = IterationEngine::new(
            &projector, sinogram(), &geo(), angles(), 1, quiet(), plugins,
        )
        .map(|_| ())
        .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn events_arrive_in_order() {
        use std::cell::RefCell;
        let projector = RaySum::default();
        let events = RefCell::new(Vec::new());
        let plugins = Plugins {
            data_min: Some(Box::new(Nudge)),
            observer: Some(Box::new(|e: ProgressEvent| {
                events.borrow_mut().push(format!("{e:?}"));
            })),
            ..Plugins::default()
        };
        let config = Config { regularisation: RegularizerKind::None, ..quiet() };
        let mut engine = IterationEngine::new(
            &projector, sinogram(), &geo(), angles(), 2, config, plugins,
        )
        .unwrap();
        engine.run().unwrap();
        drop(engine);
        let events = events.into_inner();
        assert!(events[0].contains("InitStage"));
        assert!(events[1].contains("Started"));
        assert!(events.iter().any(|e| e.contains("EstimatedTotal")));
        assert!(events.last().unwrap().contains("IterationDone"));
    }
}
