//! The data-minimization capability and its reference implementation: the
//! OS-SART block update.

use ndarray::{Array2, Array3, Axis};
use serde::Deserialize;

use crate::engine::ReconState;
use crate::error::CapabilityError;
use crate::projector::Projector;

/// Data-fidelity update: mutates the volume estimate in place, once per
/// engine iteration. Implementations own their step-size schedule; the
/// engine never touches it.
pub trait DataMinimization {
    fn apply(
        &mut self,
        state: &mut ReconState,
        projector: &dyn Projector,
    ) -> Result<(), CapabilityError>;
}

/// Built-in data-minimization rules selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimizerKind {
    #[default]
    ArtDataMinimizing,
}

/// OS-SART: for every block of the angle schedule, forward-project the
/// current estimate, weight the residual by `W`, backproject, divide by the
/// block-averaged falloff `V`, and add with relaxation `lambda`. `lambda`
/// decays geometrically once per iteration.
#[derive(Clone, Debug)]
pub struct ArtDataMinimization {
    pub lambda: f32,
    pub lambda_red: f32,
}

impl ArtDataMinimization {
    pub fn new(lambda: f32, lambda_red: f32) -> Self {
        ArtDataMinimization { lambda, lambda_red }
    }
}

impl Default for ArtDataMinimization {
    fn default() -> Self {
        ArtDataMinimization::new(1.0, 0.99)
    }
}

impl DataMinimization for ArtDataMinimization {
    fn apply(
        &mut self,
        state: &mut ReconState,
        projector: &dyn Projector,
    ) -> Result<(), CapabilityError> {
        let ReconState {
            geo,
            angles,
            sinogram,
            res,
            w,
            v,
            schedule,
            noneg,
        } = state;
        let [nu, nv] = geo.n_detector;

        for block in &schedule.blocks {
            let poses = angles.select(block);
            let simulated = projector.project(res.view(), geo, &poses)?;

            // weighted residual for this block, in block order
            let mut delta = Array3::zeros((block.len(), nu, nv));
            for (b, &a) in block.iter().enumerate() {
                for iu in 0..nu {
                    for iv in 0..nv {
                        delta[[b, iu, iv]] =
                            w[[a, iu, iv]] * (sinogram[[a, iu, iv]] - simulated[[b, iu, iv]]);
                    }
                }
            }
            let update = projector.backproject(delta.view(), geo, &poses)?;

            // falloff averaged over the block's angles
            let [_nx, ny, ..] = geo.n_voxel;
            let mut vbar = Array2::<f32>::zeros((ny, geo.n_voxel[0]));
            for &a in block.iter() {
                vbar += &v.index_axis(Axis(0), a);
            }
            vbar /= block.len() as f32;

            for ((x, y, z), r) in res.indexed_iter_mut() {
                let falloff = vbar[[y, x]];
                if falloff > 0.0 {
                    *r += self.lambda * update[[x, y, z]] / falloff;
                }
            }
            if *noneg {
                res.mapv_inplace(|t| t.max(0.0));
            }
        }
        self.lambda *= self.lambda_red;
        Ok(())
    }
}
