//! The forward/backward projection capability.
//!
//! The engine consumes projection as an abstract capability; [`RaySum`] is
//! the reference implementation: ray-driven line integrals with a matched
//! adjoint, supporting both cone and parallel beams. Secondary tilt
//! components of a pose are ignored by this implementation.

use ndarray::{Array3, ArrayView3, Axis};
use rayon::prelude::*;

use crate::angles::Pose;
use crate::error::CapabilityError;
use crate::geometry::{Geometry, ScanMode};

/// Abstract interface for forward and adjoint projection.
///
/// `project` maps a volume to simulated detector data of shape
/// `(n_poses, n_u, n_v)`; `backproject` is its adjoint. Both are pure
/// functions of their inputs and block until the output is materialized.
pub trait Projector: Sync {
    fn project(
        &self,
        volume: ArrayView3<f32>,
        geo: &Geometry,
        poses: &[Pose],
    ) -> Result<Array3<f32>, CapabilityError>;

    fn backproject(
        &self,
        sinogram: ArrayView3<f32>,
        geo: &Geometry,
        poses: &[Pose],
    ) -> Result<Array3<f32>, CapabilityError>;
}

/// Ray-driven projector: march each detector ray through the volume with a
/// fixed step, accumulating nearest-voxel samples weighted by the step
/// length. Forward and backward traversals share the same sampling, so the
/// backprojection is the exact transpose of the forward operator.
#[derive(Clone, Copy, Debug)]
pub struct RaySum {
    /// Marching step as a fraction of the smallest voxel size
    pub step_fraction: f32,
}

impl Default for RaySum {
    fn default() -> Self {
        RaySum { step_fraction: 0.5 }
    }
}

impl Projector for RaySum {
    fn project(
        &self,
        volume: ArrayView3<f32>,
        geo: &Geometry,
        poses: &[Pose],
    ) -> Result<Array3<f32>, CapabilityError> {
        if volume.shape() != geo.n_voxel {
            return Err(format!(
                "volume shape {:?} does not match geometry {:?}",
                volume.shape(),
                geo.n_voxel
            )
            .into());
        }
        let [nu, nv] = geo.n_detector;
        let step = self.step_fraction * geo.min_voxel_size();
        let mut sinogram = Array3::zeros((poses.len(), nu, nv));
        // One angle per detector slice: writes are disjoint, so the result
        // does not depend on how rayon schedules the angles.
        sinogram
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(a, mut slice)| {
                for iu in 0..nu {
                    for iv in 0..nv {
                        let mut acc = 0.0;
                        trace(geo, &poses[a], iu, iv, step, |idx, w| acc += volume[idx] * w);
                        slice[[iu, iv]] = acc;
                    }
                }
            });
        Ok(sinogram)
    }

    fn backproject(
        &self,
        sinogram: ArrayView3<f32>,
        geo: &Geometry,
        poses: &[Pose],
    ) -> Result<Array3<f32>, CapabilityError> {
        let [nu, nv] = geo.n_detector;
        let expected = [poses.len(), nu, nv];
        if sinogram.shape() != expected {
            return Err(format!(
                "sinogram shape {:?} does not match {:?}",
                sinogram.shape(),
                expected
            )
            .into());
        }
        let step = self.step_fraction * geo.min_voxel_size();
        let mut volume = Array3::zeros(geo.n_voxel);
        // Serial over angles: the summation order into each voxel is fixed,
        // so repeated runs produce bit-identical volumes.
        for (a, pose) in poses.iter().enumerate() {
            for iu in 0..nu {
                for iv in 0..nv {
                    let value = sinogram[[a, iu, iv]];
                    if value == 0.0 {
                        continue;
                    }
                    trace(geo, pose, iu, iv, step, |idx, w| volume[idx] += value * w);
                }
            }
        }
        Ok(volume)
    }
}

/// Walk the ray belonging to detector pixel `(iu, iv)` under `pose`, calling
/// `visit(voxel_index, step_length)` for every in-volume sample.
fn trace(
    geo: &Geometry,
    pose: &Pose,
    iu: usize,
    iv: usize,
    step: f32,
    mut visit: impl FnMut([usize; 3], f32),
) {
    let (sin, cos) = pose[0].sin_cos();
    // pixel offsets in the detector frame: u transverse, v axial
    let u = (iu as f32 + 0.5) * geo.d_detector[0] - geo.s_detector[0] / 2.0;
    let v = (iv as f32 + 0.5) * geo.d_detector[1] - geo.s_detector[1] / 2.0;

    let (origin, dir, t_start, t_end) = match geo.mode {
        ScanMode::Parallel => {
            let origin = [-u * sin, u * cos, v];
            let dir = [cos, sin, 0.0];
            let half = half_reach(geo);
            (origin, dir, -half, half)
        }
        ScanMode::Cone => {
            let source = [-geo.dso * cos, -geo.dso * sin, 0.0];
            let pixel = [
                (geo.dsd - geo.dso) * cos - u * sin,
                (geo.dsd - geo.dso) * sin + u * cos,
                v,
            ];
            let d = [
                pixel[0] - source[0],
                pixel[1] - source[1],
                pixel[2] - source[2],
            ];
            let len = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
            let dir = [d[0] / len, d[1] / len, d[2] / len];
            (source, dir, 0.0, len)
        }
    };

    let lo = [
        geo.off_origin[0] - geo.s_voxel[0] / 2.0,
        geo.off_origin[1] - geo.s_voxel[1] / 2.0,
        geo.off_origin[2] - geo.s_voxel[2] / 2.0,
    ];
    let mut t = t_start + step / 2.0;
    while t < t_end {
        let p = [
            origin[0] + t * dir[0],
            origin[1] + t * dir[1],
            origin[2] + t * dir[2],
        ];
        let ix = (p[0] - lo[0]) / geo.d_voxel[0];
        let iy = (p[1] - lo[1]) / geo.d_voxel[1];
        let iz = (p[2] - lo[2]) / geo.d_voxel[2];
        if ix >= 0.0
            && iy >= 0.0
            && iz >= 0.0
            && ix < geo.n_voxel[0] as f32
            && iy < geo.n_voxel[1] as f32
            && iz < geo.n_voxel[2] as f32
        {
            visit([ix as usize, iy as usize, iz as usize], step);
        }
        t += step;
    }
}

/// Half-length of a marching interval guaranteed to cover the volume.
fn half_reach(geo: &Geometry) -> f32 {
    let [sx, sy, sz] = geo.s_voxel;
    let diag = (sx * sx + sy * sy + sz * sz).sqrt();
    let off = geo
        .off_origin
        .iter()
        .map(|o| o.abs())
        .fold(0.0f32, f32::max);
    diag / 2.0 + off + geo.min_voxel_size()
}
