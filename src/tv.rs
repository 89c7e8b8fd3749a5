//! The regularisation capability and its reference implementations: a
//! steepest-descent total-variation minimizer and a no-op.

use ndarray::Array3;
use serde::Deserialize;

use crate::engine::ReconState;
use crate::error::CapabilityError;
use crate::fom::l2_norm;

/// Prior-enforcing update applied after the data-fidelity step, mutating the
/// volume estimate in place.
pub trait Regularisation {
    fn apply(&mut self, state: &mut ReconState) -> Result<(), CapabilityError>;
}

/// Built-in regularisation rules selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegularizerKind {
    #[default]
    MinimizeTv,
    None,
}

pub struct NoRegularisation;

impl Regularisation for NoRegularisation {
    fn apply(&mut self, _state: &mut ReconState) -> Result<(), CapabilityError> {
        Ok(())
    }
}

/// A few steps of normalized steepest descent on the smoothed isotropic
/// total-variation seminorm. The step is scaled to the norm of the current
/// estimate so the smoothing strength tracks the image magnitude.
#[derive(Clone, Copy, Debug)]
pub struct MinimizeTv {
    pub alpha: f32,
    pub iterations: usize,
}

impl Default for MinimizeTv {
    fn default() -> Self {
        MinimizeTv { alpha: 0.002, iterations: 10 }
    }
}

impl Regularisation for MinimizeTv {
    fn apply(&mut self, state: &mut ReconState) -> Result<(), CapabilityError> {
        let res = &mut state.res;
        let scale = self.alpha * l2_norm(res.view());
        if scale == 0.0 {
            return Ok(());
        }
        for _ in 0..self.iterations {
            let gradient = tv_gradient(res);
            let norm = l2_norm(gradient.view());
            if norm <= f32::EPSILON {
                break;
            }
            res.scaled_add(-scale / norm, &gradient);
        }
        Ok(())
    }
}

/// Total variation of a volume (smoothed, isotropic).
pub fn total_variation(vol: &Array3<f32>) -> f32 {
    let (nx, ny, nz) = vol.dim();
    let at = clamped(vol);
    let mut tv = 0.0;
    for x in 0..nx {
        for y in 0..ny {
            for z in 0..nz {
                let c = vol[[x, y, z]];
                let dx = c - at(x as isize - 1, y as isize, z as isize);
                let dy = c - at(x as isize, y as isize - 1, z as isize);
                let dz = c - at(x as isize, y as isize, z as isize - 1);
                tv += (dx * dx + dy * dy + dz * dz + SMOOTH).sqrt();
            }
        }
    }
    tv
}

const SMOOTH: f32 = 1e-8;

fn clamped(vol: &Array3<f32>) -> impl Fn(isize, isize, isize) -> f32 + '_ {
    let (nx, ny, nz) = vol.dim();
    move |x, y, z| {
        let cx = x.clamp(0, nx as isize - 1) as usize;
        let cy = y.clamp(0, ny as isize - 1) as usize;
        let cz = z.clamp(0, nz as isize - 1) as usize;
        vol[[cx, cy, cz]]
    }
}

/// Gradient of [`total_variation`] with respect to every voxel.
fn tv_gradient(vol: &Array3<f32>) -> Array3<f32> {
    let (nx, ny, nz) = vol.dim();
    let at = clamped(vol);
    // magnitude of the backward-difference gradient at every voxel
    let magnitude = Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| {
        let c = vol[[x, y, z]];
        let dx = c - at(x as isize - 1, y as isize, z as isize);
        let dy = c - at(x as isize, y as isize - 1, z as isize);
        let dz = c - at(x as isize, y as isize, z as isize - 1);
        (dx * dx + dy * dy + dz * dz + SMOOTH).sqrt()
    });
    let mat = |x: isize, y: isize, z: isize| {
        let cx = x.clamp(0, nx as isize - 1) as usize;
        let cy = y.clamp(0, ny as isize - 1) as usize;
        let cz = z.clamp(0, nz as isize - 1) as usize;
        magnitude[[cx, cy, cz]]
    };
    Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| {
        let (xi, yi, zi) = (x as isize, y as isize, z as isize);
        let c = vol[[x, y, z]];
        let m = magnitude[[x, y, z]];
        let mut g = ((c - at(xi - 1, yi, zi)) + (c - at(xi, yi - 1, zi)) + (c - at(xi, yi, zi - 1))) / m;
        g -= (at(xi + 1, yi, zi) - c) / mat(xi + 1, yi, zi);
        g -= (at(xi, yi + 1, zi) - c) / mat(xi, yi + 1, zi);
        g -= (at(xi, yi, zi + 1) - c) / mat(xi, yi, zi + 1);
        g
    })
}
