//! Precomputed per-geometry correction fields consumed by the data-fidelity
//! update: the ray-length normalization field `W` and the distance-falloff
//! field `V`. Both are derived once per run and never mutated afterwards.

use ndarray::{Array3, ArrayView3};

use crate::angles::Angles;
use crate::error::Error;
use crate::geometry::{Geometry, ScanMode};
use crate::projector::Projector;

/// Ray-length normalization field, one entry per sinogram element.
///
/// A transient clone of the geometry is shrunk to a 2×2×2 voxel cube sized to
/// bound the longest possible ray path; forward-projecting a unit volume
/// through it yields per-ray path lengths. Lengths below a quarter of the
/// real voxel size count as degenerate rays: they are clamped to infinity so
/// that the element-wise inverse discounts them to zero instead of blowing
/// up. The caller's geometry is never touched.
pub fn ray_normalization(
    projector: &dyn Projector,
    geo: &Geometry,
    angles: &Angles,
) -> Result<Array3<f32>, Error> {
    let mut bound = geo.clone();
    let reach = geo.dsd - geo.dso;
    let mut size = [reach, reach, reach];
    // the transverse axis must cover at least the detector
    size[0] = size[0].max(geo.s_detector[0]);
    bound.set_volume_size(size);
    bound.set_voxel_count([2, 2, 2]);

    let unit = Array3::from_elem(bound.n_voxel, 1.0);
    let mut w = projector
        .project(unit.view(), &bound, angles.poses())
        .map_err(Error::Capability)?;

    let cutoff = geo.min_voxel_size() / 4.0;
    w.mapv_inplace(|len| if len < cutoff { f32::INFINITY } else { len });
    w.mapv_inplace(|len| 1.0 / len);
    Ok(w)
}

/// Distance-falloff field of shape `(n_angles, n_y, n_x)`.
///
/// Cone beam: for every angle, the inverse-square law over the in-plane
/// voxel grid, `(dso / (dso + offset ⟂ to the rotated source axis))²`.
/// Parallel beam: identically one.
pub fn distance_falloff(geo: &Geometry, angles: &Angles) -> Array3<f32> {
    let [nx, ny, _nz] = geo.n_voxel;
    let shape = (angles.len(), ny, nx);
    if geo.mode == ScanMode::Parallel {
        return Array3::from_elem(shape, 1.0);
    }

    // centred, origin-offset coordinate ramps over the two transverse axes;
    // descending, with the sign flipped on the second axis
    let ty: Vec<f32> = (0..ny)
        .map(|i| geo.s_voxel[1] / 2.0 - geo.d_voxel[1] / 2.0 + geo.off_origin[1]
             - i as f32 * geo.d_voxel[1])
        .collect();
    let ux: Vec<f32> = (0..nx)
        .map(|j| -(geo.s_voxel[0] / 2.0 - geo.d_voxel[0] / 2.0 + geo.off_origin[0]
             - j as f32 * geo.d_voxel[0]))
        .collect();

    let mut v = Array3::zeros(shape);
    for (a, pose) in angles.poses().iter().enumerate() {
        let alpha = pose[0] + std::f32::consts::FRAC_PI_2;
        let (sin, cos) = (-alpha).sin_cos();
        for (i, &t) in ty.iter().enumerate() {
            for (j, &u) in ux.iter().enumerate() {
                let falloff = geo.dso / (geo.dso + u * sin - t * cos);
                v[[a, i, j]] = falloff * falloff;
            }
        }
    }
    v
}

/// True when the field is finite and non-negative everywhere.
pub fn finite_and_non_negative(field: ArrayView3<f32>) -> bool {
    field.iter().all(|x| x.is_finite() && *x >= 0.0)
}
