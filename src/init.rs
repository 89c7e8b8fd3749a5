//! Initial-volume strategies. `Multigrid` and `Direct` delegate to external
//! solver capabilities; the engine only adopts their result.

use ndarray::{Array3, ArrayView3};

use crate::angles::Angles;
use crate::error::{CapabilityError, Error};
use crate::geometry::Geometry;

/// Coarse-to-fine solver used for `InitStrategy::Multigrid`.
pub trait MultigridSolver {
    fn solve(
        &self,
        sinogram: ArrayView3<f32>,
        geo: &Geometry,
        angles: &Angles,
    ) -> Result<Array3<f32>, CapabilityError>;
}

/// Direct (non-iterative) reconstruction used for `InitStrategy::Direct`.
pub trait DirectSolver {
    fn reconstruct(
        &self,
        sinogram: ArrayView3<f32>,
        geo: &Geometry,
        angles: &Angles,
    ) -> Result<Array3<f32>, CapabilityError>;
}

#[derive(Clone, Debug, Default)]
pub enum InitStrategy {
    /// All-zero volume
    #[default]
    Zero,
    /// Solve coarsely and refine, via an injected [`MultigridSolver`]
    Multigrid,
    /// Adopt the result of an injected [`DirectSolver`]
    Direct,
    /// User-supplied volume; must match the geometry's voxel shape exactly
    Volume(Array3<f32>),
}

/// Produce the starting volume estimate for the selected strategy.
pub fn initial_volume(
    strategy: InitStrategy,
    sinogram: ArrayView3<f32>,
    geo: &Geometry,
    angles: &Angles,
    multigrid: Option<&dyn MultigridSolver>,
    direct: Option<&dyn DirectSolver>,
) -> Result<Array3<f32>, Error> {
    match strategy {
        InitStrategy::Zero => Ok(Array3::zeros(geo.n_voxel)),
        InitStrategy::Multigrid => multigrid
            .ok_or(Error::MissingCapability("multigrid solver"))?
            .solve(sinogram, geo, angles)
            .map_err(Error::Capability),
        InitStrategy::Direct => direct
            .ok_or(Error::MissingCapability("direct reconstruction"))?
            .reconstruct(sinogram, geo, angles)
            .map_err(Error::Capability),
        InitStrategy::Volume(volume) => {
            if volume.shape() != geo.n_voxel {
                return Err(Error::shape_mismatch(
                    "initial volume",
                    &geo.n_voxel,
                    volume.shape(),
                ));
            }
            Ok(volume)
        }
    }
}
