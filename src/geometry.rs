//! The acquisition geometry: volume and detector sizing, source and detector
//! distances, and the scan mode (cone or parallel beam).

use crate::types::{BoxDim, DetDim, Lengthf32};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode {
    /// Rays diverge from a point source.
    Cone,
    /// Rays are mutually parallel; no distance falloff applies.
    Parallel,
}

/// Immutable-by-convention description of the scanner. The engine only ever
/// borrows it read-only; weight-field derivation clones it and mutates the
/// clone.
///
/// Invariant: `d_voxel = s_voxel / n_voxel` element-wise (and likewise for
/// the detector). All mutation goes through the setters, which re-derive the
/// per-element sizes.
#[derive(Clone, Debug)]
pub struct Geometry {
    /// Voxel counts (nx, ny, nz). x and y are transverse, z is axial.
    pub n_voxel: BoxDim,
    /// Physical size of the volume
    pub s_voxel: [Lengthf32; 3],
    /// Size of a single voxel, derived
    pub d_voxel: [Lengthf32; 3],
    /// Detector pixel counts (transverse, axial)
    pub n_detector: DetDim,
    /// Physical size of the detector
    pub s_detector: [Lengthf32; 2],
    /// Size of a single detector pixel, derived
    pub d_detector: [Lengthf32; 2],
    /// Source-to-detector distance
    pub dsd: Lengthf32,
    /// Source-to-origin distance
    pub dso: Lengthf32,
    /// Offset of the volume centre from the rotation origin
    pub off_origin: [Lengthf32; 3],
    pub mode: ScanMode,
}

impl Geometry {
    pub fn new(
        n_voxel: BoxDim,
        s_voxel: [Lengthf32; 3],
        n_detector: DetDim,
        s_detector: [Lengthf32; 2],
        dsd: Lengthf32,
        dso: Lengthf32,
    ) -> Self {
        let mut geo = Geometry {
            n_voxel,
            s_voxel,
            d_voxel: [0.0; 3],
            n_detector,
            s_detector,
            d_detector: [0.0; 2],
            dsd,
            dso,
            off_origin: [0.0; 3],
            mode: ScanMode::Cone,
        };
        geo.rederive();
        geo
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_off_origin(mut self, off_origin: [Lengthf32; 3]) -> Self {
        self.off_origin = off_origin;
        self
    }

    /// Change the physical size of the volume, keeping the voxel count.
    pub fn set_volume_size(&mut self, s_voxel: [Lengthf32; 3]) {
        self.s_voxel = s_voxel;
        self.rederive();
    }

    /// Change the voxel count, keeping the physical size.
    pub fn set_voxel_count(&mut self, n_voxel: BoxDim) {
        self.n_voxel = n_voxel;
        self.rederive();
    }

    fn rederive(&mut self) {
        for i in 0..3 {
            self.d_voxel[i] = self.s_voxel[i] / self.n_voxel[i] as f32;
        }
        for i in 0..2 {
            self.d_detector[i] = self.s_detector[i] / self.n_detector[i] as f32;
        }
    }

    pub fn min_voxel_size(&self) -> Lengthf32 {
        self.d_voxel.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn n_voxels_total(&self) -> usize {
        self.n_voxel.iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;

    fn simple() -> Geometry {
        Geometry::new([4, 4, 4], [4.0, 4.0, 4.0], [4, 4], [4.0, 4.0], 8.0, 4.0)
    }

    #[test]
    fn voxel_size_is_derived() {
        let geo = simple();
        assert_float_eq!(geo.d_voxel, [1.0, 1.0, 1.0], ulps <= [1, 1, 1]);
        assert_float_eq!(geo.d_detector, [1.0, 1.0], ulps <= [1, 1]);
    }

    #[rstest(size, count, expected,
             case([8.0, 4.0, 2.0], [4, 4, 4], [2.0, 1.0, 0.5]),
             case([4.0, 4.0, 4.0], [2, 2, 2], [2.0, 2.0, 2.0]),
    )]
    fn voxel_size_recomputed_after_mutation(
        size: [f32; 3],
        count: [usize; 3],
        expected: [f32; 3],
    ) {
        let mut geo = simple();
        geo.set_volume_size(size);
        geo.set_voxel_count(count);
        assert_float_eq!(geo.d_voxel, expected, ulps <= [1, 1, 1]);
    }

    #[test]
    fn min_voxel_size_takes_smallest_axis() {
        let mut geo = simple();
        geo.set_volume_size([4.0, 2.0, 8.0]);
        assert_float_eq!(geo.min_voxel_size(), 0.5, ulps <= 1);
    }
}
