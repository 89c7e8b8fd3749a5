pub type Lengthf32 = f32;
pub type Anglef32 = f32;
pub type Intensityf32 = f32;

/// Voxel counts along the three volume axes
pub type BoxDim = [usize; 3];
/// Pixel counts along the two detector axes (transverse, axial)
pub type DetDim = [usize; 2];

pub const TWOPI: Anglef32 = std::f32::consts::TAU;
