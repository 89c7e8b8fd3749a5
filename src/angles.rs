//! Projection poses. Each pose has a primary rotation angle plus two
//! secondary tilts; plain scalar angle sequences are padded with zero tilts.

use crate::types::{Anglef32, TWOPI};

/// (primary, tilt1, tilt2) in radians
pub type Pose = [Anglef32; 3];

/// Ordered, immutable sequence of projection poses.
#[derive(Clone, Debug, PartialEq)]
pub struct Angles(Vec<Pose>);

impl Angles {
    pub fn from_poses(poses: Vec<Pose>) -> Self {
        Angles(poses)
    }

    /// Normalize a scalar-angle sequence into 3-component poses.
    pub fn from_scalars(angles: &[Anglef32]) -> Self {
        Angles(angles.iter().map(|&a| [a, 0.0, 0.0]).collect())
    }

    /// `n` poses evenly spaced over `arc` radians, starting at zero.
    pub fn evenly_spaced(n: usize, arc: Anglef32) -> Self {
        Angles((0..n).map(|i| [arc * i as f32 / n as f32, 0.0, 0.0]).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn poses(&self) -> &[Pose] {
        &self.0
    }

    /// Poses at the given indices, in the given order.
    pub fn select(&self, indices: &[usize]) -> Vec<Pose> {
        indices.iter().map(|&i| self.0[i]).collect()
    }
}

/// Circular distance between two primary angles, folded into `[0, π]`.
pub fn angular_distance(a: Anglef32, b: Anglef32) -> Anglef32 {
    let d = (a - b).rem_euclid(TWOPI);
    d.min(TWOPI - d)
}
