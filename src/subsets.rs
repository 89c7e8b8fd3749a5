//! Partitioning of the angle set into ordered blocks for block-iterative
//! (ordered-subsets) updates.
//!
//! Whatever the strategy, every angle index ends up in exactly one block:
//! the strategies only permute the order in which angles are visited.

use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::angles::{angular_distance, Angles};
use crate::error::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStrategy {
    /// Use the angles in their input order, divided into contiguous blocks.
    #[default]
    Ordered,
    /// Shuffle the angles uniformly before chunking.
    Random,
    /// Greedy: each step schedules the remaining pose farthest (by circular
    /// distance of the primary angle) from everything already scheduled.
    AngularDistance,
}

/// The iteration schedule: angle indices grouped into ordered blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AngleSchedule {
    pub blocks: Vec<Vec<usize>>,
}

impl AngleSchedule {
    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of scheduled angle indices across all blocks.
    pub fn n_angles(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    /// Check that the blocks cover `0..n_angles` exactly once each.
    pub fn validate(&self, n_angles: usize) -> Result<(), Error> {
        let mut seen = vec![false; n_angles];
        for &i in self.blocks.iter().flatten() {
            if i >= n_angles || seen[i] {
                return Err(Error::BadConfig(format!(
                    "angle schedule must cover 0..{n_angles} exactly once (offending index {i})"
                )));
            }
            seen[i] = true;
        }
        if self.n_angles() != n_angles {
            return Err(Error::BadConfig(format!(
                "angle schedule covers {} of {} angles",
                self.n_angles(),
                n_angles
            )));
        }
        Ok(())
    }
}

/// Partition all angle indices into ordered blocks of at most `blocksize`.
pub fn order_subsets(angles: &Angles, blocksize: usize, strategy: OrderStrategy) -> AngleSchedule {
    let order = match strategy {
        OrderStrategy::Ordered => (0..angles.len()).collect(),
        OrderStrategy::Random => {
            let mut order: Vec<usize> = (0..angles.len()).collect();
            order.shuffle(&mut rand::thread_rng());
            order
        }
        OrderStrategy::AngularDistance => farthest_first(angles),
    };
    let blocks = order
        .chunks(blocksize.max(1))
        .map(<[usize]>::to_vec)
        .collect();
    AngleSchedule { blocks }
}

/// Greedy farthest-first ordering over primary angles, seeded with the first
/// input angle.
fn farthest_first(angles: &Angles) -> Vec<usize> {
    let n = angles.len();
    if n == 0 {
        return vec![];
    }
    let primary: Vec<f32> = angles.poses().iter().map(|p| p[0]).collect();
    let mut order = vec![0];
    let mut remaining: Vec<usize> = (1..n).collect();
    while !remaining.is_empty() {
        let (slot, _) = remaining
            .iter()
            .enumerate()
            .map(|(slot, &cand)| {
                let nearest = order
                    .iter()
                    .map(|&used| angular_distance(primary[cand], primary[used]))
                    .fold(f32::INFINITY, f32::min);
                (slot, nearest)
            })
            // ties resolve to the lowest index, keeping the order deterministic
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap();
        order.push(remaining.remove(slot));
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::f32::consts::PI;

    fn coverage_ok(schedule: &AngleSchedule, n: usize) {
        schedule.validate(n).unwrap();
        let total: usize = schedule.blocks.iter().map(Vec::len).sum();
        assert_eq!(total, n);
    }

    #[rstest(strategy,
             case(OrderStrategy::Ordered),
             case(OrderStrategy::Random),
             case(OrderStrategy::AngularDistance),
    )]
    fn every_strategy_covers_all_angles_exactly_once(strategy: OrderStrategy) {
        let angles = Angles::evenly_spaced(13, PI);
        let schedule = order_subsets(&angles, 4, strategy);
        coverage_ok(&schedule, 13);
    }

    #[test]
    fn ordered_chunks_keep_input_order() {
        let angles = Angles::evenly_spaced(8, PI);
        let schedule = order_subsets(&angles, 4, OrderStrategy::Ordered);
        assert_eq!(schedule.blocks, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]);
    }

    #[test]
    fn angular_distance_spreads_consecutive_picks() {
        let angles = Angles::evenly_spaced(8, 2.0 * PI);
        let schedule = order_subsets(&angles, 8, OrderStrategy::AngularDistance);
        let order = &schedule.blocks[0];
        assert_eq!(order[0], 0);
        // the second pick is (close to) diametrically opposite the first
        assert_eq!(order[1], 4);
        coverage_ok(&schedule, 8);
    }

    #[test]
    fn zero_blocksize_degrades_to_one_angle_per_block() {
        let angles = Angles::evenly_spaced(5, PI);
        let schedule = order_subsets(&angles, 0, OrderStrategy::Ordered);
        assert_eq!(schedule.n_blocks(), 5);
        coverage_ok(&schedule, 5);
    }

    #[test]
    fn validate_rejects_duplicates_and_gaps() {
        let dup = AngleSchedule { blocks: vec![vec![0, 1], vec![1, 2]] };
        assert!(dup.validate(4).is_err());
        let gap = AngleSchedule { blocks: vec![vec![0, 1]] };
        assert!(gap.validate(3).is_err());
    }

    // Exhaustive coverage check over sizes and strategies
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn coverage_invariant(n in 1..64_usize, blocksize in 1..20_usize, pick in 0..3_u8) {
            let strategy = match pick {
                0 => OrderStrategy::Ordered,
                1 => OrderStrategy::Random,
                _ => OrderStrategy::AngularDistance,
            };
            let angles = Angles::evenly_spaced(n, PI);
            let schedule = order_subsets(&angles, blocksize, strategy);
            schedule.validate(n).unwrap();
            prop_assert_eq!(schedule.n_angles(), n);
            for block in &schedule.blocks {
                prop_assert!(block.len() <= blocksize);
            }
        }
    }
}
