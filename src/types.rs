use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a bucket in the cascade. Index 0 is the most liquid tier and is
/// touched first by both deposits and withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketIndex(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrajectoryId(pub u64);

/// Simulation time in months, counted from 0.
/// Every month applies exactly one salary deposit and one expense withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Month(pub u32);

impl Month {
    pub const PER_YEAR: u32 = 12;

    /// Calendar year the month falls in, counting from year 1.
    pub fn year(self) -> u32 {
        self.0 / Self::PER_YEAR + 1
    }
}

impl TrajectoryId {
    /// Per-trajectory generator seed. Trajectory `i` of a batch seeded with `s`
    /// always draws from `s + i`, so any single run can be replayed alone.
    pub fn seed(self, base: u64) -> u64 {
        base.wrapping_add(self.0)
    }
}

impl fmt::Display for BucketIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for TrajectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_year_boundaries() {
        assert_eq!(Month(0).year(), 1);
        assert_eq!(Month(11).year(), 1);
        assert_eq!(Month(12).year(), 2);
    }

    #[test]
    fn trajectory_seed_offsets_base() {
        assert_eq!(TrajectoryId(3).seed(42), 45);
        assert_eq!(TrajectoryId(1).seed(u64::MAX), 0);
    }
}
