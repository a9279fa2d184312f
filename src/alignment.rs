use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A diagonal anchor between query and target, both 0-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedPair {
    /// Seed position in the query sequence
    pub query_position: u32,

    /// Seed position in the target sequence
    pub target_position: u32,
}

impl SeedPair {
    pub fn new(query_position: u32, target_position: u32) -> Self {
        Self { query_position, target_position }
    }
}

/// Result of extending a [`SeedPair`]: an ungapped segment on the seed's diagonal and its score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoredSegmentPair {
    /// The seed the segment was extended from
    pub seed_pair: SeedPair,

    /// Number of positions the segment reaches to the left of the seed
    pub left_extent: u32,

    /// Total length of the segment
    pub length: u32,

    pub score: i32,
}

impl ScoredSegmentPair {
    pub fn query_start(&self) -> u32 {
        self.seed_pair.query_position - self.left_extent
    }

    pub fn target_start(&self) -> u32 {
        self.seed_pair.target_position - self.left_extent
    }

    /// Query positions covered by this segment, half-open.
    pub fn query_range(&self) -> std::ops::Range<usize> {
        let start = self.query_start() as usize;
        start..start + self.length as usize
    }

    /// Target positions covered by this segment, half-open.
    pub fn target_range(&self) -> std::ops::Range<usize> {
        let start = self.target_start() as usize;
        start..start + self.length as usize
    }
}

impl Display for ScoredSegmentPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}",
            self.seed_pair.target_position,
            self.seed_pair.query_position,
            self.length,
            self.score)
    }
}
