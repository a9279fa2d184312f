//! Ungapped X-drop extension of a single seed.

use std::sync::Arc;

use crate::alignment::{ScoredSegmentPair, SeedPair};
use crate::scoring::{EntropyPolicy, ScoreTable};

/// Everything the extension of a single seed depends on, besides the sequences.
#[derive(Clone, Debug)]
pub struct ExtensionParams {
    pub score_table: ScoreTable,
    pub xdrop_threshold: i32,

    /// Complexity adjustment applied to the raw score, if any
    pub entropy_policy: Option<Arc<dyn EntropyPolicy>>,
}

/// Best extension found in one direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct DirectionalExtent {
    /// Best accumulated score, never negative
    pub score: i64,

    /// Number of positions up to and including the best scoring one
    pub offset: usize,

    /// Number of positions scored before the extension stopped
    pub examined: usize,
}

/// Extend along `pairs` of (query, target) symbols until the running score falls more than
/// `xdrop` below the best score seen, or the pairs run out.
#[inline]
pub(crate) fn extend_direction<I>(pairs: I, score_table: &ScoreTable, xdrop: i64) -> DirectionalExtent
where
    I: Iterator<Item = (u8, u8)>,
{
    let mut current = 0i64;
    let mut extent = DirectionalExtent::default();

    for (k, (q, t)) in pairs.enumerate() {
        current += score_table.score(q, t) as i64;
        extent.examined = k + 1;

        if current > extent.score {
            extent.score = current;
            extent.offset = k + 1;
        } else if extent.score - current > xdrop {
            break;
        }
    }

    extent
}

/// Extend `seed` in both directions and score the best ungapped segment through it.
///
/// The rightward extension starts at the seed position itself, the leftward extension at the
/// position before it, and each direction keeps its own best score. The segment thus covers
/// `[seed - left.offset, seed + right.offset)` on both sequences and its raw score is the sum of
/// substitution scores over exactly that span.
///
/// Returns `None` for seeds outside either sequence and for seeds whose best segment is empty.
/// No score threshold is applied here.
pub fn extend_one(
    seed: &SeedPair,
    query: &[u8],
    target: &[u8],
    params: &ExtensionParams,
) -> Option<ScoredSegmentPair> {
    let qpos = seed.query_position as usize;
    let tpos = seed.target_position as usize;
    if qpos >= query.len() || tpos >= target.len() {
        return None;
    }

    let xdrop = params.xdrop_threshold as i64;

    let right = extend_direction(
        query[qpos..].iter().copied().zip(target[tpos..].iter().copied()),
        &params.score_table,
        xdrop,
    );
    let left = extend_direction(
        query[..qpos].iter().rev().copied().zip(target[..tpos].iter().rev().copied()),
        &params.score_table,
        xdrop,
    );

    let length = left.offset + right.offset;
    if length == 0 {
        return None;
    }

    let raw_score = (left.score + right.score).min(i32::MAX as i64) as i32;
    let score = match &params.entropy_policy {
        Some(policy) => policy.adjust(
            raw_score,
            &query[qpos - left.offset..qpos + right.offset],
            &target[tpos - left.offset..tpos + right.offset],
        ),
        None => raw_score,
    };

    Some(ScoredSegmentPair {
        seed_pair: *seed,
        left_extent: left.offset as u32,
        length: length as u32,
        score,
    })
}
