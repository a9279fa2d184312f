use proptest::prelude::*;

use xdrop_extender::device::{ComputeStream, DeviceAllocator};
use xdrop_extender::scoring::ScoreTable;
use xdrop_extender::{create_extender, Extender, ScoredSegmentPair, SeedPair};

fn run(
    table: &ScoreTable,
    query: &[u8],
    target: &[u8],
    score_threshold: i32,
    seeds: &[SeedPair],
    num_threads: usize,
) -> Vec<ScoredSegmentPair> {
    let stream = ComputeStream::with_threads(num_threads).unwrap();
    let allocator = DeviceAllocator::new(0, 1 << 24);
    let mut extender = create_extender(table.as_slice(), 4, 20, false, &stream, 0, &allocator).unwrap();

    extender.extend_async(query, target, score_threshold, seeds).unwrap();
    extender.sync().unwrap();
    extender.get_scored_segment_pairs()
}

fn sequences() -> impl Strategy<Value = (Vec<u8>, Vec<u8>, Vec<SeedPair>)> {
    (1usize..120, 1usize..120).prop_flat_map(|(qlen, tlen)| {
        (
            prop::collection::vec(0u8..4, qlen),
            prop::collection::vec(0u8..4, tlen),
            // Some seeds fall outside the sequences
            prop::collection::vec((0u32..qlen as u32 + 5, 0u32..tlen as u32 + 5), 0..40)
                .prop_map(|v| v.into_iter().map(|(q, t)| SeedPair::new(q, t)).collect()),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_deterministic_across_thread_counts((query, target, seeds) in sequences(), threshold in -5i32..30) {
        let table = ScoreTable::match_mismatch(4, 10, -7).unwrap();

        let single = run(&table, &query, &target, threshold, &seeds, 1);
        let many = run(&table, &query, &target, threshold, &seeds, 4);
        let again = run(&table, &query, &target, threshold, &seeds, 4);

        prop_assert_eq!(&single, &many);
        prop_assert_eq!(&many, &again);
    }

    #[test]
    fn prop_segments_valid((query, target, seeds) in sequences(), threshold in -5i32..30) {
        let table = ScoreTable::match_mismatch(4, 10, -7).unwrap();
        let segments = run(&table, &query, &target, threshold, &seeds, 2);

        prop_assert!(segments.len() <= seeds.len());

        let mut remaining = seeds.iter();
        for segment in &segments {
            prop_assert!(segment.score >= threshold);
            prop_assert!(segment.length > 0);
            prop_assert!(segment.query_range().end <= query.len());
            prop_assert!(segment.target_range().end <= target.len());
            prop_assert!(segment.query_range().contains(&(segment.seed_pair.query_position as usize))
                || segment.left_extent == segment.length);

            // Results follow seed order
            prop_assert!(remaining.any(|s| *s == segment.seed_pair));
        }
    }
}
