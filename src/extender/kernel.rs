use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::trace;

use super::collector::ResultCollector;
use super::xdrop::{extend_one, ExtensionParams};
use crate::alignment::{ScoredSegmentPair, SeedPair};
use crate::device::{ComputeStream, DeviceBuffer, FaultTracker};
use crate::errors::{ConfigurationError, ExtenderError};

/// Device memory an extension kernel operates on.
pub(crate) struct KernelArgs {
    pub query: DeviceBuffer<u8>,
    pub target: DeviceBuffer<u8>,
    pub seed_pairs: DeviceBuffer<SeedPair>,
    pub num_seed_pairs: usize,
    pub score_threshold: i32,
    pub out_segments: DeviceBuffer<ScoredSegmentPair>,
    pub out_count: DeviceBuffer<i32>,
}

impl KernelArgs {
    fn validate(&self) -> Result<(), ExtenderError> {
        let checks = [
            ("seed_pairs", self.num_seed_pairs, self.seed_pairs.len()),
            ("out_segments", self.num_seed_pairs, self.out_segments.len()),
            ("out_count", 1, self.out_count.len()),
        ];

        for (name, required, capacity) in checks {
            if capacity < required {
                return Err(ConfigurationError::InsufficientBuffer { name, required, capacity }.into());
            }
        }

        Ok(())
    }
}

/// Schedule the extension of all seeds in `args` on `stream`.
///
/// Argument sizes are checked before anything is scheduled. A failure of the kernel is recorded
/// in `tracker`.
pub(crate) fn launch_ungapped_extension(
    stream: &ComputeStream,
    params: Arc<ExtensionParams>,
    args: KernelArgs,
    tracker: &FaultTracker,
) -> Result<(), ExtenderError> {
    args.validate()?;

    stream.enqueue_tracked(move |pool| {
        pool.install(|| run_ungapped_extension(&params, &args));
        Ok(())
    }, tracker)
}

/// One unit of parallel work per seed. Surviving segments are compacted into the start of
/// `out_segments` in seed order, and their number is written to `out_count`.
fn run_ungapped_extension(params: &ExtensionParams, args: &KernelArgs) {
    let start = Instant::now();

    let collector = ResultCollector::new(args.num_seed_pairs, args.score_threshold);
    {
        let query = args.query.read();
        let target = args.target.read();
        let seed_pairs = args.seed_pairs.read();

        seed_pairs[..args.num_seed_pairs].par_iter()
            .enumerate()
            .for_each(|(seed_ix, seed)| {
                if let Some(segment) = extend_one(seed, &query, &target, params) {
                    collector.offer(seed_ix, segment);
                }
            });
    }

    let num_segments = collector.len();
    let segments = collector.finish();
    debug_assert_eq!(segments.len(), num_segments);
    args.out_segments.write()[..segments.len()].copy_from_slice(&segments);
    args.out_count.write()[0] = segments.len() as i32;

    trace!(
        num_seed_pairs = args.num_seed_pairs,
        num_segments = segments.len(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "ungapped extension kernel finished"
    );
}
