//! The extension engine.
//!
//! An [`UngappedExtender`] is bound to a compute stream, a device and a device allocator, and
//! offers two ways to extend seeds:
//!
//! * [`Extender::extend_async`] takes host data, stages it into device memory it allocates
//!   itself, and keeps the results for [`Extender::get_scored_segment_pairs`].
//! * [`Extender::extend_async_device`] works directly on device buffers owned by the caller and
//!   writes the results to caller provided output buffers.
//!
//! Both only schedule work. Results become visible after synchronizing the stream.

pub mod config;
pub mod xdrop;
pub(crate) mod collector;
pub(crate) mod kernel;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, debug_span};

pub use config::ExtenderConfig;
pub use xdrop::{extend_one, ExtensionParams};

use kernel::{launch_ungapped_extension, KernelArgs};
use crate::alignment::{ScoredSegmentPair, SeedPair};
use crate::device::buffer::stage_copy;
use crate::device::{ComputeStream, DeviceAllocator, DeviceBuffer, FaultTracker};
use crate::errors::{ConfigurationError, ExtenderError};
use crate::scoring::{EntropyPolicy, ScoreTable};

pub trait Extender {
    /// Extend `seed_pairs` between host resident `query` and `target`, keeping the segments
    /// scoring at least `score_threshold`.
    fn extend_async(
        &mut self,
        query: &[u8],
        target: &[u8],
        score_threshold: i32,
        seed_pairs: &[SeedPair],
    ) -> Result<(), ExtenderError>;

    /// Extend the first `num_seed_pairs` seeds in `seed_pairs` between device resident `query`
    /// and `target`. The surviving segments are written to the start of `out_segments` and their
    /// number to `out_count[0]`.
    #[allow(clippy::too_many_arguments)]
    fn extend_async_device(
        &mut self,
        query: &DeviceBuffer<u8>,
        target: &DeviceBuffer<u8>,
        score_threshold: i32,
        seed_pairs: &DeviceBuffer<SeedPair>,
        num_seed_pairs: usize,
        out_segments: &DeviceBuffer<ScoredSegmentPair>,
        out_count: &DeviceBuffer<i32>,
    ) -> Result<(), ExtenderError>;

    /// Block until all scheduled extensions have completed.
    fn sync(&mut self) -> Result<(), ExtenderError>;

    /// Segments found by the host data variant of `extend_async`, in seed order.
    /// Only complete after a successful [`Extender::sync`].
    fn get_scored_segment_pairs(&self) -> Vec<ScoredSegmentPair>;

    /// Wait for outstanding work and drop all retained results.
    fn reset(&mut self) -> Result<(), ExtenderError>;
}

pub struct UngappedExtender {
    params: Arc<ExtensionParams>,
    stream: ComputeStream,
    device_id: i32,
    allocator: DeviceAllocator,
    results: Arc<Mutex<Vec<ScoredSegmentPair>>>,

    /// Failures of this extender's own work since the last synchronization
    faults: FaultTracker,
}

/// Create an extender using the given flattened, row-major score table over an alphabet of
/// `alphabet_size` symbols.
pub fn create_extender(
    score_table: &[i32],
    alphabet_size: i32,
    xdrop_threshold: i32,
    no_entropy_adjustment: bool,
    stream: &ComputeStream,
    device_id: i32,
    allocator: &DeviceAllocator,
) -> Result<UngappedExtender, ExtenderError> {
    let score_table = ScoreTable::new(score_table, alphabet_size)?;
    let config = ExtenderConfig::new(score_table, xdrop_threshold, no_entropy_adjustment);

    UngappedExtender::with_config(&config, stream, device_id, allocator)
}

impl UngappedExtender {
    pub fn with_config(
        config: &ExtenderConfig,
        stream: &ComputeStream,
        device_id: i32,
        allocator: &DeviceAllocator,
    ) -> Result<Self, ExtenderError> {
        if device_id < 0 {
            return Err(ConfigurationError::DeviceId(device_id).into());
        }

        if allocator.device_id() != device_id {
            return Err(ConfigurationError::DeviceMismatch {
                allocator: allocator.device_id(),
                requested: device_id,
            }.into());
        }

        let params = config.to_params()?;

        debug!(
            alphabet_size = params.score_table.alphabet_size(),
            xdrop = params.xdrop_threshold,
            entropy_adjustment = params.entropy_policy.is_some(),
            stream = stream.id(),
            device = device_id,
            "created ungapped extender"
        );

        Ok(Self {
            params: Arc::new(params),
            stream: stream.clone(),
            device_id,
            allocator: allocator.clone(),
            results: Arc::new(Mutex::new(Vec::new())),
            faults: FaultTracker::new(),
        })
    }

    /// Replace the complexity adjustment with a custom policy.
    pub fn with_entropy_policy(mut self, policy: Arc<dyn EntropyPolicy>) -> Self {
        let mut params = ExtensionParams::clone(&self.params);
        params.entropy_policy = Some(policy);
        self.params = Arc::new(params);

        self
    }

    pub fn params(&self) -> &ExtensionParams {
        &self.params
    }

    pub fn stream(&self) -> &ComputeStream {
        &self.stream
    }

    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    /// Wait for the stream. Failures of this extender's work are reported even when another
    /// user of the stream already observed the stream fault.
    fn synchronize_own_work(&self) -> Result<(), ExtenderError> {
        let outcome = self.stream.synchronize();

        match self.faults.take() {
            Some(fault) => Err(fault.into()),
            None => outcome,
        }
    }

    fn check_device<T>(&self, name: &'static str, buffer: &DeviceBuffer<T>) -> Result<(), ExtenderError> {
        if buffer.device_id() != self.device_id {
            debug!(buffer = name, "buffer lives on device {}", buffer.device_id());
            return Err(ConfigurationError::DeviceMismatch {
                allocator: buffer.device_id(),
                requested: self.device_id,
            }.into());
        }

        Ok(())
    }
}

impl Extender for UngappedExtender {
    fn extend_async(
        &mut self,
        query: &[u8],
        target: &[u8],
        score_threshold: i32,
        seed_pairs: &[SeedPair],
    ) -> Result<(), ExtenderError> {
        let span = debug_span!("extend_async", stream = self.stream.id(), num_seed_pairs = seed_pairs.len());
        let _enter = span.enter();

        // Allocate everything up front, so an exhausted allocator leaves nothing scheduled
        let d_query = DeviceBuffer::<u8>::new(query.len(), &self.allocator)?;
        let d_target = DeviceBuffer::<u8>::new(target.len(), &self.allocator)?;
        let d_seed_pairs = DeviceBuffer::<SeedPair>::new(seed_pairs.len(), &self.allocator)?;
        let d_segments = DeviceBuffer::<ScoredSegmentPair>::new(seed_pairs.len(), &self.allocator)?;
        let d_count = DeviceBuffer::<i32>::new(1, &self.allocator)?;

        stage_copy(query, &d_query, &self.stream, Some(&self.faults))?;
        stage_copy(target, &d_target, &self.stream, Some(&self.faults))?;
        stage_copy(seed_pairs, &d_seed_pairs, &self.stream, Some(&self.faults))?;

        launch_ungapped_extension(&self.stream, Arc::clone(&self.params), KernelArgs {
            query: d_query,
            target: d_target,
            seed_pairs: d_seed_pairs,
            num_seed_pairs: seed_pairs.len(),
            score_threshold,
            out_segments: d_segments.clone(),
            out_count: d_count.clone(),
        }, &self.faults)?;

        let results = Arc::clone(&self.results);
        self.stream.enqueue_tracked(move |_| {
            let count = d_count.read()[0].max(0) as usize;
            results.lock().extend_from_slice(&d_segments.read()[..count]);

            Ok(())
        }, &self.faults)?;

        debug!("scheduled extension of {} seed pairs", seed_pairs.len());

        Ok(())
    }

    fn extend_async_device(
        &mut self,
        query: &DeviceBuffer<u8>,
        target: &DeviceBuffer<u8>,
        score_threshold: i32,
        seed_pairs: &DeviceBuffer<SeedPair>,
        num_seed_pairs: usize,
        out_segments: &DeviceBuffer<ScoredSegmentPair>,
        out_count: &DeviceBuffer<i32>,
    ) -> Result<(), ExtenderError> {
        let span = debug_span!("extend_async_device", stream = self.stream.id(), num_seed_pairs);
        let _enter = span.enter();

        self.check_device("query", query)?;
        self.check_device("target", target)?;
        self.check_device("seed_pairs", seed_pairs)?;
        self.check_device("out_segments", out_segments)?;
        self.check_device("out_count", out_count)?;

        launch_ungapped_extension(&self.stream, Arc::clone(&self.params), KernelArgs {
            query: query.clone(),
            target: target.clone(),
            seed_pairs: seed_pairs.clone(),
            num_seed_pairs,
            score_threshold,
            out_segments: out_segments.clone(),
            out_count: out_count.clone(),
        }, &self.faults)?;

        debug!("scheduled extension of {num_seed_pairs} device resident seed pairs");

        Ok(())
    }

    fn sync(&mut self) -> Result<(), ExtenderError> {
        self.synchronize_own_work()
    }

    fn get_scored_segment_pairs(&self) -> Vec<ScoredSegmentPair> {
        self.results.lock().clone()
    }

    fn reset(&mut self) -> Result<(), ExtenderError> {
        let outcome = self.synchronize_own_work();
        self.results.lock().clear();

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{copy_to_host, device_copy_n, get_value_from_device};
    use crate::errors::SyncFault;

    fn setup() -> (ComputeStream, DeviceAllocator) {
        (ComputeStream::with_threads(2).unwrap(), DeviceAllocator::new(0, 1 << 20))
    }

    const BINARY_TABLE: [i32; 4] = [1, -1, -1, 1];

    #[test]
    fn test_create_rejects_bad_config() {
        let (stream, allocator) = setup();

        let err = create_extender(&BINARY_TABLE, 3, 5, true, &stream, 0, &allocator).err().unwrap();
        assert!(matches!(
            err,
            ExtenderError::Configuration(ConfigurationError::ScoreTableSize { expected: 9, actual: 4 })
        ));

        let err = create_extender(&BINARY_TABLE, 2, 0, true, &stream, 0, &allocator).err().unwrap();
        assert!(matches!(err, ExtenderError::Configuration(ConfigurationError::XDropThreshold(0))));

        let err = create_extender(&BINARY_TABLE, 2, 5, true, &stream, -1, &allocator).err().unwrap();
        assert!(matches!(err, ExtenderError::Configuration(ConfigurationError::DeviceId(-1))));

        let err = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 1, &allocator).err().unwrap();
        assert!(matches!(
            err,
            ExtenderError::Configuration(ConfigurationError::DeviceMismatch { allocator: 0, requested: 1 })
        ));
    }

    #[test]
    fn test_creation_allocates_nothing() {
        let (stream, allocator) = setup();
        let _extender = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator).unwrap();
        assert_eq!(allocator.allocated(), 0);
    }

    #[test]
    fn test_host_api() {
        let (stream, allocator) = setup();
        let mut extender = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator).unwrap();

        let seq = [0u8, 1].repeat(10);
        extender.extend_async(&seq, &seq, 0, &[SeedPair::new(10, 10)]).unwrap();
        extender.sync().unwrap();

        let result = extender.get_scored_segment_pairs();
        assert_eq!(result.len(), 1);
        assert_eq!((result[0].length, result[0].score), (20, 20));

        // Staging buffers are released once the work has run
        assert_eq!(allocator.allocated(), 0);
    }

    #[test]
    fn test_consecutive_invocations_append() {
        let (stream, allocator) = setup();
        let mut extender = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator).unwrap();

        let seq = vec![0u8; 10];
        extender.extend_async(&seq, &seq, 0, &[SeedPair::new(1, 1)]).unwrap();
        extender.extend_async(&seq, &seq, 0, &[SeedPair::new(2, 2), SeedPair::new(3, 3)]).unwrap();
        extender.sync().unwrap();

        let seeds: Vec<_> = extender.get_scored_segment_pairs().iter().map(|s| s.seed_pair.query_position).collect();
        assert_eq!(seeds, vec![1, 2, 3]);

        extender.reset().unwrap();
        assert!(extender.get_scored_segment_pairs().is_empty());
    }

    #[test]
    fn test_allocation_failure_leaves_extender_usable() {
        let stream = ComputeStream::with_threads(1).unwrap();
        let allocator = DeviceAllocator::new(0, 64);
        let mut extender = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator).unwrap();

        let long = vec![0u8; 100];
        let err = extender.extend_async(&long, &long, 0, &[SeedPair::new(1, 1)]).unwrap_err();
        assert!(matches!(err, ExtenderError::Allocation { .. }));
        assert_eq!(allocator.allocated(), 0);

        let short = vec![0u8; 4];
        extender.extend_async(&short, &short, 0, &[SeedPair::new(1, 1)]).unwrap();
        extender.sync().unwrap();
        assert_eq!(extender.get_scored_segment_pairs().len(), 1);
    }

    #[test]
    fn test_device_api() {
        let (stream, allocator) = setup();
        let mut extender = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator).unwrap();

        let query = vec![0u8; 20];
        let mut target = vec![0u8; 20];
        target[..10].fill(1);
        let seeds = [SeedPair::new(15, 15), SeedPair::new(2, 2), SeedPair::new(12, 12)];

        let d_query = DeviceBuffer::new(query.len(), &allocator).unwrap();
        let d_target = DeviceBuffer::new(target.len(), &allocator).unwrap();
        let d_seeds = DeviceBuffer::new(seeds.len(), &allocator).unwrap();
        let d_out = DeviceBuffer::new(seeds.len(), &allocator).unwrap();
        let d_count = DeviceBuffer::new(1, &allocator).unwrap();

        device_copy_n(&query, &d_query, &stream).unwrap();
        device_copy_n(&target, &d_target, &stream).unwrap();
        device_copy_n(&seeds, &d_seeds, &stream).unwrap();

        extender.extend_async_device(&d_query, &d_target, 5, &d_seeds, seeds.len(), &d_out, &d_count).unwrap();
        extender.sync().unwrap();

        let count = get_value_from_device(&d_count, &stream).unwrap() as usize;
        let segments = copy_to_host(&d_out, &stream).unwrap();
        assert_eq!(count, 2);
        assert_eq!(segments[0].seed_pair, seeds[0]);
        assert_eq!(segments[1].seed_pair, seeds[2]);
        assert_eq!((segments[0].left_extent, segments[0].length, segments[0].score), (5, 10, 10));

        // The device variant never touches the host results
        assert!(extender.get_scored_segment_pairs().is_empty());
    }

    #[test]
    fn test_device_api_checks_buffer_sizes() {
        let (stream, allocator) = setup();
        let mut extender = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator).unwrap();

        let d_seq = DeviceBuffer::<u8>::new(10, &allocator).unwrap();
        let d_seeds = DeviceBuffer::<SeedPair>::new(4, &allocator).unwrap();
        let d_out = DeviceBuffer::<ScoredSegmentPair>::new(3, &allocator).unwrap();
        let d_count = DeviceBuffer::<i32>::new(1, &allocator).unwrap();

        let err = extender.extend_async_device(&d_seq, &d_seq, 0, &d_seeds, 4, &d_out, &d_count).unwrap_err();
        assert!(matches!(
            err,
            ExtenderError::Configuration(ConfigurationError::InsufficientBuffer { name: "out_segments", required: 4, capacity: 3 })
        ));

        let err = extender.extend_async_device(&d_seq, &d_seq, 0, &d_seeds, 5, &d_out, &d_count).unwrap_err();
        assert!(matches!(
            err,
            ExtenderError::Configuration(ConfigurationError::InsufficientBuffer { name: "seed_pairs", .. })
        ));

        // Query and target may be the same buffer. Both are all zeros, as are the seeds.
        extender.extend_async_device(&d_seq, &d_seq, 0, &d_seeds, 3, &d_out, &d_count).unwrap();
        extender.sync().unwrap();
        assert_eq!(get_value_from_device(&d_count, &stream).unwrap(), 3);
    }

    #[test]
    fn test_foreign_device_buffer() {
        let (stream, allocator) = setup();
        let other_device = DeviceAllocator::new(1, 1024);
        let mut extender = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator).unwrap();

        let d_query = DeviceBuffer::<u8>::new(4, &other_device).unwrap();
        let d_target = DeviceBuffer::<u8>::new(4, &allocator).unwrap();
        let d_seeds = DeviceBuffer::<SeedPair>::new(1, &allocator).unwrap();
        let d_out = DeviceBuffer::<ScoredSegmentPair>::new(1, &allocator).unwrap();
        let d_count = DeviceBuffer::<i32>::new(1, &allocator).unwrap();

        let err = extender.extend_async_device(&d_query, &d_target, 0, &d_seeds, 1, &d_out, &d_count).unwrap_err();
        assert!(matches!(err, ExtenderError::Configuration(ConfigurationError::DeviceMismatch { .. })));
    }

    #[test]
    fn test_stream_fault_surfaces_at_sync() {
        let (stream, allocator) = setup();
        let mut extender = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator).unwrap();

        stream.enqueue(|_| Err(ExtenderError::InvalidSequence("device fault".to_string()))).unwrap();
        let seq = vec![0u8; 10];
        extender.extend_async(&seq, &seq, 0, &[SeedPair::new(1, 1)]).unwrap();

        let err = extender.sync().unwrap_err();
        assert!(matches!(err, ExtenderError::Synchronization(SyncFault::WorkFailed(_))));
        assert!(extender.get_scored_segment_pairs().is_empty());
    }

    #[test]
    fn test_fault_reaches_every_extender_on_shared_stream() {
        let (stream, allocator) = setup();
        let mut first = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator).unwrap();
        let mut second = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator).unwrap();

        stream.enqueue(|_| Err(ExtenderError::InvalidSequence("device fault".to_string()))).unwrap();
        let seq = vec![0u8; 10];
        first.extend_async(&seq, &seq, 0, &[SeedPair::new(1, 1)]).unwrap();
        second.extend_async(&seq, &seq, 0, &[SeedPair::new(2, 2)]).unwrap();

        // The second extender synchronizes first and observes the stream fault
        assert!(matches!(second.sync(), Err(ExtenderError::Synchronization(SyncFault::WorkFailed(_)))));

        // The first extender's work was skipped as well, which must not look like success
        assert!(matches!(first.sync(), Err(ExtenderError::Synchronization(SyncFault::WorkFailed(_)))));
        assert!(first.get_scored_segment_pairs().is_empty());

        // Both recover once their faults have been reported
        first.extend_async(&seq, &seq, 0, &[SeedPair::new(3, 3)]).unwrap();
        first.sync().unwrap();
        assert_eq!(first.get_scored_segment_pairs().len(), 1);
        second.sync().unwrap();
    }

    #[test]
    fn test_fault_observed_by_other_synchronization() {
        let (stream, allocator) = setup();
        let mut extender = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator).unwrap();

        stream.enqueue(|_| panic!("device fault")).unwrap();
        let seq = vec![0u8; 10];
        extender.extend_async(&seq, &seq, 0, &[SeedPair::new(1, 1)]).unwrap();

        // Someone else synchronizes the shared stream first
        assert!(stream.synchronize().is_err());

        let err = extender.reset().unwrap_err();
        assert!(matches!(err, ExtenderError::Synchronization(SyncFault::WorkPanicked(_))));
        extender.sync().unwrap();
    }

    #[derive(Debug)]
    struct Halve;

    impl EntropyPolicy for Halve {
        fn adjust(&self, score: i32, _: &[u8], _: &[u8]) -> i32 {
            score / 2
        }
    }

    #[test]
    fn test_custom_entropy_policy() {
        let (stream, allocator) = setup();
        let mut extender = create_extender(&BINARY_TABLE, 2, 5, true, &stream, 0, &allocator)
            .unwrap()
            .with_entropy_policy(Arc::new(Halve));

        let seq = vec![0u8; 10];
        extender.extend_async(&seq, &seq, 6, &[SeedPair::new(5, 5)]).unwrap();
        extender.sync().unwrap();

        let result = extender.get_scored_segment_pairs();
        assert_eq!(result.len(), 0);

        extender.extend_async(&seq, &seq, 5, &[SeedPair::new(5, 5)]).unwrap();
        extender.sync().unwrap();
        assert_eq!(extender.get_scored_segment_pairs()[0].score, 5);
    }
}
