use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::ThreadPool;

use super::allocator::{Allocation, DeviceAllocator};
use super::stream::{ComputeStream, FaultTracker};
use crate::errors::{ConfigurationError, ExtenderError};

/// A fixed-size, zero-initialized array in device memory.
///
/// A `DeviceBuffer` behaves like a device pointer: cloning it creates another handle to the same
/// memory, which is how buffers are handed to work scheduled on a [`ComputeStream`]. The memory
/// returns to its allocator once the last handle is dropped, so buffers referenced by
/// outstanding work stay alive until that work has run.
///
/// The contents are only meaningful to the host after synchronizing the stream that wrote them.
pub struct DeviceBuffer<T> {
    data: Arc<RwLock<Vec<T>>>,
    len: usize,
    device_id: i32,
    _allocation: Arc<Allocation>,
}

impl<T> DeviceBuffer<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    /// Whether both handles refer to the same device memory.
    pub fn same_memory(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl<T> DeviceBuffer<T>
where
    T: Copy + Default + Send + Sync + 'static,
{
    pub fn new(len: usize, allocator: &DeviceAllocator) -> Result<Self, ExtenderError> {
        let allocation = allocator.reserve(len.saturating_mul(mem::size_of::<T>()))?;

        Ok(Self {
            data: Arc::new(RwLock::new(vec![T::default(); len])),
            len,
            device_id: allocator.device_id(),
            _allocation: Arc::new(allocation),
        })
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        // Kernels may read the same buffer through several handles
        self.data.read_recursive()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.data.write()
    }
}

impl<T> Clone for DeviceBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            len: self.len,
            device_id: self.device_id,
            _allocation: Arc::clone(&self._allocation),
        }
    }
}

impl<T> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("len", &self.len)
            .field("device_id", &self.device_id)
            .finish()
    }
}

/// Asynchronously copy `src` to the start of `dst` on `stream`.
///
/// The host data is staged at the call, so the caller may reuse `src` immediately.
pub fn device_copy_n<T>(src: &[T], dst: &DeviceBuffer<T>, stream: &ComputeStream) -> Result<(), ExtenderError>
where
    T: Copy + Default + Send + Sync + 'static,
{
    stage_copy(src, dst, stream, None)
}

pub(crate) fn stage_copy<T>(
    src: &[T],
    dst: &DeviceBuffer<T>,
    stream: &ComputeStream,
    tracker: Option<&FaultTracker>,
) -> Result<(), ExtenderError>
where
    T: Copy + Default + Send + Sync + 'static,
{
    if src.len() > dst.len() {
        return Err(ConfigurationError::InsufficientBuffer {
            name: "copy destination",
            required: src.len(),
            capacity: dst.len(),
        }.into());
    }

    let staged = src.to_vec();
    let dst = dst.clone();
    let copy = move |_: &ThreadPool| -> Result<(), ExtenderError> {
        dst.write()[..staged.len()].copy_from_slice(&staged);
        Ok(())
    };

    match tracker {
        Some(tracker) => stream.enqueue_tracked(copy, tracker),
        None => stream.enqueue(copy),
    }
}

/// Synchronously copy the whole of `src` back to the host, after all work on `stream` completed.
pub fn copy_to_host<T>(src: &DeviceBuffer<T>, stream: &ComputeStream) -> Result<Vec<T>, ExtenderError>
where
    T: Copy + Default + Send + Sync + 'static,
{
    stream.synchronize()?;
    Ok(src.read().clone())
}

/// Synchronously read the first element of `src`, after all work on `stream` completed.
pub fn get_value_from_device<T>(src: &DeviceBuffer<T>, stream: &ComputeStream) -> Result<T, ExtenderError>
where
    T: Copy + Default + Send + Sync + 'static,
{
    stream.synchronize()?;
    src.read().first()
        .copied()
        .ok_or_else(|| ConfigurationError::InsufficientBuffer { name: "source", required: 1, capacity: 0 }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_through_stream() {
        let allocator = DeviceAllocator::new(0, 1024);
        let stream = ComputeStream::with_threads(1).unwrap();

        let buffer = DeviceBuffer::<i32>::new(4, &allocator).unwrap();
        assert_eq!(allocator.allocated(), 16);

        device_copy_n(&[7, 8], &buffer, &stream).unwrap();
        assert_eq!(copy_to_host(&buffer, &stream).unwrap(), vec![7, 8, 0, 0]);
        assert_eq!(get_value_from_device(&buffer, &stream).unwrap(), 7);
    }

    #[test]
    fn test_copy_too_large() {
        let allocator = DeviceAllocator::new(0, 1024);
        let stream = ComputeStream::with_threads(1).unwrap();
        let buffer = DeviceBuffer::<u8>::new(2, &allocator).unwrap();

        let err = device_copy_n(&[1, 2, 3], &buffer, &stream).unwrap_err();
        assert!(matches!(
            err,
            ExtenderError::Configuration(ConfigurationError::InsufficientBuffer { required: 3, capacity: 2, .. })
        ));
    }

    #[test]
    fn test_memory_released_with_last_handle() {
        let allocator = DeviceAllocator::new(0, 100);
        let buffer = DeviceBuffer::<u8>::new(100, &allocator).unwrap();
        let handle = buffer.clone();
        assert!(handle.same_memory(&buffer));

        assert!(DeviceBuffer::<u8>::new(1, &allocator).is_err());

        drop(buffer);
        assert_eq!(allocator.available(), 0);

        drop(handle);
        assert_eq!(allocator.available(), 100);
    }

    fn shape<T>(buffer: &DeviceBuffer<T>) -> (usize, bool, i32) {
        (buffer.len(), buffer.is_empty(), buffer.device_id())
    }

    #[test]
    fn test_accessors_need_no_element_bounds() {
        let allocator = DeviceAllocator::new(3, 1024);
        let buffer = DeviceBuffer::<u32>::new(5, &allocator).unwrap();
        let empty = DeviceBuffer::<u8>::new(0, &allocator).unwrap();

        assert_eq!(shape(&buffer), (5, false, 3));
        assert_eq!(shape(&empty), (0, true, 3));
    }

    #[test]
    fn test_tracked_copy_skipped_after_fault() {
        let allocator = DeviceAllocator::new(0, 1024);
        let stream = ComputeStream::with_threads(1).unwrap();
        let buffer = DeviceBuffer::<u8>::new(2, &allocator).unwrap();
        let tracker = FaultTracker::new();

        stream.enqueue(|_| Err(ExtenderError::InvalidSequence("boom".to_string()))).unwrap();
        stage_copy(&[1, 2], &buffer, &stream, Some(&tracker)).unwrap();

        assert!(stream.synchronize().is_err());
        assert!(tracker.is_faulted());
        assert_eq!(copy_to_host(&buffer, &stream).unwrap(), vec![0, 0]);
    }
}
