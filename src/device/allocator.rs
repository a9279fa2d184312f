use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::errors::ExtenderError;

/// Capacity-bounded allocator for device memory.
///
/// Cloning an allocator yields another handle to the same memory pool. Allocations are returned
/// to the pool when the last handle to the buffer that owns them is dropped.
#[derive(Clone)]
pub struct DeviceAllocator {
    inner: Arc<AllocatorInner>,
}

struct AllocatorInner {
    device_id: i32,
    capacity: usize,
    allocated: AtomicUsize,
}

impl DeviceAllocator {
    pub fn new(device_id: i32, capacity: usize) -> Self {
        Self {
            inner: Arc::new(AllocatorInner {
                device_id,
                capacity,
                allocated: AtomicUsize::new(0),
            })
        }
    }

    pub fn device_id(&self) -> i32 {
        self.inner.device_id
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn allocated(&self) -> usize {
        self.inner.allocated.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.capacity().saturating_sub(self.allocated())
    }

    pub(crate) fn reserve(&self, bytes: usize) -> Result<Allocation, ExtenderError> {
        let result = self.inner.allocated.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            current.checked_add(bytes)
                .filter(|total| *total <= self.inner.capacity)
        });

        match result {
            Ok(previous) => {
                trace!(bytes, in_use = previous + bytes, device = self.inner.device_id, "device allocation");
                Ok(Allocation { allocator: self.clone(), bytes })
            },
            Err(current) => Err(ExtenderError::Allocation {
                requested: bytes,
                available: self.inner.capacity.saturating_sub(current),
            })
        }
    }
}

impl fmt::Debug for DeviceAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAllocator")
            .field("device_id", &self.device_id())
            .field("capacity", &self.capacity())
            .field("allocated", &self.allocated())
            .finish()
    }
}

/// A reservation of device memory, released on drop.
pub(crate) struct Allocation {
    allocator: DeviceAllocator,
    bytes: usize,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.allocator.inner.allocated.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}
