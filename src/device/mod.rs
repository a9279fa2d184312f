//! In-process model of an accelerator: ordered compute streams, a capacity-bounded memory
//! allocator and device-resident buffers.

pub mod allocator;
pub mod buffer;
pub mod stream;

pub use allocator::DeviceAllocator;
pub use buffer::{copy_to_host, device_copy_n, get_value_from_device, DeviceBuffer};
pub use stream::{ComputeStream, FaultTracker};

/// Default amount of device memory for a newly created allocator, 1 GiB.
pub const DEFAULT_DEVICE_MEMORY: usize = 1 << 30;

/// Create an allocator for device 0 managing `max_bytes` of memory.
pub fn create_default_device_allocator(max_bytes: usize) -> DeviceAllocator {
    DeviceAllocator::new(0, max_bytes)
}
