//! Allocator-backed memory bound to exactly one buffer or image.
//!
//! [`BoundMemory`] frees its allocation on drop. Owners destroy their
//! Vulkan handle in their own `Drop`, which runs before field drops, so the
//! handle is always gone before its memory is returned.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{error, trace};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// The resource a [`BoundMemory`] backs.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Target {
    Buffer(vk::Buffer),
    Image(vk::Image),
}

impl Target {
    fn requirements(self, device: &ash::Device) -> vk::MemoryRequirements {
        unsafe {
            match self {
                Target::Buffer(buffer) => device.get_buffer_memory_requirements(buffer),
                Target::Image(image) => device.get_image_memory_requirements(image),
            }
        }
    }

    /// Images are always created with optimal tiling.
    fn is_linear(self) -> bool {
        matches!(self, Target::Buffer(_))
    }

    fn bind(self, device: &ash::Device, allocation: &Allocation) -> RhiResult<()> {
        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        unsafe {
            match self {
                Target::Buffer(buffer) => device.bind_buffer_memory(buffer, memory, offset)?,
                Target::Image(image) => device.bind_image_memory(image, memory, offset)?,
            }
        }
        Ok(())
    }
}

/// Property flags some allowed memory type must carry for `location`.
pub(crate) fn required_flags(location: MemoryLocation) -> vk::MemoryPropertyFlags {
    match location {
        MemoryLocation::GpuOnly => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        _ => vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    }
}

pub(crate) struct BoundMemory {
    name: &'static str,
    allocation: Option<Allocation>,
    device: Arc<Device>,
}

impl BoundMemory {
    /// Allocates memory for `target` in `location` and binds it.
    ///
    /// On error nothing is left allocated; the caller still owns `target`.
    pub(crate) fn bind(
        device: Arc<Device>,
        name: &'static str,
        target: Target,
        location: MemoryLocation,
    ) -> RhiResult<Self> {
        let requirements = target.requirements(device.handle());
        let memory_type = device
            .gpu()
            .find_memory_type(requirements.memory_type_bits, required_flags(location))?;

        let allocation = device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: target.is_linear(),
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        trace!(
            "{}: {} bytes from memory type {}",
            name, requirements.size, memory_type
        );

        let memory = Self {
            name,
            allocation: Some(allocation),
            device,
        };
        if let Some(allocation) = &memory.allocation {
            target.bind(memory.device.handle(), allocation)?;
        }
        Ok(memory)
    }

    /// Start of the persistent host mapping.
    pub(crate) fn host_ptr(&self) -> RhiResult<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|ptr| ptr.as_ptr().cast::<u8>())
            .ok_or_else(|| RhiError::InvalidHandle(format!("{} memory is not mapped", self.name)))
    }
}

impl Drop for BoundMemory {
    fn drop(&mut self) {
        let Some(allocation) = self.allocation.take() else {
            return;
        };
        match self.device.lock_allocator() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    error!("Failed to free {} memory: {:?}", self.name, e);
                }
            }
            Err(e) => error!("Leaking {} memory: {}", self.name, e),
        }
    }
}
