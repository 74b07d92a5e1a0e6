//! Vertex, index, uniform and staging buffers.
//!
//! Geometry is uploaded once into device-local memory through a staging
//! copy. Uniform buffers stay persistently mapped so the per-frame update
//! is a plain memory copy.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mocap_rhi::buffer::{Buffer, BufferUsage};
//! use mocap_rhi::command::CommandPool;
//! use mocap_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), mocap_rhi::RhiError> {
//! let indices: [u32; 3] = [0, 1, 2];
//! let indices = Buffer::new_device_local(device, pool, BufferUsage::Index, bytemuck::cast_slice(&indices))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use tracing::debug;

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::{BoundMemory, Target};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local, filled by a transfer.
    Vertex,
    /// Device-local `u32` indices, filled by a transfer.
    Index,
    /// Host-visible and mapped.
    Uniform,
    /// Host-visible transfer source.
    Staging,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        use vk::BufferUsageFlags as F;
        match self {
            BufferUsage::Vertex => F::VERTEX_BUFFER | F::TRANSFER_DST,
            BufferUsage::Index => F::INDEX_BUFFER | F::TRANSFER_DST,
            BufferUsage::Uniform => F::UNIFORM_BUFFER,
            BufferUsage::Staging => F::TRANSFER_SRC,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        if self.is_host_written() {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        }
    }

    fn is_host_written(self) -> bool {
        matches!(self, BufferUsage::Uniform | BufferUsage::Staging)
    }

    fn label(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex buffer",
            BufferUsage::Index => "index buffer",
            BufferUsage::Uniform => "uniform buffer",
            BufferUsage::Staging => "staging buffer",
        }
    }
}

pub struct Buffer {
    raw: vk::Buffer,
    len: vk::DeviceSize,
    usage: BufferUsage,
    memory: BoundMemory,
    device: Arc<Device>,
}

impl Buffer {
    /// Creates an uninitialized `len`-byte buffer.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] for an empty buffer, otherwise the
    /// creation or allocation failure.
    pub fn new(device: Arc<Device>, usage: BufferUsage, len: vk::DeviceSize) -> RhiResult<Self> {
        if len == 0 {
            return Err(RhiError::InvalidHandle(format!("empty {}", usage.label())));
        }

        let info = vk::BufferCreateInfo::default()
            .size(len)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let raw = unsafe { device.handle().create_buffer(&info, None)? };

        let memory = BoundMemory::bind(
            device.clone(),
            usage.label(),
            Target::Buffer(raw),
            usage.memory_location(),
        )
        .inspect_err(|_| unsafe { device.handle().destroy_buffer(raw, None) })?;

        debug!("{}: {} bytes", usage.label(), len);
        Ok(Self {
            raw,
            len,
            usage,
            memory,
            device,
        })
    }

    /// Mapped transfer source holding a copy of `bytes`.
    pub fn staging(device: Arc<Device>, bytes: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, BufferUsage::Staging, bytes.len() as vk::DeviceSize)?;
        buffer.write(0, bytes)?;
        Ok(buffer)
    }

    /// Uploads `bytes` into a new device-local buffer.
    ///
    /// Blocks until the copy has executed; the staging buffer is gone when
    /// this returns.
    pub fn new_device_local(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        bytes: &[u8],
    ) -> RhiResult<Self> {
        let staging = Self::staging(device.clone(), bytes)?;
        let buffer = Self::new(device, usage, staging.len)?;
        pool.run_blocking(|cmd| {
            cmd.copy_buffer(staging.raw, buffer.raw, staging.len);
            Ok(())
        })?;
        Ok(buffer)
    }

    /// Copies `bytes` to `offset` through the host mapping.
    ///
    /// # Errors
    ///
    /// Fails for device-local buffers and for writes past the end.
    pub fn write(&self, offset: vk::DeviceSize, bytes: &[u8]) -> RhiResult<()> {
        check_range(self.len, offset, bytes.len())?;
        if bytes.is_empty() {
            return Ok(());
        }
        let base = self.memory.host_ptr()?;
        // SAFETY: the range lies inside this buffer's mapped allocation.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), base.add(offset as usize), bytes.len());
        }
        Ok(())
    }

    pub fn write_pod<T: bytemuck::Pod>(&self, value: &T) -> RhiResult<()> {
        self.write(0, bytemuck::bytes_of(value))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.raw
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_buffer(self.raw, None) };
        debug!("{} destroyed", self.usage.label());
    }
}

fn check_range(len: vk::DeviceSize, offset: vk::DeviceSize, count: usize) -> RhiResult<()> {
    match offset.checked_add(count as vk::DeviceSize) {
        Some(end) if end <= len => Ok(()),
        _ => Err(RhiError::InvalidHandle(format!(
            "write of {count} bytes at {offset} overruns a {len}-byte buffer"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_is_transfer_destination() {
        for usage in [BufferUsage::Vertex, BufferUsage::Index] {
            assert!(usage.to_vk_usage().contains(vk::BufferUsageFlags::TRANSFER_DST));
            assert_eq!(usage.memory_location(), MemoryLocation::GpuOnly);
        }
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER)
        );
    }

    #[test]
    fn test_host_written_buffers_are_mappable() {
        assert_eq!(BufferUsage::Uniform.memory_location(), MemoryLocation::CpuToGpu);
        assert_eq!(BufferUsage::Staging.memory_location(), MemoryLocation::CpuToGpu);
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_write_range_checks() {
        assert!(check_range(64, 0, 64).is_ok());
        assert!(check_range(64, 60, 4).is_ok());
        assert!(check_range(64, 60, 8).is_err());
        assert!(check_range(64, u64::MAX, 1).is_err());
    }
}
