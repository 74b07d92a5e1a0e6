//! Command pools and the recording calls the viewer issues.
//!
//! Frame recording goes through [`CommandBuffer::restart`] and a
//! [`CommandBuffer::render`] scope; uploads go through
//! [`CommandPool::run_blocking`], which owns a throwaway buffer and fence.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mocap_rhi::command::{CommandBuffer, CommandPool};
//! use mocap_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>, family: u32) -> Result<(), mocap_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone(), family)?;
//! let cmd = CommandBuffer::new(device, &pool)?;
//! cmd.restart()?;
//! cmd.finish()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::sync::{Fence, FenceState};

/// Pool of resettable primary buffers for one queue family.
///
/// Externally synchronized; everything records from the event-loop thread.
pub struct CommandPool {
    raw: vk::CommandPool,
    family: u32,
    device: Arc<Device>,
}

impl CommandPool {
    pub fn new(device: Arc<Device>, family: u32) -> RhiResult<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let raw = unsafe { device.handle().create_command_pool(&info, None)? };
        debug!("Command pool for queue family {}", family);
        Ok(Self {
            raw,
            family,
            device,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.raw
    }

    fn allocate_one(&self) -> RhiResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.raw)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        unsafe { self.device.handle().allocate_command_buffers(&info)? }
            .pop()
            .ok_or(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_HOST_MEMORY))
    }

    /// Records `record` into a fresh buffer, submits it on the graphics
    /// queue and waits for it to execute. The buffer is freed either way.
    pub fn run_blocking<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        let cmd = CommandBuffer::new(self.device.clone(), self)?;
        let result = self.execute(&cmd, record);
        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.raw, &[cmd.handle()])
        };
        result
    }

    fn execute<F>(&self, cmd: &CommandBuffer, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        cmd.restart()?;
        record(cmd)?;
        cmd.finish()?;

        let fence = Fence::new(self.device.clone(), FenceState::Unsignaled)?;
        let buffers = [cmd.handle()];
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);
        unsafe { self.device.submit_graphics(&[submit], fence.handle())? };
        fence.wait(u64::MAX)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_command_pool(self.raw, None) };
        debug!("Command pool for queue family {} destroyed", self.family);
    }
}

/// A primary buffer borrowed from a [`CommandPool`]; freed with the pool.
pub struct CommandBuffer {
    raw: vk::CommandBuffer,
    device: Arc<Device>,
}

impl CommandBuffer {
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        Ok(Self {
            raw: pool.allocate_one()?,
            device,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.raw
    }

    #[inline]
    fn ash(&self) -> &ash::Device {
        self.device.handle()
    }

    /// Drops previous contents and begins a one-time-submit recording.
    pub fn restart(&self) -> RhiResult<()> {
        let begin = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.ash()
                .reset_command_buffer(self.raw, vk::CommandBufferResetFlags::empty())?;
            self.ash().begin_command_buffer(self.raw, &begin)?;
        }
        Ok(())
    }

    pub fn finish(&self) -> RhiResult<()> {
        unsafe { self.ash().end_command_buffer(self.raw)? };
        Ok(())
    }

    /// Records `body` inside a dynamic rendering scope.
    pub fn render(&self, info: &vk::RenderingInfo<'_>, body: impl FnOnce(&Self)) {
        unsafe { self.ash().cmd_begin_rendering(self.raw, info) };
        body(self);
        unsafe { self.ash().cmd_end_rendering(self.raw) };
    }

    pub fn set_viewport_and_scissor(&self, viewport: vk::Viewport, scissor: vk::Rect2D) {
        unsafe {
            self.ash().cmd_set_viewport(self.raw, 0, &[viewport]);
            self.ash().cmd_set_scissor(self.raw, 0, &[scissor]);
        }
    }

    /// Binds a graphics pipeline together with its single descriptor set.
    pub fn bind_graphics(
        &self,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        let point = vk::PipelineBindPoint::GRAPHICS;
        unsafe {
            self.ash().cmd_bind_pipeline(self.raw, point, pipeline);
            self.ash()
                .cmd_bind_descriptor_sets(self.raw, point, layout, 0, &[set], &[]);
        }
    }

    /// Binds a vertex buffer at binding 0 and a `u32` index buffer.
    pub fn bind_mesh(&self, vertices: vk::Buffer, indices: vk::Buffer) {
        unsafe {
            self.ash().cmd_bind_vertex_buffers(self.raw, 0, &[vertices], &[0]);
            self.ash()
                .cmd_bind_index_buffer(self.raw, indices, 0, vk::IndexType::UINT32);
        }
    }

    pub fn push<T: bytemuck::Pod>(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        value: &T,
    ) {
        unsafe {
            self.ash()
                .cmd_push_constants(self.raw, layout, stages, 0, bytemuck::bytes_of(value));
        }
    }

    /// Single-instance indexed draw.
    pub fn draw_indexed(&self, index_count: u32, first_index: u32, vertex_offset: i32) {
        unsafe {
            self.ash()
                .cmd_draw_indexed(self.raw, index_count, 1, first_index, vertex_offset, 0);
        }
    }

    pub fn image_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: vk::ImageMemoryBarrier<'_>,
    ) {
        unsafe {
            self.ash().cmd_pipeline_barrier(
                self.raw,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    /// Copies the first `size` bytes of `src` to the start of `dst`.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy::default().size(size);
        unsafe { self.ash().cmd_copy_buffer(self.raw, src, dst, &[region]) };
    }

    /// Copies tightly packed texels into `dst`, which must be in
    /// `TRANSFER_DST_OPTIMAL`.
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, dst: vk::Image, region: vk::BufferImageCopy) {
        unsafe {
            self.ash().cmd_copy_buffer_to_image(
                self.raw,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    /// Linear blit between two mip levels of the same image.
    pub fn blit_mip(&self, image: vk::Image, blit: vk::ImageBlit) {
        unsafe {
            self.ash().cmd_blit_image(
                self.raw,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
        }
    }
}
