//! Descriptor layouts described by typed bindings, a pool sized from a
//! layout, and a builder for the per-set writes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use mocap_rhi::descriptor::{Binding, DescriptorPool, DescriptorSetLayout, SetWriter};
//! use mocap_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>, ubo: vk::Buffer) -> Result<(), mocap_rhi::RhiError> {
//! let layout = DescriptorSetLayout::new(
//!     device.clone(),
//!     &[Binding::uniform(0, vk::ShaderStageFlags::VERTEX)],
//! )?;
//! let pool = DescriptorPool::for_layout(device.clone(), &layout, 2)?;
//! for set in pool.allocate(&layout, 2)? {
//!     SetWriter::new(set).uniform(0, ubo, 64).apply(&device);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// What a binding holds. Each binding is a single descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer,
    SampledImage,
}

impl BindingKind {
    fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            BindingKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            BindingKind::SampledImage => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub slot: u32,
    pub kind: BindingKind,
    pub stages: vk::ShaderStageFlags,
}

impl Binding {
    pub const fn uniform(slot: u32, stages: vk::ShaderStageFlags) -> Self {
        Self {
            slot,
            kind: BindingKind::UniformBuffer,
            stages,
        }
    }

    /// Combined image sampler.
    pub const fn sampled_image(slot: u32, stages: vk::ShaderStageFlags) -> Self {
        Self {
            slot,
            kind: BindingKind::SampledImage,
            stages,
        }
    }

    fn to_vk(self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.slot)
            .descriptor_type(self.kind.descriptor_type())
            .descriptor_count(1)
            .stage_flags(self.stages)
    }
}

/// Pool sizes that fit `set_count` sets of `bindings`, one entry per kind.
pub fn pool_sizes(bindings: &[Binding], set_count: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        let ty = binding.kind.descriptor_type();
        match sizes.iter_mut().find(|size| size.ty == ty) {
            Some(size) => size.descriptor_count += set_count,
            None => sizes.push(
                vk::DescriptorPoolSize::default()
                    .ty(ty)
                    .descriptor_count(set_count),
            ),
        }
    }
    sizes
}

/// A set layout that remembers its bindings.
pub struct DescriptorSetLayout {
    raw: vk::DescriptorSetLayout,
    bindings: Vec<Binding>,
    device: Arc<Device>,
}

impl DescriptorSetLayout {
    pub fn new(device: Arc<Device>, bindings: &[Binding]) -> RhiResult<Self> {
        let vk_bindings: Vec<_> = bindings.iter().map(|b| b.to_vk()).collect();
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let raw = unsafe { device.handle().create_descriptor_set_layout(&info, None)? };
        debug!("Descriptor set layout: {:?}", bindings);
        Ok(Self {
            raw,
            bindings: bindings.to_vec(),
            device,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.raw
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.raw, None)
        };
    }
}

/// Pool whose sets live until the pool is dropped.
pub struct DescriptorPool {
    raw: vk::DescriptorPool,
    device: Arc<Device>,
}

impl DescriptorPool {
    /// A pool with room for exactly `set_count` sets of `layout`.
    pub fn for_layout(
        device: Arc<Device>,
        layout: &DescriptorSetLayout,
        set_count: u32,
    ) -> RhiResult<Self> {
        let sizes = pool_sizes(layout.bindings(), set_count);
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(set_count)
            .pool_sizes(&sizes);
        let raw = unsafe { device.handle().create_descriptor_pool(&info, None)? };
        debug!("Descriptor pool for {} set(s)", set_count);
        Ok(Self { raw, device })
    }

    /// Allocates `count` sets of `layout`.
    pub fn allocate(
        &self,
        layout: &DescriptorSetLayout,
        count: usize,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.handle(); count];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.raw)
            .set_layouts(&layouts);
        Ok(unsafe { self.device.handle().allocate_descriptor_sets(&info)? })
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_descriptor_pool(self.raw, None) };
    }
}

enum Resource {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

/// Collects the writes for one set and applies them in a single update.
pub struct SetWriter {
    set: vk::DescriptorSet,
    entries: Vec<(u32, Resource)>,
}

impl SetWriter {
    pub fn new(set: vk::DescriptorSet) -> Self {
        Self {
            set,
            entries: Vec::new(),
        }
    }

    /// The first `range` bytes of `buffer` at `slot`.
    pub fn uniform(mut self, slot: u32, buffer: vk::Buffer, range: vk::DeviceSize) -> Self {
        let info = vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(0)
            .range(range);
        self.entries.push((slot, Resource::Buffer(info)));
        self
    }

    /// A shader-read-only image with its sampler at `slot`.
    pub fn sampled_image(mut self, slot: u32, sampler: vk::Sampler, view: vk::ImageView) -> Self {
        let info = vk::DescriptorImageInfo::default()
            .sampler(sampler)
            .image_view(view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        self.entries.push((slot, Resource::Image(info)));
        self
    }

    fn writes(&self) -> Vec<vk::WriteDescriptorSet<'_>> {
        self.entries
            .iter()
            .map(|(slot, resource)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(*slot);
                match resource {
                    Resource::Buffer(info) => write
                        .descriptor_type(BindingKind::UniformBuffer.descriptor_type())
                        .buffer_info(std::slice::from_ref(info)),
                    Resource::Image(info) => write
                        .descriptor_type(BindingKind::SampledImage.descriptor_type())
                        .image_info(std::slice::from_ref(info)),
                }
            })
            .collect()
    }

    pub fn apply(self, device: &Device) {
        let writes = self.writes();
        if writes.is_empty() {
            return;
        }
        unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINDINGS: [Binding; 3] = [
        Binding::uniform(0, vk::ShaderStageFlags::VERTEX),
        Binding::uniform(1, vk::ShaderStageFlags::VERTEX),
        Binding::sampled_image(2, vk::ShaderStageFlags::FRAGMENT),
    ];

    #[test]
    fn test_binding_to_vk() {
        let raw = BINDINGS[2].to_vk();
        assert_eq!(raw.binding, 2);
        assert_eq!(raw.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(raw.descriptor_count, 1);
        assert_eq!(raw.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_pool_sizes_merge_by_kind() {
        let sizes = pool_sizes(&BINDINGS, 2);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 4);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 2);
    }

    #[test]
    fn test_set_writer_targets_each_slot() {
        let writer = SetWriter::new(vk::DescriptorSet::null())
            .uniform(0, vk::Buffer::null(), 256)
            .sampled_image(2, vk::Sampler::null(), vk::ImageView::null());
        let writes = writer.writes();

        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].dst_binding, 0);
        assert_eq!(writes[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(writes[0].descriptor_count, 1);
        assert!(!writes[0].p_buffer_info.is_null());
        assert_eq!(writes[1].dst_binding, 2);
        assert!(!writes[1].p_image_info.is_null());
    }
}
