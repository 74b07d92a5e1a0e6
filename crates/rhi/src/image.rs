//! GPU images, image views, layout transitions and mipmap generation.
//!
//! [`Image`] owns a VkImage, its allocator-managed device-local memory and
//! one view covering every mip level. Layout transitions are recorded into a
//! caller-provided command buffer; only the transitions the viewer performs
//! have access/stage masks, anything else is rejected with
//! [`RhiError::UnsupportedLayoutTransition`].

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use tracing::debug;

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::{BoundMemory, Target};
use crate::physical_device::has_stencil_component;

/// Creation parameters for an [`Image`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub samples: vk::SampleCountFlags,
    pub mip_levels: u32,
}

impl ImageDesc {
    /// Single-sample, single-level color image.
    pub fn color(
        name: &'static str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            name,
            extent,
            format,
            usage,
            aspect: vk::ImageAspectFlags::COLOR,
            samples: vk::SampleCountFlags::TYPE_1,
            mip_levels: 1,
        }
    }

    /// Depth attachment image; the stencil aspect is added when the format
    /// has one.
    pub fn depth(extent: vk::Extent2D, format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        Self {
            name: "depth",
            extent,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: depth_aspect(format),
            samples,
            mip_levels: 1,
        }
    }

    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }
}

/// Device-local image with a view over all of its mip levels.
pub struct Image {
    raw: vk::Image,
    view: vk::ImageView,
    desc: ImageDesc,
    /// Freed after `Drop::drop` has destroyed the image.
    _memory: BoundMemory,
    device: Arc<Device>,
}

impl Image {
    /// Creates the image, binds device-local memory and creates its view.
    ///
    /// # Errors
    ///
    /// Returns an error if no device-local memory type fits, allocation
    /// fails, or image/view creation fails.
    pub fn new(device: Arc<Device>, desc: ImageDesc) -> RhiResult<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(desc.samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let raw = unsafe { device.handle().create_image(&create_info, None)? };
        let bound = BoundMemory::bind(
            device.clone(),
            desc.name,
            Target::Image(raw),
            MemoryLocation::GpuOnly,
        )
        .and_then(|memory| {
            create_image_view(&device, raw, desc.format, desc.aspect, desc.mip_levels)
                .map(|view| (memory, view))
        });
        let (memory, view) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                unsafe { device.handle().destroy_image(raw, None) };
                return Err(e);
            }
        };

        debug!(
            "Created {} image {}x{} {:?} ({} mip level(s), {:?})",
            desc.name,
            desc.extent.width,
            desc.extent.height,
            desc.format,
            desc.mip_levels,
            desc.samples
        );

        Ok(Self {
            raw,
            view,
            desc,
            _memory: memory,
            device,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.raw
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.desc.samples
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.desc.aspect
    }

    /// Records a transition of every mip level from `old` to `new`.
    pub fn transition(
        &self,
        cmd: &CommandBuffer,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> RhiResult<()> {
        transition_image_layout(cmd, self.raw, self.desc.aspect, self.desc.mip_levels, old, new)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.raw, None);
        }
        debug!("Destroyed {} image", self.desc.name);
    }
}

/// Creates a 2D view over `mip_levels` levels of `image`.
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(subresource_range(aspect, 0, mip_levels));

    let view = unsafe { device.handle().create_image_view(&create_info, None)? };
    Ok(view)
}

/// Aspect mask for a depth format.
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil_component(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

fn subresource_range(
    aspect: vk::ImageAspectFlags,
    base_mip_level: u32,
    level_count: u32,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(base_mip_level)
        .level_count(level_count)
        .base_array_layer(0)
        .layer_count(1)
}

/// Access masks and pipeline stages for one layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Masks for the transitions the viewer performs.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedLayoutTransition`] for any other pair.
pub fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<TransitionMasks> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let masks = match (old, new) {
        // Texture upload target
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (
            A::empty(),
            A::TRANSFER_WRITE,
            S::TOP_OF_PIPE,
            S::TRANSFER,
        ),
        // Upload finished, sample from the fragment shader
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            A::TRANSFER_WRITE,
            A::SHADER_READ,
            S::TRANSFER,
            S::FRAGMENT_SHADER,
        ),
        // Depth target shared by both frames in flight: order after the
        // previous frame's depth writes.
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
        ),
        // Acquired swapchain image or shared multisampled target; the acquire
        // semaphore is waited on at COLOR_ATTACHMENT_OUTPUT.
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (
            A::COLOR_ATTACHMENT_WRITE,
            A::COLOR_ATTACHMENT_WRITE,
            S::COLOR_ATTACHMENT_OUTPUT,
            S::COLOR_ATTACHMENT_OUTPUT,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => (
            A::COLOR_ATTACHMENT_WRITE,
            A::empty(),
            S::COLOR_ATTACHMENT_OUTPUT,
            S::BOTTOM_OF_PIPE,
        ),
        _ => return Err(RhiError::UnsupportedLayoutTransition { old, new }),
    };

    Ok(TransitionMasks {
        src_access: masks.0,
        dst_access: masks.1,
        src_stage: masks.2,
        dst_stage: masks.3,
    })
}

/// Records a layout transition of `mip_levels` levels of `image`.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedLayoutTransition`] before recording
/// anything when the pair has no known masks.
pub fn transition_image_layout(
    cmd: &CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<()> {
    let masks = transition_masks(old, new)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(aspect, 0, mip_levels))
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    cmd.image_barrier(masks.src_stage, masks.dst_stage, barrier);
    Ok(())
}

/// Number of levels in a full mip chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Source and destination extents of each blit in a mip chain: level `i`
/// is produced from level `i - 1`, halving each axis but never below one.
pub fn mip_chain_extents(width: u32, height: u32, mip_levels: u32) -> Vec<(vk::Extent2D, vk::Extent2D)> {
    let mut src = vk::Extent2D { width, height };
    (1..mip_levels)
        .map(|_| {
            let dst = vk::Extent2D {
                width: (src.width / 2).max(1),
                height: (src.height / 2).max(1),
            };
            let step = (src, dst);
            src = dst;
            step
        })
        .collect()
}

/// Fills levels `1..mip_levels` of `image` by repeatedly blitting each
/// level into the next at half size.
///
/// Every level must be in `TRANSFER_DST_OPTIMAL` with level 0 already
/// written. On return every level is `SHADER_READ_ONLY_OPTIMAL`.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedFormat`] if `format` cannot be linearly
/// filtered in a blit on this device.
pub fn generate_mipmaps(
    device: &Device,
    cmd: &CommandBuffer,
    image: &Image,
) -> RhiResult<()> {
    let properties = device
        .gpu()
        .format_properties(device.instance(), image.format());
    if !properties
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        return Err(RhiError::UnsupportedFormat(format!(
            "{:?} does not support linear blitting",
            image.format()
        )));
    }

    let handle = image.handle();
    let aspect = vk::ImageAspectFlags::COLOR;
    let level_barrier = |level: u32,
                         old: vk::ImageLayout,
                         new: vk::ImageLayout,
                         src_access: vk::AccessFlags,
                         dst_access: vk::AccessFlags| {
        vk::ImageMemoryBarrier::default()
            .image(handle)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(subresource_range(aspect, level, 1))
            .old_layout(old)
            .new_layout(new)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
    };

    let extent = image.extent();
    for (i, (src, dst)) in mip_chain_extents(extent.width, extent.height, image.mip_levels())
        .into_iter()
        .enumerate()
    {
        let src_level = i as u32;
        let dst_level = src_level + 1;

        cmd.image_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            level_barrier(
                src_level,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::TRANSFER_READ,
            ),
        );

        let blit = vk::ImageBlit::default()
            .src_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: src.width as i32,
                    y: src.height as i32,
                    z: 1,
                },
            ])
            .src_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(aspect)
                    .mip_level(src_level)
                    .layer_count(1),
            )
            .dst_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: dst.width as i32,
                    y: dst.height as i32,
                    z: 1,
                },
            ])
            .dst_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(aspect)
                    .mip_level(dst_level)
                    .layer_count(1),
            );

        cmd.blit_mip(handle, blit);

        cmd.image_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            level_barrier(
                src_level,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::SHADER_READ,
            ),
        );
    }

    // The last level was only ever a blit destination.
    cmd.image_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        level_barrier(
            image.mip_levels() - 1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
        ),
    );

    debug!(
        "Recorded {} mip blit(s) for {}x{} image",
        image.mip_levels() - 1,
        extent.width,
        extent.height
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(512, 100), 10);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_mip_chain_ends_at_one_by_one() {
        let chain = mip_chain_extents(256, 64, mip_level_count(256, 64));
        assert_eq!(chain.len(), 8);

        let (_, last) = chain[chain.len() - 1];
        assert_eq!((last.width, last.height), (1, 1));

        // Each step halves the previous destination, clamping at one.
        for window in chain.windows(2) {
            assert_eq!(window[0].1, window[1].0);
        }
        assert_eq!(chain[6].1, vk::Extent2D { width: 2, height: 1 });
    }

    #[test]
    fn test_single_level_has_no_blits() {
        assert!(mip_chain_extents(1, 1, 1).is_empty());
    }

    #[test]
    fn test_upload_transitions_are_supported() {
        let to_dst = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_dst.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let to_read = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_read.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_present_transition() {
        let masks = transition_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn test_attachment_transitions_wait_for_previous_writes() {
        let depth = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .unwrap();
        assert!(depth.src_stage.contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
        assert_eq!(depth.src_access, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE);

        let color = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )
        .unwrap();
        assert_eq!(color.src_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(color.src_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn test_unknown_transition_is_rejected() {
        let err = transition_masks(
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RhiError::UnsupportedLayoutTransition { .. }
        ));
    }

    #[test]
    fn test_depth_aspect_includes_stencil_when_present() {
        assert_eq!(
            depth_aspect(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert!(depth_aspect(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }

    #[test]
    fn test_image_desc_clamps_mip_levels() {
        let desc = ImageDesc::color(
            "test",
            vk::Extent2D { width: 4, height: 4 },
            vk::Format::R8G8B8A8_SRGB,
            vk::ImageUsageFlags::SAMPLED,
        )
        .with_mip_levels(0);
        assert_eq!(desc.mip_levels, 1);
    }
}
