//! Per-frame command recording.
//!
//! One dynamic rendering scope per frame: every [`DrawRange`] of the shared
//! vertex/index buffers is drawn with its model slot pushed as a constant.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use mocap_resources::DrawRange;
use mocap_rhi::RhiResult;
use mocap_rhi::command::CommandBuffer;
use mocap_rhi::image::{Image, transition_image_layout};
use mocap_rhi::pipeline::{Pipeline, PipelineLayout};
use mocap_rhi::rendering::{ColorTarget, PassAttachments};

/// Stages that read [`DrawPush`].
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Per-draw push constants: which model matrix to use and whether to sample
/// the floor texture.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawPush {
    pub model_slot: u32,
    pub textured: u32,
}

impl DrawPush {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn range() -> vk::PushConstantRange {
        vk::PushConstantRange::default()
            .stage_flags(PUSH_CONSTANT_STAGES)
            .offset(0)
            .size(Self::SIZE)
    }
}

/// Arguments of one `vkCmdDrawIndexed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexedDraw {
    pub index_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
}

/// Push constants and draw arguments for one range.
///
/// Indices in the shared buffer are already absolute, so the vertex offset
/// is zero.
pub fn draw_command(range: &DrawRange) -> (DrawPush, IndexedDraw) {
    (
        DrawPush {
            model_slot: range.model_slot,
            textured: u32::from(range.textured),
        },
        IndexedDraw {
            index_count: range.index_count,
            first_index: range.first_index,
            vertex_offset: 0,
        },
    )
}

/// Viewport covering `extent` with the full depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Where this frame renders.
pub struct FrameTarget<'a> {
    /// The acquired chain image and its view.
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    /// Multisampled color target resolved into `image`, if any.
    pub msaa_color: Option<&'a Image>,
    pub depth: &'a Image,
}

/// What this frame draws.
pub struct SceneDraw<'a> {
    pub pipeline: &'a Pipeline,
    pub layout: &'a PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub draws: &'a [DrawRange],
}

/// Records the frame's command buffer.
#[derive(Clone, Copy, Debug)]
pub struct CommandRecorder {
    clear_color: [f32; 4],
}

impl CommandRecorder {
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self { clear_color }
    }

    /// Resets `cmd` and records the whole frame into it.
    ///
    /// The chain image leaves in `PRESENT_SRC_KHR`.
    pub fn record(
        &self,
        cmd: &CommandBuffer,
        target: &FrameTarget<'_>,
        scene: &SceneDraw<'_>,
    ) -> RhiResult<()> {
        cmd.restart()?;

        // Previous contents are discarded; every attachment is cleared.
        transition_image_layout(
            cmd,
            target.image,
            vk::ImageAspectFlags::COLOR,
            1,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )?;
        if let Some(msaa) = target.msaa_color {
            msaa.transition(
                cmd,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            )?;
        }
        target.depth.transition(
            cmd,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;

        let color = match target.msaa_color {
            Some(msaa) => ColorTarget {
                view: msaa.view(),
                clear: self.clear_color,
                resolve: Some(target.view),
            },
            None => ColorTarget {
                view: target.view,
                clear: self.clear_color,
                resolve: None,
            },
        };
        let pass = PassAttachments::new(target.extent, color, target.depth.view());

        cmd.render(&pass.info(), |cmd| {
            cmd.set_viewport_and_scissor(full_viewport(target.extent), pass.render_area());
            cmd.bind_graphics(
                scene.pipeline.handle(),
                scene.layout.handle(),
                scene.descriptor_set,
            );
            cmd.bind_mesh(scene.vertex_buffer, scene.index_buffer);

            for range in scene.draws {
                let (push, draw) = draw_command(range);
                cmd.push(scene.layout.handle(), PUSH_CONSTANT_STAGES, &push);
                cmd.draw_indexed(draw.index_count, draw.first_index, draw.vertex_offset);
            }
        });

        transition_image_layout(
            cmd,
            target.image,
            vk::ImageAspectFlags::COLOR,
            1,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )?;

        cmd.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constant_layout() {
        assert_eq!(DrawPush::SIZE, 8);
        let range = DrawPush::range();
        assert_eq!(range.size, 8);
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_draw_command_carries_slot_and_range() {
        let range = DrawRange {
            model_slot: 129,
            base_vertex: 40,
            first_index: 300,
            index_count: 36,
            textured: false,
        };
        let (push, draw) = draw_command(&range);
        assert_eq!(push, DrawPush { model_slot: 129, textured: 0 });
        assert_eq!(
            draw,
            IndexedDraw {
                index_count: 36,
                first_index: 300,
                vertex_offset: 0,
            }
        );
    }

    #[test]
    fn test_textured_flag() {
        let range = DrawRange {
            model_slot: 128,
            base_vertex: 0,
            first_index: 0,
            index_count: 6,
            textured: true,
        };
        assert_eq!(draw_command(&range).0.textured, 1);
    }

    #[test]
    fn test_viewport_covers_extent() {
        let vp = full_viewport(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!((vp.width, vp.height), (1280.0, 720.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));
    }
}
