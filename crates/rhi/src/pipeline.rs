//! Pipeline layout and the dynamic-rendering mesh pipeline.
//!
//! Every draw in the viewer goes through one pipeline: indexed triangle
//! lists of [`Vertex`](crate::vertex::Vertex), depth tested, with viewport
//! and scissor left dynamic so a resized chain never forces a rebuild.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;
use crate::vertex::VertexInput;

/// Set layouts plus push-constant ranges.
pub struct PipelineLayout {
    raw: vk::PipelineLayout,
    device: Arc<Device>,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_ranges);
        let raw = unsafe { device.handle().create_pipeline_layout(&info, None)? };
        debug!(
            "Pipeline layout: {} set(s), {} push range(s)",
            set_layouts.len(),
            push_ranges.len()
        );
        Ok(Self { raw, device })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.raw
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline_layout(self.raw, None) };
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    /// Both faces drawn; the floor is visible from below.
    None,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Everything that varies between mesh pipelines.
///
/// Front faces are counter-clockwise, matching the procedural shapes.
#[derive(Clone, Copy)]
pub struct MeshPipelineDesc<'a> {
    pub vertex_shader: &'a Shader,
    pub fragment_shader: &'a Shader,
    pub vertex_input: VertexInput,
    pub cull: CullMode,
    pub samples: vk::SampleCountFlags,
    pub color_format: vk::Format,
    /// `None` renders without a depth attachment.
    pub depth_format: Option<vk::Format>,
}

impl MeshPipelineDesc<'_> {
    fn depth_state(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        let depth = self.depth_format.is_some();
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth)
            .depth_write_enable(depth)
            .depth_compare_op(vk::CompareOp::LESS)
            .max_depth_bounds(1.0)
    }

    fn raster_state(&self) -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(self.cull.to_vk())
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0)
    }
}

const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// A compiled graphics pipeline.
pub struct Pipeline {
    raw: vk::Pipeline,
    device: Arc<Device>,
}

impl Pipeline {
    /// Compiles `desc` against `layout`.
    ///
    /// # Errors
    ///
    /// The driver's creation error, or [`RhiError::PipelineError`] if it
    /// returns no pipeline.
    pub fn mesh(
        device: Arc<Device>,
        layout: &PipelineLayout,
        desc: &MeshPipelineDesc<'_>,
    ) -> RhiResult<Self> {
        let stages = [
            desc.vertex_shader.stage_create_info(),
            desc.fragment_shader.stage_create_info(),
        ];
        let bindings = [desc.vertex_input.binding];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&desc.vertex_input.attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let raster = desc.raster_state();
        let multisample =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(desc.samples);
        let depth = desc.depth_state();
        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let color_formats = [desc.color_format];
        let mut rendering =
            vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);
        if let Some(format) = desc.depth_format {
            rendering = rendering.depth_attachment_format(format);
        }

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&raster)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth)
            .color_blend_state(&blend)
            .dynamic_state(&dynamic)
            .layout(layout.handle())
            .push_next(&mut rendering);

        let raw = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
                .map_err(|(_, err)| err)?
        }
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))?;

        info!(
            "Mesh pipeline compiled: {:?}, {:?}, cull {:?}",
            desc.color_format, desc.samples, desc.cull
        );
        Ok(Self { raw, device })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.raw
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline(self.raw, None) };
        debug!("Mesh pipeline destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::default().to_vk(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn test_viewport_and_scissor_are_dynamic() {
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::VIEWPORT));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::SCISSOR));
    }
}
