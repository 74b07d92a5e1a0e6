//! Renderer orchestration.
//!
//! [`Renderer`] owns every GPU object of the viewer and drives one frame per
//! [`Renderer::render_frame`] call through the [`FrameSequencer`].
//!
//! # Resource Destruction Order
//!
//! Fields drop in declaration order, which gives:
//! 1. Wait for all GPU work to complete (explicit, in `Drop`)
//! 2. Frame slots, uniforms, descriptors, pipeline, scene buffers
//! 3. The chain: MSAA target, depth target, image semaphores, swapchain
//! 4. Command pool, then the last device reference
//! 5. Surface
//! 6. Instance

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3};
use tracing::{debug, error, info};

use mocap_animation::{Evaluator, Skeleton};
use mocap_core::{PresentModePreference, ViewerConfig};
use mocap_platform::{Surface, Window};
use mocap_resources::texture::{grid_cell_image, load_image};
use mocap_resources::{DrawRange, SceneLayout, build_scene};
use mocap_rhi::buffer::{Buffer, BufferUsage};
use mocap_rhi::command::CommandPool;
use mocap_rhi::descriptor::{Binding, DescriptorPool, DescriptorSetLayout, SetWriter};
use mocap_rhi::device::Device;
use mocap_rhi::instance::Instance;
use mocap_rhi::physical_device::select_physical_device;
use mocap_rhi::pipeline::{CullMode, MeshPipelineDesc, Pipeline, PipelineLayout};
use mocap_rhi::shader::{Shader, ShaderStage};
use mocap_rhi::swapchain::PresentOutcome;
use mocap_rhi::texture::Texture;
use mocap_rhi::vertex::Vertex;
use mocap_scene::OrbitCamera;

use crate::chain::{ChainSettings, VulkanChain};
use crate::error::{RendererError, RendererResult};
use crate::frame_sync::{FrameBackend, FrameOutcome, FrameSequencer, FrameSlots, MAX_FRAMES_IN_FLIGHT};
use crate::recorder::{CommandRecorder, DrawPush, FrameTarget, SceneDraw};
use crate::render_targets::choose_sample_count;
use crate::swapchain_manager::{Acquired, RecreateOutcome, SwapchainManager, SwapchainState};
use crate::uniforms::{MODEL_UBO_SIZE, ModelLayout, SceneUbo, UniformUpdater};

const VERTEX_SHADER: &str = "skeleton.vert.spv";
const FRAGMENT_SHADER: &str = "skeleton.frag.spv";

/// Maps the configured preference onto a Vulkan present mode.
pub fn present_mode(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

/// Everything created from the device.
struct GpuState {
    slots: FrameSlots,
    uniforms: UniformUpdater,
    /// One per frame slot; freed with the pool.
    descriptor_sets: Vec<vk::DescriptorSet>,
    _descriptor_pool: DescriptorPool,
    _descriptor_layout: DescriptorSetLayout,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    _floor_texture: Texture,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    draws: Vec<DrawRange>,
    recorder: CommandRecorder,
    chain: SwapchainManager<VulkanChain>,
    /// Frame slot command buffers are allocated from here.
    _command_pool: CommandPool,
    /// Scratch space for the evaluated joint matrices.
    joints: Vec<Mat4>,
    device: Arc<Device>,
}

/// One frame's inputs bound to the GPU state.
struct FrameContext<'a> {
    gpu: &'a mut GpuState,
    evaluator: &'a Evaluator,
    time: f32,
    scene: SceneUbo,
}

impl FrameBackend for FrameContext<'_> {
    fn wait_slot(&mut self, slot: usize) -> RendererResult<()> {
        self.gpu.slots.get(slot).in_flight().wait(u64::MAX)?;
        Ok(())
    }

    fn acquire(&mut self, slot: usize) -> RendererResult<Acquired> {
        let signal = self.gpu.slots.get(slot).image_available().handle();
        self.gpu.chain.acquire_next(signal)
    }

    fn record(&mut self, slot: usize, image_index: u32) -> RendererResult<()> {
        let gpu = &mut *self.gpu;

        gpu.joints
            .resize(self.evaluator.joint_count(), Mat4::IDENTITY);
        self.evaluator.evaluate_into(self.time, &mut gpu.joints)?;
        gpu.uniforms.write(slot, &gpu.joints, &self.scene)?;

        let chain = gpu.chain.backend();
        let swapchain = chain.swapchain()?;
        let index = image_index as usize;
        let (Some(&image), Some(&view)) =
            (swapchain.images().get(index), swapchain.image_views().get(index))
        else {
            return Err(RendererError::MissingChainPart("swapchain image"));
        };
        let descriptor_set = *gpu
            .descriptor_sets
            .get(slot)
            .ok_or(RendererError::InvalidSlot(slot))?;

        let target = FrameTarget {
            image,
            view,
            extent: swapchain.extent(),
            msaa_color: chain.msaa_color(),
            depth: chain.depth()?,
        };
        let scene = SceneDraw {
            pipeline: &gpu.pipeline,
            layout: &gpu.pipeline_layout,
            descriptor_set,
            vertex_buffer: gpu.vertex_buffer.handle(),
            index_buffer: gpu.index_buffer.handle(),
            draws: &gpu.draws,
        };

        gpu.recorder
            .record(gpu.slots.get(slot).command_buffer(), &target, &scene)?;
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RendererResult<()> {
        let frame = self.gpu.slots.get(slot);
        let render_finished = self.gpu.chain.backend().render_finished(image_index)?;

        let wait_semaphores = [frame.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer().handle()];
        let signal_semaphores = [render_finished];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // Only reached after a successful acquire; skipped frames keep the
        // fence signaled.
        frame.in_flight().reset()?;

        unsafe {
            self.gpu
                .device
                .submit_graphics(&[submit_info], frame.in_flight().handle())?;
        }
        Ok(())
    }

    fn present(&mut self, _slot: usize, image_index: u32) -> RendererResult<PresentOutcome> {
        let wait = self.gpu.chain.backend().render_finished(image_index)?;
        let queue = self.gpu.device.present_queue();
        self.gpu.chain.present(queue, image_index, wait)
    }

    fn needs_recreate(&self) -> bool {
        self.gpu.chain.state() != SwapchainState::Valid
    }

    fn recreate(&mut self) -> RendererResult<()> {
        if let RecreateOutcome::Deferred = self.gpu.chain.recreate()? {
            debug!("Swapchain recreation deferred until the surface has an area");
        }
        Ok(())
    }
}

/// The viewer's renderer.
///
/// Fields are declared in destruction order.
pub struct Renderer {
    sequencer: FrameSequencer,
    gpu: GpuState,
    surface: Surface,
    instance: Instance,
}

impl Renderer {
    /// Creates every GPU object and builds the first swapchain generation.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created, a shader or
    /// the floor texture cannot be loaded, or the window has no drawable area.
    pub fn new(window: &Window, config: &ViewerConfig, skeleton: &Skeleton) -> RendererResult<Self> {
        let extent = window.framebuffer_extent();
        info!("Initializing renderer ({}x{})", extent.width, extent.height);

        let instance = Instance::new(
            c"Mocap Viewer",
            config.render.validation,
            window.raw_display_handle()?,
        )?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let gpu = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, gpu)?;

        let command_pool = CommandPool::new(device.clone(), device.queue_families().graphics)?;

        let settings = ChainSettings {
            present_mode: present_mode(config.render.present_mode),
            depth_format: device.gpu().find_depth_format(device.instance())?,
            samples: choose_sample_count(config.render.msaa, device.gpu().max_usable_sample_count()),
        };
        let mut chain = SwapchainManager::new(VulkanChain::new(
            device.clone(),
            surface.handle(),
            surface.loader().clone(),
            settings,
            extent,
        ));
        if let RecreateOutcome::Deferred = chain.recreate()? {
            return Err(RendererError::ZeroSizedSurface);
        }

        let geometry = build_scene(
            skeleton,
            &SceneLayout {
                floor_size: config.scene.floor_size,
                floor_divisions: config.scene.floor_divisions,
                floor_color: Vec3::from(config.scene.floor_color),
                axes_size: config.scene.axes_size,
            },
        )?;
        let vertex_buffer = Buffer::new_device_local(
            device.clone(),
            &command_pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&geometry.vertices),
        )?;
        let index_buffer = Buffer::new_device_local(
            device.clone(),
            &command_pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&geometry.indices),
        )?;
        info!(
            "Scene geometry: {} vertices, {} indices, {} draws",
            geometry.vertices.len(),
            geometry.indices.len(),
            geometry.draws.len()
        );

        let floor_image = match &config.scene.floor_texture {
            Some(path) => load_image(path)?,
            None => grid_cell_image(),
        };
        let floor_texture = Texture::from_rgba8(
            device.clone(),
            &command_pool,
            "floor",
            floor_image.width(),
            floor_image.height(),
            floor_image.as_raw(),
        )?;

        let descriptor_layout = DescriptorSetLayout::new(
            device.clone(),
            &[
                Binding::uniform(0, vk::ShaderStageFlags::VERTEX),
                Binding::uniform(1, vk::ShaderStageFlags::VERTEX),
                Binding::sampled_image(2, vk::ShaderStageFlags::FRAGMENT),
            ],
        )?;

        let color_format = chain
            .backend()
            .color_format()
            .ok_or(RendererError::MissingChainPart("swapchain"))?;
        let (pipeline, pipeline_layout) = Self::create_pipeline(
            device.clone(),
            &config.render.shader_dir,
            &descriptor_layout,
            color_format,
            chain.backend(),
        )?;

        let uniforms = UniformUpdater::new(
            device.clone(),
            MAX_FRAMES_IN_FLIGHT,
            ModelLayout {
                global_scale: config.scene.global_scale,
                show_axes: config.scene.show_axes,
            },
        )?;

        let descriptor_pool = DescriptorPool::for_layout(
            device.clone(),
            &descriptor_layout,
            MAX_FRAMES_IN_FLIGHT as u32,
        )?;
        let descriptor_sets = Self::create_descriptor_sets(
            &device,
            &descriptor_pool,
            &descriptor_layout,
            &uniforms,
            &floor_texture,
        )?;

        let slots = FrameSlots::new(device.clone(), &command_pool)?;

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight, {} joints",
            chain.backend().swapchain()?.image_count(),
            MAX_FRAMES_IN_FLIGHT,
            skeleton.len()
        );

        Ok(Self {
            sequencer: FrameSequencer::new(),
            gpu: GpuState {
                slots,
                uniforms,
                descriptor_sets,
                _descriptor_pool: descriptor_pool,
                _descriptor_layout: descriptor_layout,
                pipeline,
                pipeline_layout,
                _floor_texture: floor_texture,
                vertex_buffer,
                index_buffer,
                draws: geometry.draws,
                recorder: CommandRecorder::new(config.render.clear_color),
                chain,
                _command_pool: command_pool,
                joints: vec![Mat4::IDENTITY; skeleton.len()],
                device,
            },
            surface,
            instance,
        })
    }

    fn create_pipeline(
        device: Arc<Device>,
        shader_dir: &Path,
        descriptor_layout: &DescriptorSetLayout,
        color_format: vk::Format,
        chain: &VulkanChain,
    ) -> RendererResult<(Pipeline, PipelineLayout)> {
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join(VERTEX_SHADER),
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join(FRAGMENT_SHADER),
            ShaderStage::Fragment,
        )?;

        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[descriptor_layout.handle()],
            &[DrawPush::range()],
        )?;

        // The floor is seen from both sides.
        let pipeline = Pipeline::mesh(
            device,
            &pipeline_layout,
            &MeshPipelineDesc {
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                vertex_input: Vertex::input(),
                cull: CullMode::None,
                samples: chain.samples(),
                color_format,
                depth_format: Some(chain.depth_format()),
            },
        )?;

        info!(
            "Skeleton pipeline created ({:?}, x{} samples)",
            color_format,
            chain.samples().as_raw()
        );
        Ok((pipeline, pipeline_layout))
    }

    /// Points each slot's set at that slot's uniform buffers and the floor texture.
    fn create_descriptor_sets(
        device: &Device,
        pool: &DescriptorPool,
        layout: &DescriptorSetLayout,
        uniforms: &UniformUpdater,
        floor_texture: &Texture,
    ) -> RendererResult<Vec<vk::DescriptorSet>> {
        let sets = pool.allocate(layout, MAX_FRAMES_IN_FLIGHT)?;

        for (slot, &set) in sets.iter().enumerate() {
            let (Some(models), Some(scene)) =
                (uniforms.model_buffer(slot), uniforms.scene_buffer(slot))
            else {
                return Err(RendererError::InvalidSlot(slot));
            };

            SetWriter::new(set)
                .uniform(0, models.handle(), MODEL_UBO_SIZE as u64)
                .uniform(1, scene.handle(), SceneUbo::SIZE as u64)
                .sampled_image(2, floor_texture.sampler(), floor_texture.view())
                .apply(device);
            debug!("Descriptor set written for slot {}", slot);
        }

        Ok(sets)
    }

    /// Renders and presents one frame of `evaluator` at `time` seconds.
    ///
    /// # Errors
    ///
    /// Any error is fatal for the session.
    pub fn render_frame(
        &mut self,
        evaluator: &Evaluator,
        time: f32,
        camera: &OrbitCamera,
    ) -> RendererResult<FrameOutcome> {
        let extent = self.gpu.chain.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let scene = SceneUbo {
            view: camera.view_matrix(),
            proj: camera.projection_matrix(aspect),
        };

        let mut frame = FrameContext {
            gpu: &mut self.gpu,
            evaluator,
            time,
            scene,
        };
        self.sequencer.run_frame(&mut frame)
    }

    /// Records the window's new size; the chain is rebuilt on the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        debug!("Resize to {}x{}", width, height);
        self.gpu
            .chain
            .backend_mut()
            .set_requested_extent(vk::Extent2D { width, height });
        self.gpu.chain.invalidate();
    }

    /// Extent of the current swapchain generation.
    pub fn extent(&self) -> vk::Extent2D {
        self.gpu.chain.extent()
    }

    pub fn frame_counter(&self) -> u64 {
        self.sequencer.frame_counter()
    }

    pub fn show_axes(&self) -> bool {
        self.gpu.uniforms.layout().show_axes
    }

    pub fn set_show_axes(&mut self, show: bool) {
        self.gpu.uniforms.set_show_axes(show);
    }

    /// Whether the validation layer is routing messages to the log.
    pub fn validation_enabled(&self) -> bool {
        self.instance.has_validation()
    }

    /// Blocks until the GPU is idle.
    pub fn wait_idle(&self) -> RendererResult<()> {
        self.gpu.device.wait_idle()?;
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }
        info!(
            "Renderer shutting down after {} frames",
            self.sequencer.frame_counter()
        );
        debug!("Releasing surface {:?}", self.surface.handle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_mode_mapping() {
        assert_eq!(
            present_mode(PresentModePreference::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(present_mode(PresentModePreference::Fifo), vk::PresentModeKHR::FIFO);
        assert_eq!(
            present_mode(PresentModePreference::Immediate),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn test_shader_names_are_spirv() {
        assert!(VERTEX_SHADER.ends_with(".vert.spv"));
        assert!(FRAGMENT_SHADER.ends_with(".frag.spv"));
    }
}
