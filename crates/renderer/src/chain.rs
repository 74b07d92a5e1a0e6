//! Vulkan implementation of [`ChainBackend`].

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use mocap_rhi::device::Device;
use mocap_rhi::image::Image;
use mocap_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use mocap_rhi::sync::Semaphore;

use crate::error::{RendererError, RendererResult};
use crate::render_targets::{TargetFormats, create_color_target, create_depth_target};
use crate::swapchain_manager::{ChainBackend, ChainPart};

/// Creation parameters that do not change across generations.
pub struct ChainSettings {
    pub present_mode: vk::PresentModeKHR,
    pub depth_format: vk::Format,
    pub samples: vk::SampleCountFlags,
}

/// The swapchain and everything sized from it.
///
/// The surface is borrowed by handle; its owner must outlive this value.
pub struct VulkanChain {
    device: Arc<Device>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    settings: ChainSettings,
    /// Window size, used when the surface leaves the extent to the swapchain.
    requested: vk::Extent2D,
    /// Chain format of the first generation; later generations must match.
    color_format: Option<vk::Format>,
    swapchain: Option<Swapchain>,
    render_finished: Vec<Semaphore>,
    depth: Option<Image>,
    msaa_color: Option<Image>,
}

impl VulkanChain {
    pub fn new(
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        settings: ChainSettings,
        requested: vk::Extent2D,
    ) -> Self {
        Self {
            device,
            surface,
            surface_loader,
            settings,
            requested,
            color_format: None,
            swapchain: None,
            render_finished: Vec::new(),
            depth: None,
            msaa_color: None,
        }
    }

    /// Record the window's new framebuffer size.
    pub fn set_requested_extent(&mut self, extent: vk::Extent2D) {
        self.requested = extent;
    }

    pub fn color_format(&self) -> Option<vk::Format> {
        self.color_format
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.settings.samples
    }

    pub fn depth_format(&self) -> vk::Format {
        self.settings.depth_format
    }

    pub fn swapchain(&self) -> RendererResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or(RendererError::MissingChainPart(ChainPart::Swapchain.name()))
    }

    /// Extent of the built chain, zero when none is built.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map_or_else(vk::Extent2D::default, Swapchain::extent)
    }

    /// Semaphore signaled when rendering into chain image `index` completes.
    pub fn render_finished(&self, index: u32) -> RendererResult<vk::Semaphore> {
        self.render_finished
            .get(index as usize)
            .map(Semaphore::handle)
            .ok_or(RendererError::MissingChainPart(ChainPart::ImageSync.name()))
    }

    pub fn depth(&self) -> RendererResult<&Image> {
        self.depth
            .as_ref()
            .ok_or(RendererError::MissingChainPart(ChainPart::DepthTarget.name()))
    }

    pub fn msaa_color(&self) -> Option<&Image> {
        self.msaa_color.as_ref()
    }

    fn target_formats(&self) -> RendererResult<TargetFormats> {
        let color = self
            .color_format
            .ok_or(RendererError::MissingChainPart(ChainPart::Swapchain.name()))?;
        Ok(TargetFormats {
            color,
            depth: self.settings.depth_format,
            samples: self.settings.samples,
        })
    }

    fn create_swapchain(&mut self, extent: vk::Extent2D) -> RendererResult<()> {
        let swapchain = Swapchain::new(
            self.device.clone(),
            self.surface,
            &self.surface_loader,
            extent,
            self.settings.present_mode,
        )?;

        match self.color_format {
            Some(expected) if expected != swapchain.format() => {
                return Err(RendererError::FormatChanged {
                    expected,
                    actual: swapchain.format(),
                });
            }
            Some(_) => {}
            None => self.color_format = Some(swapchain.format()),
        }

        self.swapchain = Some(swapchain);
        Ok(())
    }
}

impl ChainBackend for VulkanChain {
    fn wait_idle(&mut self) -> RendererResult<()> {
        self.device.wait_idle()?;
        Ok(())
    }

    fn surface_extent(&self) -> vk::Extent2D {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.device.physical_device(), self.surface)
        };
        match capabilities {
            // u32::MAX: the surface size follows the swapchain.
            Ok(caps) if caps.current_extent.width != u32::MAX => caps.current_extent,
            Ok(_) => self.requested,
            Err(e) => {
                warn!("Surface capability query failed: {:?}", e);
                self.requested
            }
        }
    }

    fn destroy(&mut self, part: ChainPart) {
        let destroyed = match part {
            ChainPart::ColorTarget => self.msaa_color.take().is_some(),
            ChainPart::DepthTarget => self.depth.take().is_some(),
            ChainPart::ImageSync => {
                let had = !self.render_finished.is_empty();
                self.render_finished.clear();
                had
            }
            ChainPart::Swapchain => self.swapchain.take().is_some(),
        };
        if destroyed {
            debug!("Destroyed {}", part.name());
        }
    }

    fn create(&mut self, part: ChainPart, extent: vk::Extent2D) -> RendererResult<()> {
        match part {
            ChainPart::Swapchain => self.create_swapchain(extent)?,
            ChainPart::ImageSync => {
                let count = self.swapchain()?.image_count();
                self.render_finished = (0..count)
                    .map(|_| Semaphore::new(self.device.clone()))
                    .collect::<Result<_, _>>()?;
            }
            ChainPart::DepthTarget => {
                // The chain may have clamped the requested extent.
                let extent = self.swapchain()?.extent();
                let formats = self.target_formats()?;
                self.depth = Some(create_depth_target(self.device.clone(), extent, &formats)?);
            }
            ChainPart::ColorTarget => {
                let extent = self.swapchain()?.extent();
                let formats = self.target_formats()?;
                self.msaa_color = create_color_target(self.device.clone(), extent, &formats)?;
            }
        }
        Ok(())
    }

    fn acquire(&mut self, signal: vk::Semaphore) -> RendererResult<AcquireOutcome> {
        Ok(self.swapchain()?.acquire_next_image(signal)?)
    }

    fn present(
        &mut self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RendererResult<PresentOutcome> {
        Ok(self.swapchain()?.present(queue, image_index, wait)?)
    }
}
