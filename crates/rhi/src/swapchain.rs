//! Swapchain generations, image acquisition and presentation.
//!
//! A [`Swapchain`] is one immutable generation of presentable images plus a
//! view per image. It never rebuilds itself; the renderer's swapchain
//! manager tears a generation down and creates the next one.
//!
//! Out-of-date and suboptimal results come back as [`AcquireOutcome`] and
//! [`PresentOutcome`] values, never as errors.

use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::create_image_view;

/// What a surface offers a swapchain on this device.
#[derive(Clone, Debug)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        device: &Device,
        surface: vk::SurfaceKHR,
        loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let gpu = device.physical_device();
        unsafe {
            Ok(Self {
                capabilities: loader.get_physical_device_surface_capabilities(gpu, surface)?,
                formats: loader.get_physical_device_surface_formats(gpu, surface)?,
                present_modes: loader.get_physical_device_surface_present_modes(gpu, surface)?,
            })
        }
    }

    /// Picks format, present mode, extent and image count.
    ///
    /// # Errors
    ///
    /// [`RhiError::SwapchainError`] when the surface reports no formats.
    pub fn plan(
        &self,
        requested: vk::Extent2D,
        preferred_mode: vk::PresentModeKHR,
    ) -> RhiResult<ChainPlan> {
        let surface_format = pick_surface_format(&self.formats)
            .ok_or_else(|| RhiError::SwapchainError("surface reports no formats".to_string()))?;

        // FIFO is the one mode every surface must support.
        let present_mode = if self.present_modes.contains(&preferred_mode) {
            preferred_mode
        } else {
            debug!("{:?} unavailable, presenting with FIFO", preferred_mode);
            vk::PresentModeKHR::FIFO
        };

        Ok(ChainPlan {
            surface_format,
            present_mode,
            extent: fit_extent(&self.capabilities, requested),
            min_images: min_image_count(&self.capabilities),
            transform: self.capabilities.current_transform,
        })
    }
}

/// Parameters of one swapchain generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainPlan {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_images: u32,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

/// Result of asking for the next presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The semaphore will be signaled once the image is ready.
    ///
    /// A `suboptimal` image is still rendered; the chain is rebuilt after
    /// this frame.
    Image { index: u32, suboptimal: bool },
    /// The chain no longer matches the surface. Nothing was acquired.
    OutOfDate,
}

impl AcquireOutcome {
    fn from_vk(result: VkResult<(u32, bool)>) -> RhiResult<Self> {
        match result {
            Ok((index, suboptimal)) => Ok(Self::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    fn from_vk(result: VkResult<bool>) -> RhiResult<Self> {
        match result {
            Ok(false) => Ok(Self::Presented),
            Ok(true) => Ok(Self::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// The chain should be rebuilt before the next frame.
    #[inline]
    pub fn needs_rebuild(self) -> bool {
        self != Self::Presented
    }
}

/// One generation of presentable images. Render thread only.
pub struct Swapchain {
    raw: vk::SwapchainKHR,
    loader: ash::khr::swapchain::Device,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    plan: ChainPlan,
    device: Arc<Device>,
}

impl Swapchain {
    /// Creates a generation for `surface` sized to `requested` where the
    /// surface leaves the size open.
    ///
    /// # Errors
    ///
    /// Fails when the surface offers no format or a creation call fails.
    pub fn new(
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        requested: vk::Extent2D,
        preferred_mode: vk::PresentModeKHR,
    ) -> RhiResult<Self> {
        let plan = SurfaceSupport::query(&device, surface, surface_loader)?
            .plan(requested, preferred_mode)?;

        let families = device.queue_families();
        let shared = [families.graphics, families.present];
        let (sharing, indices) = if families.graphics == families.present {
            (vk::SharingMode::EXCLUSIVE, &shared[..0])
        } else {
            (vk::SharingMode::CONCURRENT, &shared[..])
        };

        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(plan.min_images)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing)
            .queue_family_indices(indices)
            .pre_transform(plan.transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true);

        let loader = ash::khr::swapchain::Device::new(device.instance(), device.handle());
        let raw = unsafe { loader.create_swapchain(&info, None)? };

        let mut chain = Self {
            raw,
            loader,
            images: Vec::new(),
            views: Vec::new(),
            plan,
            device,
        };
        chain.images = unsafe { chain.loader.get_swapchain_images(raw)? };
        for &image in &chain.images {
            let format = chain.plan.surface_format.format;
            let view = create_image_view(&chain.device, image, format, vk::ImageAspectFlags::COLOR, 1)?;
            chain.views.push(view);
        }

        info!(
            "Swapchain {}x{} {:?} {:?}: {} images",
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.present_mode,
            chain.images.len()
        );
        Ok(chain)
    }

    /// Acquires the next image, signaling `semaphore` when it is ready.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        AcquireOutcome::from_vk(unsafe {
            self.loader
                .acquire_next_image(self.raw, u64::MAX, semaphore, vk::Fence::null())
        })
    }

    /// Queues `image_index` for presentation once `wait` is signaled.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let chains = [self.raw];
        let indices = [image_index];
        let waits = [wait];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&chains)
            .image_indices(&indices);
        PresentOutcome::from_vk(unsafe { self.loader.queue_present(queue, &info) })
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.plan.surface_format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.views {
                self.device.handle().destroy_image_view(view, None);
            }
            // Destroys the images too.
            self.loader.destroy_swapchain(self.raw, None);
        }
        debug!(
            "Swapchain {}x{} destroyed",
            self.plan.extent.width, self.plan.extent.height
        );
    }
}

/// B8G8R8A8_SRGB, then B8G8R8A8_UNORM, both in SRGB_NONLINEAR; otherwise
/// the first format listed.
fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let rank = |f: &vk::SurfaceFormatKHR| match (f.format, f.color_space) {
        (vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR) => 0,
        (vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR) => 1,
        _ => 2,
    };
    let best = formats.iter().min_by_key(|f| rank(f)).copied()?;
    if rank(&best) > 0 {
        warn!("No sRGB BGRA8 surface format, using {:?}", best.format);
    }
    Some(best)
}

/// The surface's own extent unless it reports the `u32::MAX` sentinel, in
/// which case `requested` is clamped to the surface limits.
fn fit_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    let (min, max) = (caps.min_image_extent, caps.max_image_extent);
    vk::Extent2D {
        width: requested.width.clamp(min.width, max.width),
        height: requested.height.clamp(min.height, max.height),
    }
}

/// One above the minimum; a zero maximum means unbounded.
fn min_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    match caps.max_image_count {
        0 => wanted,
        max => wanted.min(max),
    }
}
