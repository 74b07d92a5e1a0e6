//! Logical device, its queues and the shared GPU memory allocator.
//!
//! ```no_run
//! use mocap_rhi::device::Device;
//! use mocap_rhi::instance::Instance;
//! use mocap_rhi::physical_device::select_physical_device;
//! # fn demo(instance: &Instance, surface: ash::vk::SurfaceKHR) -> mocap_rhi::RhiResult<()> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let gpu = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! let device = Device::new(instance, gpu)?;
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, c_char};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilies};

const EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// Shared through `Arc`; every RHI object holds one so the device outlives
/// everything created from it.
///
/// Queue submission is externally synchronized by the render thread; the
/// allocator is behind a `Mutex`.
pub struct Device {
    raw: ash::Device,
    /// For capability queries after creation.
    instance: ash::Instance,
    gpu: PhysicalDeviceInfo,
    /// Dropped by hand before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl Device {
    /// Creates the device with dynamic rendering, synchronization2 and
    /// sampler anisotropy enabled, plus its allocator.
    pub fn new(instance: &Instance, gpu: PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let families = gpu.queue_families;
        let priority = [1.0f32];
        let queues: Vec<_> = families
            .distinct()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priority)
            })
            .collect();

        let extensions: Vec<*const c_char> = EXTENSIONS.iter().map(|name| name.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);
        let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        let info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queues)
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut vulkan13);

        let raw = unsafe { instance.handle().create_device(gpu.device, &info, None)? };
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: raw.clone(),
            physical_device: gpu.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { raw.destroy_device(None) };
                return Err(e.into());
            }
        };

        let (graphics_queue, present_queue) = unsafe {
            (
                raw.get_device_queue(families.graphics, 0),
                raw.get_device_queue(families.present, 0),
            )
        };
        info!(
            "Logical device on '{}': graphics family {}, present family {}",
            gpu.name(),
            families.graphics,
            families.present
        );

        Ok(Arc::new(Self {
            raw,
            instance: instance.handle().clone(),
            gpu,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.raw
    }

    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn gpu(&self) -> &PhysicalDeviceInfo {
        &self.gpu
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.gpu.device
    }

    #[inline]
    pub fn queue_families(&self) -> QueueFamilies {
        self.gpu.queue_families
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// A poisoned lock is reported as an allocation failure.
    pub fn lock_allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::AllocationFailed("allocator lock poisoned".to_string()))
    }

    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.raw.device_wait_idle()? };
        Ok(())
    }

    /// Submits to the graphics queue.
    ///
    /// # Safety
    ///
    /// Every command buffer must be fully recorded, and every semaphore and
    /// the fence must be in a state that permits this submission.
    pub unsafe fn submit_graphics(&self, submits: &[vk::SubmitInfo], fence: vk::Fence) -> RhiResult<()> {
        unsafe { self.raw.queue_submit(self.graphics_queue, submits, fence)? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.raw.device_wait_idle() {
                error!("Device did not go idle before destruction: {:?}", e);
            }
            // Frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.raw.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// SAFETY: ash::Device and ash::Instance are handles plus function tables,
// queues are plain handles and the allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapchain_extension_required() {
        assert_eq!(EXTENSIONS, [ash::khr::swapchain::NAME]);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
