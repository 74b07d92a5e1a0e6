//! Semaphores and fences with RAII destruction.
//!
//! Frames in flight pair one [`Fence`] (host waits for the GPU) with one
//! acquire [`Semaphore`] (GPU waits for the presentation engine). Per-image
//! render-finished semaphores are owned by the swapchain side instead.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;

/// Initial state of a new [`Fence`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceState {
    /// The first wait returns at once; used for frame slots that have never
    /// been submitted.
    Signaled,
    Unsignaled,
}

impl FenceState {
    fn create_flags(self) -> vk::FenceCreateFlags {
        match self {
            FenceState::Signaled => vk::FenceCreateFlags::SIGNALED,
            FenceState::Unsignaled => vk::FenceCreateFlags::empty(),
        }
    }
}

/// Binary GPU-to-GPU semaphore.
pub struct Semaphore {
    raw: vk::Semaphore,
    device: Arc<Device>,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let raw = unsafe {
            device
                .handle()
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        Ok(Self { raw, device })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.raw
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_semaphore(self.raw, None) };
    }
}

/// GPU-to-host completion signal for one queue submission.
pub struct Fence {
    raw: vk::Fence,
    device: Arc<Device>,
}

impl Fence {
    pub fn new(device: Arc<Device>, state: FenceState) -> RhiResult<Self> {
        let info = vk::FenceCreateInfo::default().flags(state.create_flags());
        let raw = unsafe { device.handle().create_fence(&info, None)? };
        tracing::trace!("Fence created {:?}", state);
        Ok(Self { raw, device })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.raw
    }

    /// Blocks for at most `timeout_ns` until the submission retires.
    ///
    /// A timeout surfaces as `vk::Result::TIMEOUT` inside the error.
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(std::slice::from_ref(&self.raw), true, timeout_ns)?;
        }
        Ok(())
    }

    /// Returns the fence to [`FenceState::Unsignaled`]. Must not be pending.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_fences(std::slice::from_ref(&self.raw))?;
        }
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_fence(self.raw, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_state_flags() {
        assert_eq!(
            FenceState::Signaled.create_flags(),
            vk::FenceCreateFlags::SIGNALED
        );
        assert!(FenceState::Unsignaled.create_flags().is_empty());
    }

    #[test]
    fn test_sync_objects_cross_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }
}
