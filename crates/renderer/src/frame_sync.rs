//! Frame-in-flight synchronization.
//!
//! [`FrameSlots`] holds the per-slot primitives. [`FrameSequencer`] drives
//! one displayed frame through a [`FrameBackend`]:
//!
//! ```text
//! 1. wait for slot i's in-flight fence
//! 2. acquire a chain image (signals slot i's image_available)
//!    └─ invalidated: recreate, skip the frame (no submit, no present)
//! 3. record into slot i's command buffer
//! 4. submit: reset the fence, wait image_available,
//!    signal the image's render_finished and the fence
//! 5. present, waiting on render_finished; stale results recreate the chain
//! 6. advance the frame counter
//! ```
//!
//! Slot `k mod N` is reused only after step 1 observes the fence signaled by
//! frame `k - N`, so at most [`MAX_FRAMES_IN_FLIGHT`] frames are queued.

use std::sync::Arc;

use tracing::{debug, info};

use mocap_rhi::command::{CommandBuffer, CommandPool};
use mocap_rhi::device::Device;
use mocap_rhi::swapchain::PresentOutcome;
use mocap_rhi::sync::{Fence, FenceState, Semaphore};
use mocap_rhi::{RhiError, RhiResult};

use crate::error::RendererResult;
use crate::swapchain_manager::Acquired;

/// Depth of the CPU/GPU pipeline.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Resources owned by one frame in flight.
///
/// The "rendering complete" semaphore is not here: it is indexed by chain
/// image and owned by the chain.
pub struct FrameSlot {
    command_buffer: CommandBuffer,
    image_available: Semaphore,
    /// Signaled when the GPU is done with this slot's command buffer and
    /// uniform buffers.
    in_flight: Fence,
}

impl FrameSlot {
    fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        Ok(Self {
            command_buffer: CommandBuffer::new(device.clone(), pool)?,
            image_available: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, FenceState::Signaled)?,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}

/// The fixed array of frame slots.
pub struct FrameSlots {
    slots: [FrameSlot; MAX_FRAMES_IN_FLIGHT],
}

impl FrameSlots {
    /// Allocates [`MAX_FRAMES_IN_FLIGHT`] slots from `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if any command buffer, semaphore or fence cannot be
    /// created.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let slots = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSlot::new(device.clone(), pool))
            .collect::<RhiResult<Vec<_>>>()?;
        let slots: [FrameSlot; MAX_FRAMES_IN_FLIGHT] = slots.try_into().map_err(|_| {
            RhiError::InvalidHandle("frame slot count mismatch".to_string())
        })?;

        info!("Created {} frame slots", MAX_FRAMES_IN_FLIGHT);
        Ok(Self { slots })
    }

    #[inline]
    pub fn get(&self, slot: usize) -> &FrameSlot {
        &self.slots[slot % MAX_FRAMES_IN_FLIGHT]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// The device-side steps of one frame, addressed by slot index.
pub trait FrameBackend {
    /// Block until the slot's previous submission has finished on the GPU.
    fn wait_slot(&mut self, slot: usize) -> RendererResult<()>;

    fn acquire(&mut self, slot: usize) -> RendererResult<Acquired>;

    /// Write the slot's uniforms and record its command buffer.
    fn record(&mut self, slot: usize, image_index: u32) -> RendererResult<()>;

    /// Reset the slot's fence and submit; the fence is signaled on completion.
    fn submit(&mut self, slot: usize, image_index: u32) -> RendererResult<()>;

    fn present(&mut self, slot: usize, image_index: u32) -> RendererResult<PresentOutcome>;

    /// The chain was marked stale since the last rebuild.
    fn needs_recreate(&self) -> bool;

    fn recreate(&mut self) -> RendererResult<()>;
}

/// How a frame ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { slot: usize, image_index: u32 },
    /// Aborted before submission; the frame counter did not advance.
    Skipped,
}

/// Sequences frames over the slots; holds only the frame counter.
#[derive(Debug, Default)]
pub struct FrameSequencer {
    frame_counter: u64,
}

impl FrameSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames submitted so far.
    #[inline]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Slot the next frame will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        (self.frame_counter % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }

    /// Runs one frame. Any error is fatal for the session.
    pub fn run_frame<B: FrameBackend>(&mut self, backend: &mut B) -> RendererResult<FrameOutcome> {
        let slot = self.current_slot();

        backend.wait_slot(slot)?;

        let image_index = match backend.acquire(slot)? {
            Acquired::Image(index) => index,
            Acquired::Invalidated => {
                debug!("Frame {} skipped, recreating swapchain", self.frame_counter);
                backend.recreate()?;
                return Ok(FrameOutcome::Skipped);
            }
        };

        backend.record(slot, image_index)?;
        backend.submit(slot, image_index)?;
        let presented = backend.present(slot, image_index)?;

        self.frame_counter += 1;

        if presented.needs_rebuild() || backend.needs_recreate() {
            backend.recreate()?;
        }

        Ok(FrameOutcome::Presented { slot, image_index })
    }
}
