//! Swapchain lifecycle.
//!
//! The presentable chain and everything sized from it (per-image semaphores,
//! depth target, multisampled color target) are rebuilt together by
//! [`SwapchainManager::recreate`], which walks [`TEARDOWN_ORDER`] and then
//! [`REBUILD_ORDER`]. The Vulkan work behind each step sits behind
//! [`ChainBackend`], so the state machine runs the same against a mock.
//!
//! ```text
//!            acquire/present out of date, resize
//!   Valid ─────────────────────────────────────▶ Invalidated
//!     ▲                                              │ recreate()
//!     │           rebuild finished                   ▼
//!     └───────────────────────────────────────── Recreating
//! ```
//!
//! A zero-sized surface (minimized window) leaves the chain `Invalidated`:
//! `recreate` idles the device, sees the empty surface and returns
//! [`RecreateOutcome::Deferred`] before tearing anything down. The caller
//! waits for the next resize event.

use ash::vk;
use tracing::{debug, info};

use mocap_rhi::swapchain::{AcquireOutcome, PresentOutcome};

use crate::error::RendererResult;

/// Lifecycle state of the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainState {
    Valid,
    Invalidated,
    Recreating,
}

/// One group of resources whose lifetime is bounded by a chain generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainPart {
    /// Multisampled color target resolved into the chain image
    ColorTarget,
    DepthTarget,
    /// "Rendering complete" semaphores, one per chain image
    ImageSync,
    /// The chain itself with its images and views
    Swapchain,
}

impl ChainPart {
    pub fn name(self) -> &'static str {
        match self {
            ChainPart::ColorTarget => "color target",
            ChainPart::DepthTarget => "depth target",
            ChainPart::ImageSync => "image semaphores",
            ChainPart::Swapchain => "swapchain",
        }
    }
}

/// Dependents first, the chain last.
pub const TEARDOWN_ORDER: [ChainPart; 4] = [
    ChainPart::ColorTarget,
    ChainPart::DepthTarget,
    ChainPart::ImageSync,
    ChainPart::Swapchain,
];

/// The chain first, then everything sized from it.
pub const REBUILD_ORDER: [ChainPart; 4] = [
    ChainPart::Swapchain,
    ChainPart::ImageSync,
    ChainPart::DepthTarget,
    ChainPart::ColorTarget,
];

/// What `acquire_next` hands to the frame synchronizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    /// Render into this chain image.
    Image(u32),
    /// Nothing was acquired; recreate before retrying the frame.
    Invalidated,
}

/// Result of a recreation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecreateOutcome {
    /// Every part was rebuilt at this extent.
    Rebuilt(vk::Extent2D),
    /// The surface is zero-sized; nothing was touched.
    Deferred,
}

/// Device-side operations behind the lifecycle.
///
/// `destroy` must tolerate parts that are not currently built.
pub trait ChainBackend {
    fn wait_idle(&mut self) -> RendererResult<()>;

    /// Current drawable size of the surface; zero while minimized.
    fn surface_extent(&self) -> vk::Extent2D;

    fn destroy(&mut self, part: ChainPart);

    fn create(&mut self, part: ChainPart, extent: vk::Extent2D) -> RendererResult<()>;

    fn acquire(&mut self, signal: vk::Semaphore) -> RendererResult<AcquireOutcome>;

    fn present(
        &mut self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RendererResult<PresentOutcome>;
}

/// Owns the chain backend and its lifecycle state.
pub struct SwapchainManager<B: ChainBackend> {
    backend: B,
    state: SwapchainState,
    extent: vk::Extent2D,
    generation: u64,
}

impl<B: ChainBackend> SwapchainManager<B> {
    /// Wraps a backend with nothing built yet; the first
    /// [`recreate`](Self::recreate) builds the initial chain.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: SwapchainState::Invalidated,
            extent: vk::Extent2D::default(),
            generation: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> SwapchainState {
        self.state
    }

    /// Extent of the current generation.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of completed rebuilds.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Marks the chain stale (resize, out-of-date, suboptimal).
    pub fn invalidate(&mut self) {
        if self.state == SwapchainState::Valid {
            debug!("Swapchain invalidated (generation {})", self.generation);
            self.state = SwapchainState::Invalidated;
        }
    }

    /// Acquires the next image, signaling `signal` when it is ready.
    ///
    /// A suboptimal image is still returned: its semaphore is already pending,
    /// so the frame must be submitted. The chain is marked invalidated and is
    /// rebuilt after presentation.
    pub fn acquire_next(&mut self, signal: vk::Semaphore) -> RendererResult<Acquired> {
        if self.state != SwapchainState::Valid {
            return Ok(Acquired::Invalidated);
        }

        match self.backend.acquire(signal)? {
            AcquireOutcome::Image { index, suboptimal } => {
                if suboptimal {
                    debug!("Acquired suboptimal image {}", index);
                    self.invalidate();
                }
                Ok(Acquired::Image(index))
            }
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date during acquire");
                self.invalidate();
                Ok(Acquired::Invalidated)
            }
        }
    }

    /// Presents `image_index`; a stale result invalidates the chain.
    pub fn present(
        &mut self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RendererResult<PresentOutcome> {
        let outcome = self.backend.present(queue, image_index, wait)?;
        if outcome.needs_rebuild() {
            debug!("Present reported {:?}", outcome);
            self.invalidate();
        }
        Ok(outcome)
    }

    /// Rebuilds the chain and all of its dependents.
    ///
    /// A valid chain is left alone. The device is idled before the surface
    /// is queried; on a zero-sized surface nothing is destroyed and the
    /// chain stays invalidated. A failing step leaves the chain invalidated
    /// and returns the error.
    pub fn recreate(&mut self) -> RendererResult<RecreateOutcome> {
        if self.state == SwapchainState::Valid {
            return Ok(RecreateOutcome::Rebuilt(self.extent));
        }

        self.state = SwapchainState::Recreating;
        let result = self.rebuild();
        self.state = match result {
            Ok(Some(_)) => SwapchainState::Valid,
            Ok(None) | Err(_) => SwapchainState::Invalidated,
        };
        let Some(extent) = result? else {
            debug!("Surface is zero-sized, deferring swapchain recreation");
            return Ok(RecreateOutcome::Deferred);
        };

        self.extent = extent;
        self.generation += 1;
        info!(
            "Swapchain generation {} ready at {}x{}",
            self.generation, extent.width, extent.height
        );
        Ok(RecreateOutcome::Rebuilt(extent))
    }

    /// Idle wait, surface query, teardown, rebuild. `None` when the surface
    /// has no area; nothing has been destroyed in that case.
    fn rebuild(&mut self) -> RendererResult<Option<vk::Extent2D>> {
        self.backend.wait_idle()?;
        let extent = self.backend.surface_extent();
        if extent.width == 0 || extent.height == 0 {
            return Ok(None);
        }
        for part in TEARDOWN_ORDER {
            self.backend.destroy(part);
        }
        for part in REBUILD_ORDER {
            self.backend.create(part, extent)?;
        }
        Ok(Some(extent))
    }
}
