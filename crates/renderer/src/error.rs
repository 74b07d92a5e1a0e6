//! Renderer error types.

use thiserror::Error;

use mocap_animation::AnimationError;
use mocap_resources::ResourceError;
use mocap_rhi::RhiError;

/// Errors raised while building or driving the frame pipeline.
///
/// Swapchain invalidation is not an error; it is reported through
/// [`Acquired::Invalidated`](crate::Acquired) and handled by recreation.
#[derive(Error, Debug)]
pub enum RendererError {
    /// Vulkan or allocator failure (device-loss class when raised per frame)
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Window or surface failure
    #[error(transparent)]
    Platform(#[from] mocap_core::Error),

    /// Scene geometry or floor texture could not be built
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Joint evaluation rejected its output buffer
    #[error(transparent)]
    Animation(#[from] AnimationError),

    /// A rebuilt chain no longer matches the format the pipeline was built for
    #[error("Swapchain format changed from {expected:?} to {actual:?}")]
    FormatChanged {
        expected: mocap_rhi::vk::Format,
        actual: mocap_rhi::vk::Format,
    },

    /// A chain part was used before it was built
    #[error("Swapchain {0} is not built")]
    MissingChainPart(&'static str),

    /// The window had no drawable area when the renderer was created
    #[error("Surface has zero extent at startup")]
    ZeroSizedSurface,

    #[error("Frame slot {0} does not exist")]
    InvalidSlot(usize),

    /// Joint matrices do not fit the per-frame model buffer
    #[error("{joints} joints exceed the {capacity} model slots")]
    TooManyJoints { joints: usize, capacity: usize },
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = std::result::Result<T, RendererError>;
