//! Frame-in-flight rendering for the mocap viewer.
//!
//! This crate owns the GPU side of a frame:
//! - [`SwapchainManager`]: chain lifecycle and ordered recreation
//! - [`FrameSequencer`] and [`FrameSlots`]: frames in flight
//! - [`CommandRecorder`]: dynamic-rendering command buffers
//! - [`UniformUpdater`]: per-slot model and camera matrices
//! - [`Renderer`]: wires the above to a window

pub mod chain;
mod error;
pub mod frame_sync;
pub mod recorder;
pub mod render_targets;
mod renderer;
pub mod swapchain_manager;
pub mod uniforms;

pub use error::{RendererError, RendererResult};
pub use frame_sync::{FrameBackend, FrameOutcome, FrameSequencer, FrameSlots, MAX_FRAMES_IN_FLIGHT};
pub use recorder::{CommandRecorder, DrawPush};
pub use renderer::{Renderer, present_mode};
pub use swapchain_manager::{
    Acquired, ChainBackend, ChainPart, REBUILD_ORDER, RecreateOutcome, SwapchainManager,
    SwapchainState, TEARDOWN_ORDER,
};
pub use uniforms::{ModelLayout, SceneUbo, UniformUpdater};
