//! Platform layer for the mocap viewer.
//!
//! - Window creation and Vulkan surface ownership via winit
//! - Per-window keyboard and mouse state, routed by window id

mod input;
mod window;

pub use input::{InputContext, InputState, KeyCode, Modifiers, MouseButton};
pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
pub use winit::window::WindowId;
