//! Core utilities for the mocap viewer.
//!
//! This crate provides foundational types and utilities used across the viewer:
//! - Error types and result aliases
//! - Logging initialization
//! - Animation clock and frame pacing
//! - Configuration management

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    AnimationConfig, CameraConfig, PresentModePreference, RenderConfig, SceneConfig,
    ViewerConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging};
pub use timer::{FramePacer, Timer};
