//! Viewer configuration loaded from TOML.
//!
//! Every section uses `#[serde(default)]`, so a file that only overrides
//! `[camera]` is valid and everything else keeps its default.
//!
//! # Example
//! ```toml
//! [render]
//! present_mode = "fifo"
//! msaa = false
//!
//! [scene]
//! show_axes = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub scene: SceneConfig,
    pub camera: CameraConfig,
    pub animation: AnimationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Mocap Viewer".to_string(),
        }
    }
}

/// Present mode requested from the swapchain. Falls back to FIFO when the
/// surface does not offer it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentModePreference {
    Mailbox,
    Fifo,
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Enable the Khronos validation layer.
    pub validation: bool,
    pub present_mode: PresentModePreference,
    /// Use the highest sample count supported by both color and depth targets.
    pub msaa: bool,
    pub clear_color: [f32; 4],
    /// Frame start cap; `0` renders as fast as presentation allows.
    pub target_fps: u32,
    /// Directory holding `skeleton.vert.spv` and `skeleton.frag.spv`.
    pub shader_dir: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            present_mode: PresentModePreference::Mailbox,
            msaa: true,
            clear_color: [0.1, 0.1, 0.12, 1.0],
            target_fps: 60,
            shader_dir: PathBuf::from("shaders/spirv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Uniform scale applied to every model matrix (capture units to meters).
    pub global_scale: f32,
    pub show_axes: bool,
    pub axes_size: f32,
    pub floor_size: [f32; 2],
    pub floor_divisions: [u32; 2],
    pub floor_color: [f32; 3],
    /// Optional image replacing the generated floor grid cell.
    pub floor_texture: Option<PathBuf>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            global_scale: 0.01,
            show_axes: true,
            axes_size: 40.0,
            floor_size: [1000.0, 1000.0],
            floor_divisions: [10, 10],
            floor_color: [0.2, 0.9, 0.2],
            floor_texture: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub distance: f32,
    pub yaw_degrees: f32,
    pub pitch_degrees: f32,
    pub orbit_sensitivity: f32,
    pub pan_sensitivity: f32,
    pub zoom_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            near: 0.01,
            far: 1000.0,
            distance: 5.0,
            yaw_degrees: -90.0,
            pitch_degrees: 20.0,
            orbit_sensitivity: 0.3,
            pan_sensitivity: 0.005,
            zoom_sensitivity: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub playback_speed: f32,
    pub start_paused: bool,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            playback_speed: 1.0,
            start_paused: false,
        }
    }
}

impl ViewerConfig {
    /// Load a configuration file. Missing fields use defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the configuration as pretty-printed TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::ConfigValue {
                key: "window.width/height",
                message: "window dimensions must be nonzero".to_string(),
            });
        }
        if !(self.scene.global_scale.is_finite() && self.scene.global_scale > 0.0) {
            return Err(Error::ConfigValue {
                key: "scene.global_scale",
                message: format!("expected a positive number, got {}", self.scene.global_scale),
            });
        }
        let cam = &self.camera;
        if !(cam.near > 0.0 && cam.far > cam.near) {
            return Err(Error::ConfigValue {
                key: "camera.near/far",
                message: format!("need 0 < near < far, got near={} far={}", cam.near, cam.far),
            });
        }
        if !(cam.fov_degrees > 0.0 && cam.fov_degrees < 180.0) {
            return Err(Error::ConfigValue {
                key: "camera.fov_degrees",
                message: format!("expected (0, 180), got {}", cam.fov_degrees),
            });
        }
        if !(self.animation.playback_speed.is_finite() && self.animation.playback_speed >= 0.0) {
            return Err(Error::ConfigValue {
                key: "animation.playback_speed",
                message: format!("expected >= 0, got {}", self.animation.playback_speed),
            });
        }
        Ok(())
    }
}
