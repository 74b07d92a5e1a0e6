//! Error types shared by the viewer crates.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the viewer's platform and configuration layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors raised outside the RHI layer (surface creation, extension queries)
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file could not be parsed
    #[error("Failed to parse config '{path}': {message}")]
    ConfigParse {
        /// Path of the offending file.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// A configuration value is out of its accepted range
    #[error("Invalid config value for `{key}`: {message}")]
    ConfigValue {
        /// Dotted key of the offending value, e.g. `render.target_fps`.
        key: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Result type alias using the shared Error type.
pub type Result<T> = std::result::Result<T, Error>;
