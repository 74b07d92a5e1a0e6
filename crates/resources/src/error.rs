//! Error types for resource loading.

use std::path::PathBuf;

use mocap_animation::AnimationError;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Malformed BVH text.
    #[error("BVH parse error at line {line}: {message}")]
    BvhSyntax {
        /// 1-based line number.
        line: usize,
        message: String,
    },

    /// The BVH parsed but does not describe a valid clip.
    #[error("Invalid motion data: {0}")]
    InvalidClip(#[from] AnimationError),

    /// Geometry references more model slots than the uniform array holds.
    #[error("Model slot {slot} is out of range (capacity {capacity})")]
    SlotOutOfRange { slot: usize, capacity: usize },

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image loading error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
