//! Camera for the mocap viewer.

pub mod camera;

pub use camera::{DEFAULT_TARGET, OrbitCamera, Projection};
