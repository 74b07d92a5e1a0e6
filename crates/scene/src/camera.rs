//! Orbit camera for a Z-up world.

use glam::{Mat4, Vec3};

use mocap_core::CameraConfig;

/// Pitch stays short of the poles so the view basis never degenerates.
const MAX_PITCH_DEGREES: f32 = 89.0;
const MIN_DISTANCE: f32 = 0.05;
/// Zoom multiplier while ctrl is held.
const FAST_ZOOM_FACTOR: f32 = 5.0;

/// Where the camera looks before any user input: about hip height.
pub const DEFAULT_TARGET: Vec3 = Vec3::new(0.0, 0.0, 1.0);

/// Perspective parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    /// Right-handed perspective with depth in `[0, 1]` and Y flipped for
    /// Vulkan's downward clip-space Y.
    pub fn matrix(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }
}

/// A camera orbiting `target` at `distance`.
///
/// Yaw is measured around +Z from +X, pitch upward from the XY plane, both in
/// degrees.
#[derive(Clone, Debug)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub projection: Projection,
    orbit_sensitivity: f32,
    pan_sensitivity: f32,
    zoom_sensitivity: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

impl OrbitCamera {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            target: DEFAULT_TARGET,
            distance: config.distance.max(MIN_DISTANCE),
            yaw: config.yaw_degrees,
            pitch: config.pitch_degrees.clamp(-MAX_PITCH_DEGREES, MAX_PITCH_DEGREES),
            projection: Projection {
                fov_y: config.fov_degrees.to_radians(),
                near: config.near,
                far: config.far,
            },
            orbit_sensitivity: config.orbit_sensitivity,
            pan_sensitivity: config.pan_sensitivity,
            zoom_sensitivity: config.zoom_sensitivity,
        }
    }

    /// Unit vector from the target toward the eye.
    fn offset_direction(&self) -> Vec3 {
        let (yaw_sin, yaw_cos) = self.yaw.to_radians().sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.to_radians().sin_cos();
        Vec3::new(pitch_cos * yaw_cos, pitch_cos * yaw_sin, pitch_sin)
    }

    pub fn position(&self) -> Vec3 {
        self.target + self.offset_direction() * self.distance
    }

    pub fn forward(&self) -> Vec3 {
        -self.offset_direction()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Z).normalize_or_zero()
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.forward())
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Z)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection.matrix(aspect)
    }

    /// Rotate around the target by a cursor delta in pixels.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * self.orbit_sensitivity;
        self.yaw = self.yaw.rem_euclid(360.0);
        self.pitch = (self.pitch + dy * self.orbit_sensitivity)
            .clamp(-MAX_PITCH_DEGREES, MAX_PITCH_DEGREES);
    }

    /// Slide the target in the view plane by a cursor delta in pixels.
    ///
    /// Scaled by distance so the target tracks the cursor at any zoom.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let scale = self.pan_sensitivity * self.distance;
        self.target += (-self.right() * dx + self.up() * dy) * scale;
    }

    /// Move toward (positive `lines`) or away from the target.
    pub fn zoom(&mut self, lines: f32, fast: bool) {
        let step = if fast {
            self.zoom_sensitivity * FAST_ZOOM_FACTOR
        } else {
            self.zoom_sensitivity
        };
        let factor = (1.0 - lines * step).max(0.1);
        self.distance = (self.distance * factor).max(MIN_DISTANCE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn camera() -> OrbitCamera {
        OrbitCamera::from_config(&CameraConfig {
            distance: 10.0,
            yaw_degrees: 0.0,
            pitch_degrees: 0.0,
            ..CameraConfig::default()
        })
    }

    #[test]
    fn test_position_on_x_axis_at_zero_angles() {
        let cam = camera();
        let expected = DEFAULT_TARGET + Vec3::new(10.0, 0.0, 0.0);
        assert!(cam.position().abs_diff_eq(expected, EPSILON));
    }

    #[test]
    fn test_view_maps_target_in_front() {
        let cam = camera();
        let target_view = cam.view_matrix().transform_point3(cam.target);
        // Right-handed view space looks down -Z.
        assert!(target_view.z < 0.0);
        assert!((target_view.z + 10.0).abs() < EPSILON);
        assert!(target_view.x.abs() < EPSILON && target_view.y.abs() < EPSILON);
    }

    #[test]
    fn test_world_up_stays_up_on_screen() {
        let cam = camera();
        let above = cam.view_matrix().transform_point3(cam.target + Vec3::Z);
        assert!(above.y > 0.0);
    }

    #[test]
    fn test_projection_flips_y() {
        let cam = camera();
        let flipped = cam.projection_matrix(16.0 / 9.0);
        let plain = Mat4::perspective_rh(cam.projection.fov_y, 16.0 / 9.0, 0.01, 1000.0);
        assert!((flipped.y_axis.y + plain.y_axis.y).abs() < EPSILON);
        assert!((flipped.x_axis.x - plain.x_axis.x).abs() < EPSILON);
    }

    #[test]
    fn test_projection_survives_zero_aspect() {
        let m = camera().projection_matrix(0.0);
        assert!(m.is_finite());
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut cam = camera();
        cam.orbit(0.0, 10_000.0);
        assert_eq!(cam.pitch, MAX_PITCH_DEGREES);
        assert!(cam.view_matrix().is_finite());
    }

    #[test]
    fn test_zoom_never_crosses_target() {
        let mut cam = camera();
        for _ in 0..200 {
            cam.zoom(5.0, true);
        }
        assert!(cam.distance >= MIN_DISTANCE);
    }

    #[test]
    fn test_fast_zoom_moves_further() {
        let mut slow = camera();
        let mut fast = camera();
        slow.zoom(1.0, false);
        fast.zoom(1.0, true);
        assert!(fast.distance < slow.distance);
    }

    #[test]
    fn test_pan_keeps_distance_and_moves_target() {
        let mut cam = camera();
        let before = cam.target;
        cam.pan(20.0, 0.0);
        assert!(!cam.target.abs_diff_eq(before, EPSILON));
        assert!((cam.position().distance(cam.target) - 10.0).abs() < EPSILON);
        // Horizontal drag stays in the horizontal plane.
        assert!((cam.target.z - before.z).abs() < EPSILON);
    }
}
