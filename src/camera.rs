//! Fly camera driven by per-frame input intents.
//!
//! Orientation is stored as yaw and pitch in radians; the facing vector is
//! derived from them whenever they change. Position and angles are kept in
//! 64-bit precision and only converted to `f32` when the matrices are built.
//!
//! # Example
//! ```
//! use sponza_viewer::camera::{Camera, CameraIntent};
//!
//! let mut camera = Camera::new();
//! camera.apply_intent(&CameraIntent {
//!   move_forward: true,
//!   delta_time: 0.016,
//!   ..Default::default()
//! });
//! let view = camera.view_matrix();
//! # let _ = view;
//! ```

use glam::{DMat4, DVec3, Mat4};

/// Pitch is clamped to this many degrees above or below the horizon.
pub const PITCH_LIMIT_DEGREES: f64 = 80.0;

/// Movement and rotation requests collected from input devices for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraIntent {
  pub move_forward:  bool,
  pub move_backward: bool,
  pub move_left:     bool,
  pub move_right:    bool,
  pub move_up:       bool,
  pub move_down:     bool,
  pub rotate_left:   bool,
  pub rotate_right:  bool,
  pub rotate_up:     bool,
  pub rotate_down:   bool,
  /// Accumulated mouse motion in pixels, `(x, y)` with `y` growing downwards.
  pub look_delta:    (f64, f64),
  /// Seconds since the previous frame.
  pub delta_time:    f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
  pub position:          DVec3,
  /// Horizontal angle in radians, measured from +X towards +Z.
  pub yaw:               f64,
  /// Vertical angle in radians, positive looks up.
  pub pitch:             f64,
  pub front:             DVec3,
  /// Units per second.
  pub move_speed:        f64,
  /// Radians per second for the rotation keys.
  pub rotation_speed:    f64,
  /// Radians per pixel of mouse motion.
  pub mouse_sensitivity: f64,
  /// Vertical field of view in radians.
  pub fov:               f32,
  pub near:              f32,
  pub far:               f32,
}

impl Camera {
  pub const DEFAULT_POSITION: DVec3 = DVec3::new(0.0, 5.0, -15.0);
  pub const DEFAULT_TARGET: DVec3 = DVec3::ZERO;
  pub const DEFAULT_MOVE_SPEED: f64 = 5.0;
  pub const DEFAULT_ROTATION_SPEED: f64 = 1.0;

  /// Creates the default camera, above and behind the origin looking at it.
  pub fn new() -> Self {
    Self::looking_at(Self::DEFAULT_POSITION, Self::DEFAULT_TARGET)
  }

  pub fn looking_at(position: DVec3, target: DVec3) -> Self {
    let direction = (target - position).normalize_or(DVec3::Z);
    let mut camera = Self {
      position,
      yaw: direction.z.atan2(direction.x),
      pitch: direction.y.clamp(-1.0, 1.0).asin(),
      front: direction,
      move_speed: Self::DEFAULT_MOVE_SPEED,
      rotation_speed: Self::DEFAULT_ROTATION_SPEED,
      mouse_sensitivity: 0.003,
      fov: std::f32::consts::FRAC_PI_4,
      near: 0.1,
      far: 2000.0,
    };
    camera.rotate(0.0, 0.0);
    camera
  }

  /// Restores the default pose; speeds and projection settings are kept.
  pub fn reset_pose(&mut self) {
    let default = Self::new();
    self.position = default.position;
    self.yaw = default.yaw;
    self.pitch = default.pitch;
    self.front = default.front;
  }

  pub fn right(&self) -> DVec3 {
    self.front.cross(DVec3::Y).normalize_or(DVec3::X)
  }

  /// Applies one frame of input.
  ///
  /// A pose that stops being finite (for example after a huge delta time)
  /// is replaced by the default pose.
  pub fn apply_intent(&mut self, intent: &CameraIntent) {
    let dt = if intent.delta_time.is_finite() {
      intent.delta_time.max(0.0)
    } else {
      0.0
    };

    let key_yaw = axis(intent.rotate_right, intent.rotate_left);
    let key_pitch = axis(intent.rotate_up, intent.rotate_down);
    let (look_x, look_y) = intent.look_delta;
    self.rotate(
      key_yaw * self.rotation_speed * dt + look_x * self.mouse_sensitivity,
      key_pitch * self.rotation_speed * dt - look_y * self.mouse_sensitivity,
    );

    let direction = self.front * axis(intent.move_forward, intent.move_backward)
      + self.right() * axis(intent.move_right, intent.move_left)
      + DVec3::Y * axis(intent.move_up, intent.move_down);
    if direction != DVec3::ZERO {
      self.position += direction.normalize_or_zero() * self.move_speed * dt;
    }

    if !self.is_finite() {
      log::warn!("camera pose became non-finite, resetting");
      self.reset_pose();
    }
  }

  /// Rotates by the given deltas in radians, wrapping yaw and clamping pitch.
  pub fn rotate(&mut self, yaw_delta: f64, pitch_delta: f64) {
    use std::f64::consts::{PI, TAU};

    self.yaw += yaw_delta;
    self.yaw -= TAU * (self.yaw / TAU).floor();
    if self.yaw > PI {
      self.yaw -= TAU;
    }

    let limit = PITCH_LIMIT_DEGREES.to_radians();
    self.pitch = (self.pitch + pitch_delta).clamp(-limit, limit);

    let (yaw_sin, yaw_cos) = self.yaw.sin_cos();
    let (pitch_sin, pitch_cos) = self.pitch.sin_cos();
    self.front = DVec3::new(yaw_cos * pitch_cos, pitch_sin, yaw_sin * pitch_cos).normalize();
  }

  pub fn is_finite(&self) -> bool {
    self.position.is_finite() && self.yaw.is_finite() && self.pitch.is_finite()
  }

  pub fn view_matrix(&self) -> Mat4 {
    DMat4::look_at_rh(self.position, self.position + self.front, DVec3::Y).as_mat4()
  }

  /// Perspective projection for Vulkan clip space (Y down, depth 0..1).
  pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
    let aspect_ratio = if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
      aspect_ratio
    } else {
      1.0
    };
    let mut projection = Mat4::perspective_rh(self.fov, aspect_ratio, self.near, self.far);
    projection.y_axis.y *= -1.0;
    projection
  }
}

impl Default for Camera {
  fn default() -> Self {
    Self::new()
  }
}

fn axis(positive: bool, negative: bool) -> f64 {
  match (positive, negative) {
    (true, false) => 1.0,
    (false, true) => -1.0,
    _ => 0.0,
  }
}

#[cfg(test)]
mod tests {
  use glam::Vec4;

  use super::*;

  const EPS: f64 = 1e-9;

  #[test]
  fn default_camera_looks_at_origin() {
    let camera = Camera::new();
    let expected = (Camera::DEFAULT_TARGET - Camera::DEFAULT_POSITION).normalize();
    assert!(camera.front.abs_diff_eq(expected, EPS));
  }

  #[test]
  fn forward_moves_along_front() {
    let mut camera = Camera::new();
    let start = camera.position;
    camera.apply_intent(&CameraIntent {
      move_forward: true,
      delta_time: 1.0,
      ..Default::default()
    });
    let moved = camera.position - start;
    assert!((moved.length() - Camera::DEFAULT_MOVE_SPEED).abs() < EPS);
    assert!(moved.normalize().abs_diff_eq(camera.front, EPS));
  }

  #[test]
  fn opposite_keys_cancel() {
    let mut camera = Camera::new();
    let before = camera.clone();
    camera.apply_intent(&CameraIntent {
      move_left: true,
      move_right: true,
      rotate_up: true,
      rotate_down: true,
      delta_time: 0.5,
      ..Default::default()
    });
    assert_eq!(camera, before);
  }

  #[test]
  fn vertical_keys_move_along_world_up() {
    let mut camera = Camera::new();
    let start = camera.position;
    camera.apply_intent(&CameraIntent {
      move_up: true,
      delta_time: 0.2,
      ..Default::default()
    });
    assert!(camera.position.abs_diff_eq(start + DVec3::Y, EPS));
  }

  #[test]
  fn pitch_is_clamped() {
    let mut camera = Camera::new();
    camera.apply_intent(&CameraIntent {
      rotate_up: true,
      delta_time: 100.0,
      ..Default::default()
    });
    assert!((camera.pitch - PITCH_LIMIT_DEGREES.to_radians()).abs() < EPS);
  }

  #[test]
  fn yaw_stays_wrapped() {
    let mut camera = Camera::new();
    for _ in 0..50 {
      camera.rotate(1.0, 0.0);
      assert!(camera.yaw > -std::f64::consts::PI - EPS);
      assert!(camera.yaw <= std::f64::consts::PI + EPS);
    }
  }

  #[test]
  fn non_finite_pose_resets() {
    let mut camera = Camera::new();
    camera.move_speed = f64::INFINITY;
    camera.apply_intent(&CameraIntent {
      move_forward: true,
      delta_time: 1.0,
      ..Default::default()
    });
    assert!(camera.is_finite());
    assert_eq!(camera.position, Camera::DEFAULT_POSITION);
  }

  #[test]
  fn non_finite_delta_time_is_ignored() {
    let mut camera = Camera::new();
    let before = camera.clone();
    camera.apply_intent(&CameraIntent {
      move_forward: true,
      delta_time: f64::NAN,
      ..Default::default()
    });
    assert_eq!(camera, before);
  }

  #[test]
  fn projection_flips_y_for_vulkan() {
    let camera = Camera::new();
    let clip = camera.projection_matrix(16.0 / 9.0) * Vec4::new(0.0, 1.0, -10.0, 1.0);
    assert!(clip.y / clip.w < 0.0);
    let depth = camera.projection_matrix(1.0) * Vec4::new(0.0, 0.0, -camera.near, 1.0);
    assert!((depth.z / depth.w).abs() < 1e-5);
  }
}
