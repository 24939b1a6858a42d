//! Per-frame uniform data.
//!
//! Both blocks are laid out for GLSL `std140`: every `vec3` is followed by a
//! scalar so nothing straddles a 16 byte boundary.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::camera::Camera;

#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MatrixConstants {
  pub world:      [[f32; 4]; 4],
  pub view:       [[f32; 4]; 4],
  pub projection: [[f32; 4]; 4],
}

impl Default for MatrixConstants {
  fn default() -> Self {
    let identity = Mat4::IDENTITY.to_cols_array_2d();
    Self {
      world:      identity,
      view:       identity,
      projection: identity,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct LightConstants {
  pub direction:          [f32; 3],
  pub _pad0:              f32,
  pub color:              [f32; 3],
  pub intensity:          f32,
  pub camera_position:    [f32; 3],
  pub ambient:            f32,
  pub specular_power:     f32,
  pub specular_intensity: f32,
  pub _pad1:              [f32; 2],
}

impl Default for LightConstants {
  fn default() -> Self {
    LightSettings::default().constants(Vec3::ZERO)
  }
}

/// Directional light parameters, editable from the overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSettings {
  /// Direction the light travels in; normalized before upload.
  pub direction:          Vec3,
  pub color:              Vec3,
  pub intensity:          f32,
  pub ambient:            f32,
  pub specular_power:     f32,
  pub specular_intensity: f32,
}

impl LightSettings {
  pub const DEFAULT_DIRECTION: Vec3 = Vec3::new(0.0, -1.0, -1.0);

  pub fn constants(&self, camera_position: Vec3) -> LightConstants {
    let direction = self
      .direction
      .try_normalize()
      .unwrap_or_else(|| Self::DEFAULT_DIRECTION.normalize());

    LightConstants {
      direction:          direction.to_array(),
      _pad0:              0.0,
      color:              self.color.to_array(),
      intensity:          self.intensity,
      camera_position:    camera_position.to_array(),
      ambient:            self.ambient,
      specular_power:     self.specular_power,
      specular_intensity: self.specular_intensity,
      _pad1:              [0.0; 2],
    }
  }
}

impl Default for LightSettings {
  fn default() -> Self {
    Self {
      direction:          Self::DEFAULT_DIRECTION,
      color:              Vec3::ONE,
      intensity:          1.0,
      ambient:            0.1,
      specular_power:     32.0,
      specular_intensity: 1.0,
    }
  }
}

/// Everything written into a frame slot's constant buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameState {
  pub matrices: MatrixConstants,
  pub lights:   LightConstants,
}

impl FrameState {
  pub fn new(camera: &Camera, aspect_ratio: f32, lights: &LightSettings) -> Self {
    Self {
      matrices: MatrixConstants {
        world:      Mat4::IDENTITY.to_cols_array_2d(),
        view:       camera.view_matrix().to_cols_array_2d(),
        projection: camera.projection_matrix(aspect_ratio).to_cols_array_2d(),
      },
      lights:   lights.constants(camera.position.as_vec3()),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::mem::{offset_of, size_of};

  use super::*;

  #[test]
  fn layouts_match_std140() {
    assert_eq!(size_of::<MatrixConstants>(), 192);
    assert_eq!(size_of::<LightConstants>(), 64);
    assert_eq!(offset_of!(LightConstants, color), 16);
    assert_eq!(offset_of!(LightConstants, intensity), 28);
    assert_eq!(offset_of!(LightConstants, camera_position), 32);
    assert_eq!(offset_of!(LightConstants, ambient), 44);
    assert_eq!(offset_of!(LightConstants, specular_power), 48);
    assert_eq!(offset_of!(LightConstants, specular_intensity), 52);
  }

  #[test]
  fn light_direction_is_normalized() {
    let constants = LightSettings::default().constants(Vec3::ZERO);
    let direction = Vec3::from_array(constants.direction);
    assert!((direction.length() - 1.0).abs() < 1e-6);
    assert!(direction.abs_diff_eq(Vec3::new(0.0, -1.0, -1.0).normalize(), 1e-6));
  }

  #[test]
  fn zero_direction_falls_back_to_default() {
    let settings = LightSettings {
      direction: Vec3::ZERO,
      ..Default::default()
    };
    assert_eq!(
      settings.constants(Vec3::ZERO).direction,
      LightSettings::default().constants(Vec3::ZERO).direction
    );
  }

  #[test]
  fn frame_state_carries_camera() {
    let camera = Camera::new();
    let state = FrameState::new(&camera, 16.0 / 9.0, &LightSettings::default());
    assert_eq!(state.lights.camera_position, [0.0, 5.0, -15.0]);
    assert_eq!(state.matrices.world, Mat4::IDENTITY.to_cols_array_2d());
    assert_eq!(state.matrices.view, camera.view_matrix().to_cols_array_2d());
  }
}
