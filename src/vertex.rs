use std::hash::{Hash, Hasher};

use bytemuck::{Pod, Zeroable};
use vulkano::pipeline::graphics::vertex_input::Vertex;

/// Normal used when the source face carries none.
pub const DEFAULT_NORMAL: [f32; 3] = [0.0, 1.0, 0.0];
/// Texture coordinate used when the source face carries none.
pub const DEFAULT_TEX_COORD: [f32; 2] = [0.0, 0.0];

/// A vertex exactly as the parser handed it over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawVertex {
  pub position:  [f32; 3],
  pub normal:    Option<[f32; 3]>,
  /// Texture coordinate in file convention (V up).
  pub tex_coord: Option<[f32; 2]>,
}

impl RawVertex {
  pub fn new(position: [f32; 3]) -> Self {
    Self {
      position,
      normal: None,
      tex_coord: None,
    }
  }

  pub fn with_normal(mut self, normal: [f32; 3]) -> Self {
    self.normal = Some(normal);
    self
  }

  pub fn with_tex_coord(mut self, tex_coord: [f32; 2]) -> Self {
    self.tex_coord = Some(tex_coord);
    self
  }

  /// Fills missing attributes and flips V into image convention.
  pub fn resolve(&self) -> CompactVertex {
    CompactVertex {
      position:  self.position,
      normal:    self.normal.unwrap_or(DEFAULT_NORMAL),
      tex_coord: self
        .tex_coord
        .map(|[u, v]| [u, 1.0 - v])
        .unwrap_or(DEFAULT_TEX_COORD),
    }
  }
}

impl From<RawVertex> for CompactVertex {
  fn from(raw: RawVertex) -> Self {
    raw.resolve()
  }
}

/// Interleaved GPU vertex; also the deduplication key.
///
/// Equality and hashing compare the bit patterns of all eight components, so
/// `0.0` and `-0.0` are distinct and a NaN equals an identical NaN.
#[derive(Debug, Clone, Copy, Vertex, Pod, Zeroable)]
#[repr(C)]
pub struct CompactVertex {
  #[format(R32G32B32_SFLOAT)]
  pub position:  [f32; 3],
  #[format(R32G32B32_SFLOAT)]
  pub normal:    [f32; 3],
  #[format(R32G32_SFLOAT)]
  pub tex_coord: [f32; 2],
}

impl CompactVertex {
  pub const STRIDE: u32 = std::mem::size_of::<CompactVertex>() as u32;

  fn key(&self) -> [u32; 8] {
    let [px, py, pz] = self.position;
    let [nx, ny, nz] = self.normal;
    let [u, v] = self.tex_coord;
    [px, py, pz, nx, ny, nz, u, v].map(f32::to_bits)
  }
}

impl PartialEq for CompactVertex {
  fn eq(&self, other: &Self) -> bool {
    self.key() == other.key()
  }
}

impl Eq for CompactVertex {}

impl Hash for CompactVertex {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.key().hash(state);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_attributes_take_defaults() {
    let v = RawVertex::new([1.0, 2.0, 3.0]).resolve();
    assert_eq!(v.normal, [0.0, 1.0, 0.0]);
    assert_eq!(v.tex_coord, [0.0, 0.0]);
  }

  #[test]
  fn tex_coord_v_is_flipped() {
    let v = RawVertex::new([0.0; 3])
      .with_tex_coord([0.25, 0.75])
      .resolve();
    assert_eq!(v.tex_coord, [0.25, 0.25]);
  }

  #[test]
  fn equality_is_bitwise() {
    let a = RawVertex::new([0.0, 0.0, 0.0]).resolve();
    let b = RawVertex::new([-0.0, 0.0, 0.0]).resolve();
    assert_ne!(a, b);

    let nan = RawVertex::new([f32::NAN, 0.0, 0.0]);
    assert_eq!(nan.resolve(), nan.resolve());
  }

  #[test]
  fn stride_matches_interleaved_layout() {
    assert_eq!(CompactVertex::STRIDE, 32);
  }
}
