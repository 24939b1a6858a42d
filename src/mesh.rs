//! CPU-side meshes: OBJ import and vertex deduplication.

pub mod dedup;
pub mod import;

pub use dedup::{deduplicate, VertexDeduplicator};
pub use import::{ImportOptions, ObjImporter};

use crate::vertex::CompactVertex;

/// An indexed triangle list with unique vertices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
  pub vertices: Vec<CompactVertex>,
  /// Three entries per triangle, each `< vertices.len()`.
  pub indices:  Vec<u32>,
  pub material: Option<String>,
}

impl Mesh {
  pub fn is_empty(&self) -> bool {
    self.vertices.is_empty()
  }

  pub fn triangle_count(&self) -> usize {
    self.indices.len() / 3
  }

  pub fn vertex_bytes(&self) -> &[u8] {
    bytemuck::cast_slice(&self.vertices)
  }

  pub fn index_bytes(&self) -> &[u8] {
    bytemuck::cast_slice(&self.indices)
  }
}
