//! Vertex deduplication.
//!
//! Collapses a stream of resolved vertices into a unique vertex list plus an
//! index list that reproduces the stream by reference.

use std::collections::HashMap;

use super::Mesh;
use crate::vertex::CompactVertex;

#[derive(Debug, Default)]
pub struct VertexDeduplicator {
  lookup:   HashMap<CompactVertex, u32>,
  vertices: Vec<CompactVertex>,
  indices:  Vec<u32>,
}

impl VertexDeduplicator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Pushes one vertex of the stream and returns the index it resolved to.
  pub fn push(&mut self, vertex: impl Into<CompactVertex>) -> u32 {
    let vertex = vertex.into();
    let vertices = &mut self.vertices;
    let index = *self.lookup.entry(vertex).or_insert_with(|| {
      let next = vertices.len() as u32;
      vertices.push(vertex);
      next
    });
    self.indices.push(index);
    index
  }

  pub fn unique_len(&self) -> usize {
    self.vertices.len()
  }

  pub fn index_len(&self) -> usize {
    self.indices.len()
  }

  pub fn finish(self, material: Option<String>) -> Mesh {
    Mesh {
      vertices: self.vertices,
      indices: self.indices,
      material,
    }
  }
}

/// Deduplicates a whole stream into an unnamed mesh.
pub fn deduplicate<V, I>(stream: I) -> Mesh
where
  V: Into<CompactVertex>,
  I: IntoIterator<Item = V>,
{
  let mut dedup = VertexDeduplicator::new();
  for vertex in stream {
    dedup.push(vertex);
  }
  dedup.finish(None)
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use quickcheck_macros::quickcheck;

  use super::*;
  use crate::vertex::RawVertex;

  fn palette() -> Vec<RawVertex> {
    (0..8)
      .map(|i| {
        let f = i as f32;
        RawVertex::new([f, f * 0.5, -f])
          .with_normal([0.0, 0.0, 1.0])
          .with_tex_coord([f / 8.0, 1.0 - f / 8.0])
      })
      .collect()
  }

  fn check(raw: &[RawVertex]) -> bool {
    let mesh = deduplicate(raw.iter().copied());
    let distinct: HashSet<CompactVertex> = raw.iter().map(RawVertex::resolve).collect();

    mesh.vertices.len() == distinct.len()
      && mesh.indices.len() == raw.len()
      && mesh
        .indices
        .iter()
        .all(|&i| (i as usize) < mesh.vertices.len())
      && raw
        .iter()
        .zip(&mesh.indices)
        .all(|(v, &i)| mesh.vertices[i as usize] == v.resolve())
  }

  #[quickcheck]
  fn reconstructs_stream_from_palette(picks: Vec<u8>) -> bool {
    let palette = palette();
    let raw: Vec<_> = picks
      .iter()
      .map(|p| palette[*p as usize % palette.len()])
      .collect();
    check(&raw)
  }

  #[quickcheck]
  fn reconstructs_arbitrary_floats(coords: Vec<(f32, f32, f32)>) -> bool {
    let raw: Vec<_> = coords
      .into_iter()
      .map(|(x, y, z)| RawVertex::new([x, y, z]).with_tex_coord([x, z]))
      .collect();
    check(&raw)
  }

  #[test]
  fn first_occurrence_order_is_kept() {
    let palette = palette();
    let mesh = deduplicate([palette[3], palette[1], palette[3], palette[0], palette[1]]);
    assert_eq!(
      mesh.vertices,
      vec![palette[3].resolve(), palette[1].resolve(), palette[0].resolve()]
    );
    assert_eq!(mesh.indices, vec![0, 1, 0, 2, 1]);
  }

  #[test]
  fn empty_stream_gives_empty_mesh() {
    let mesh = deduplicate(Vec::<RawVertex>::new());
    assert!(mesh.is_empty());
    assert!(mesh.indices.is_empty());
  }
}
