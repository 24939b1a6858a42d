//! Wavefront OBJ import.
//!
//! Parses an OBJ file with `tobj` and turns every shape into one deduplicated
//! [`Mesh`]. Faces that are not triangles are skipped rather than
//! triangulated, shapes that end up without vertices are dropped, and the
//! material library is looked up in a configurable directory.
//!
//! # Example
//! ```no_run
//! use sponza_viewer::mesh::{ImportOptions, ObjImporter};
//!
//! let meshes = ObjImporter::new(ImportOptions::default())
//!   .import("models/sponza.obj")
//!   .expect("model should load");
//! println!("{} meshes", meshes.len());
//! ```

use std::{
  fs::File,
  io::{BufRead, BufReader, Read},
  path::{Path, PathBuf},
};

use super::{Mesh, VertexDeduplicator};
use crate::{
  error::{RendererError, RendererResult},
  vertex::RawVertex,
};

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
  /// Directory `mtllib` references are resolved against. Defaults to the
  /// model's own directory, or the working directory for in-memory sources.
  pub material_search_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ObjImporter {
  options: ImportOptions,
}

impl ObjImporter {
  pub fn new(options: ImportOptions) -> Self {
    Self { options }
  }

  /// Imports the file at `path`. Reading has no side effects and can be
  /// retried.
  pub fn import(&self, path: impl AsRef<Path>) -> RendererResult<Vec<Mesh>> {
    let path = path.as_ref();
    log::info!("importing model {}", path.display());

    let file = File::open(path).map_err(|e| RendererError::Parse {
      path:    path.to_path_buf(),
      message: e.to_string(),
    })?;

    let search_path = self
      .options
      .material_search_path
      .clone()
      .or_else(|| path.parent().map(Path::to_path_buf))
      .unwrap_or_default();

    self.import_with(&mut BufReader::new(file), path, &search_path)
  }

  /// Imports an OBJ source that is already in memory or behind a reader.
  pub fn import_reader<R: BufRead>(&self, reader: &mut R) -> RendererResult<Vec<Mesh>> {
    let search_path = self.options.material_search_path.clone().unwrap_or_default();
    self.import_with(reader, Path::new("<memory>"), &search_path)
  }

  fn import_with<R: BufRead>(
    &self,
    reader: &mut R,
    origin: &Path,
    search_path: &Path,
  ) -> RendererResult<Vec<Mesh>> {
    let load_options = tobj::LoadOptions {
      single_index: false,
      triangulate: false,
      ignore_points: true,
      ignore_lines: true,
      ..Default::default()
    };

    let parse_error = |message: String| RendererError::Parse {
      path: origin.to_path_buf(),
      message,
    };

    let mut source = String::new();
    reader
      .read_to_string(&mut source)
      .map_err(|e| parse_error(e.to_string()))?;

    let (models, materials) =
      tobj::load_obj_buf(&mut source.as_bytes(), &load_options, |mtl: &Path| {
        tobj::load_mtl(search_path.join(mtl))
      })
      .map_err(|e| parse_error(e.to_string()))?;

    let materials = materials.unwrap_or_else(|e| {
      log::warn!(
        "material library for {} could not be loaded: {e}",
        origin.display()
      );
      Vec::new()
    });

    let corners = scan_corner_attributes(&source);
    let total_corners: usize = models.iter().map(|m| m.mesh.indices.len()).sum();
    let corners = if corners.len() == total_corners {
      Some(corners)
    } else {
      log::warn!(
        "{}: found {} face corners but tobj produced {total_corners}, \
         attribute presence falls back to whole shapes",
        origin.display(),
        corners.len()
      );
      None
    };

    let mut meshes = Vec::with_capacity(models.len());
    let mut offset = 0usize;
    for model in &models {
      let count = model.mesh.indices.len();
      let presence = corners.as_deref().map(|c| &c[offset..offset + count]);
      offset += count;

      let mesh = convert_shape(model, &materials, presence)?;
      if mesh.is_empty() {
        log::debug!("shape `{}` has no triangles, dropping it", model.name);
        continue;
      }
      meshes.push(mesh);
    }

    log::info!(
      "loaded {} shapes, {} materials, {} meshes, {} unique vertices",
      models.len(),
      materials.len(),
      meshes.len(),
      meshes.iter().map(|m| m.vertices.len()).sum::<usize>()
    );

    Ok(meshes)
  }
}

/// Arity of each face; tobj leaves the list empty when every face is a
/// triangle.
fn face_arities(mesh: &tobj::Mesh) -> impl Iterator<Item = usize> + '_ {
  let uniform = mesh.face_arities.is_empty();
  let count = if uniform {
    mesh.indices.len() / 3
  } else {
    mesh.face_arities.len()
  };
  (0..count).map(move |face| {
    if uniform {
      3
    } else {
      mesh.face_arities[face] as usize
    }
  })
}

/// Which attributes each face corner names, in source order.
///
/// tobj repeats the previous corner's `vt`/`vn` index for corners that omit
/// them, so presence can only be read from the face tokens themselves. Faces
/// with fewer than three corners are points and lines, which tobj drops.
fn scan_corner_attributes(source: &str) -> Vec<CornerAttributes> {
  let mut corners = Vec::new();
  for line in source.lines() {
    let line = line.split('#').next().unwrap_or_default();
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("f") {
      continue;
    }

    let face: Vec<_> = tokens
      .map(|corner| {
        let mut parts = corner.split('/').skip(1);
        let tex_coords = parts.next().is_some_and(|p| !p.is_empty());
        let normals = parts.next().is_some_and(|p| !p.is_empty());
        CornerAttributes {
          normals,
          tex_coords,
        }
      })
      .collect();
    if face.len() >= 3 {
      corners.extend(face);
    }
  }
  corners
}

/// Converts one tobj shape. `presence` holds one entry per corner of the
/// shape; without it a shape's attribute indices are used when they cover
/// every corner.
fn convert_shape(
  model: &tobj::Model,
  materials: &[tobj::Material],
  presence: Option<&[CornerAttributes]>,
) -> RendererResult<Mesh> {
  let mesh = &model.mesh;
  let mut dedup = VertexDeduplicator::new();
  let mut cursor = 0usize;
  let mut skipped = 0usize;

  let covered = CornerAttributes {
    normals:    mesh.normal_indices.len() == mesh.indices.len(),
    tex_coords: mesh.texcoord_indices.len() == mesh.indices.len(),
  };

  for arity in face_arities(mesh) {
    if cursor + arity > mesh.indices.len() {
      return Err(RendererError::MalformedGeometry {
        shape:  model.name.clone(),
        detail: format!(
          "face at index {cursor} spans {arity} vertices but only {} indices exist",
          mesh.indices.len()
        ),
      });
    }

    if arity != 3 {
      skipped += 1;
      cursor += arity;
      continue;
    }

    for corner in cursor..cursor + 3 {
      let attributes = match presence {
        Some(presence) => covered.and(presence[corner]),
        None => covered,
      };
      dedup.push(resolve_corner(model, corner, attributes)?);
    }
    cursor += 3;
  }

  if skipped > 0 {
    log::warn!(
      "shape `{}`: skipped {skipped} non-triangular faces",
      model.name
    );
  }

  let material = mesh
    .material_id
    .and_then(|id| materials.get(id))
    .map(|m| m.name.clone());

  Ok(dedup.finish(material))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CornerAttributes {
  normals:    bool,
  tex_coords: bool,
}

impl CornerAttributes {
  fn and(self, other: Self) -> Self {
    Self {
      normals:    self.normals && other.normals,
      tex_coords: self.tex_coords && other.tex_coords,
    }
  }
}

fn resolve_corner(
  model: &tobj::Model,
  corner: usize,
  attributes: CornerAttributes,
) -> RendererResult<RawVertex> {
  let mesh = &model.mesh;
  let position_index = mesh.indices[corner] as usize;
  let position = triple(&mesh.positions, position_index).ok_or_else(|| {
    RendererError::MalformedGeometry {
      shape:  model.name.clone(),
      detail: format!("position {position_index} referenced by corner {corner} does not exist"),
    }
  })?;

  let normal = attributes
    .normals
    .then(|| triple(&mesh.normals, mesh.normal_indices[corner] as usize))
    .flatten();

  let tex_coord = attributes
    .tex_coords
    .then(|| pair(&mesh.texcoords, mesh.texcoord_indices[corner] as usize))
    .flatten();

  Ok(RawVertex {
    position,
    normal,
    tex_coord,
  })
}

fn triple(data: &[f32], index: usize) -> Option<[f32; 3]> {
  let start = index.checked_mul(3)?;
  data.get(start..start + 3).map(|s| [s[0], s[1], s[2]])
}

fn pair(data: &[f32], index: usize) -> Option<[f32; 2]> {
  let start = index.checked_mul(2)?;
  data.get(start..start + 2).map(|s| [s[0], s[1]])
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;

  fn import(source: &str) -> RendererResult<Vec<Mesh>> {
    ObjImporter::new(ImportOptions::default()).import_reader(&mut Cursor::new(source))
  }

  #[test]
  fn triple_and_pair_reject_out_of_range() {
    let data = [1.0, 2.0, 3.0, 4.0];
    assert_eq!(triple(&data, 0), Some([1.0, 2.0, 3.0]));
    assert_eq!(triple(&data, 1), None);
    assert_eq!(pair(&data, 1), Some([3.0, 4.0]));
    assert_eq!(pair(&data, 2), None);
  }

  #[test]
  fn normals_and_tex_coords_are_resolved() {
    let meshes = import(
      "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
       vn 0 0 1\n\
       vt 0 0\nvt 1 0\nvt 0 0.25\n\
       f 1/1/1 2/2/1 3/3/1\n",
    )
    .unwrap();

    assert_eq!(meshes.len(), 1);
    let v = &meshes[0].vertices;
    assert_eq!(v[0].normal, [0.0, 0.0, 1.0]);
    assert_eq!(v[0].tex_coord, [0.0, 1.0]);
    assert_eq!(v[2].tex_coord, [0.0, 0.75]);
  }

  #[test]
  fn corner_scan_reads_each_face_token() {
    let corners = scan_corner_attributes(
      "v 0 0 0\n\
       f 1/1/1 2//2 3/3 # f 1/1/1\n\
       l 1 2\n\
       f 1 2\n\
       f -3 -2 -1\n",
    );
    // (tex_coords, normals) per corner.
    let expected = [
      (true, true),
      (false, true),
      (true, false),
      (false, false),
      (false, false),
      (false, false),
    ];
    assert_eq!(corners.len(), expected.len());
    for (corner, (tex_coords, normals)) in corners.iter().zip(expected) {
      assert_eq!(
        *corner,
        CornerAttributes {
          normals,
          tex_coords,
        }
      );
    }
  }

  #[test]
  fn position_only_faces_take_defaults() {
    let meshes = import("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
    for v in &meshes[0].vertices {
      assert_eq!(v.normal, [0.0, 1.0, 0.0]);
      assert_eq!(v.tex_coord, [0.0, 0.0]);
    }
  }

  #[test]
  fn missing_file_is_a_parse_error() {
    let err = ObjImporter::new(ImportOptions::default())
      .import("definitely/not/here.obj")
      .unwrap_err();
    assert!(matches!(err, RendererError::Parse { .. }));
    assert!(!err.is_fatal());
  }
}
