use std::{fs, io::Cursor, path::PathBuf};

use sponza_viewer::{ImportOptions, Mesh, ObjImporter, RendererError, RendererResult};

fn import(source: &str) -> RendererResult<Vec<Mesh>> {
  ObjImporter::new(ImportOptions::default()).import_reader(&mut Cursor::new(source))
}

fn scratch_dir(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("sponza-viewer-{name}-{}", std::process::id()));
  fs::create_dir_all(&dir).unwrap();
  dir
}

const TRIANGLE: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\n";

#[test]
fn single_triangle() {
  let meshes = import(&format!("{TRIANGLE}f 1 2 3\n")).unwrap();
  assert_eq!(meshes.len(), 1);
  assert_eq!(meshes[0].vertices.len(), 3);
  assert_eq!(meshes[0].indices, vec![0, 1, 2]);
  assert_eq!(meshes[0].vertices[1].position, [1.0, 0.0, 0.0]);
}

#[test]
fn duplicated_triangle_shares_vertices() {
  let meshes = import(&format!("{TRIANGLE}f 1 2 3\nf 1 2 3\n")).unwrap();
  assert_eq!(meshes[0].vertices.len(), 3);
  assert_eq!(meshes[0].indices, vec![0, 1, 2, 0, 1, 2]);
}

#[test]
fn quads_are_skipped() {
  let meshes = import("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3\nf 1 2 3 4\n").unwrap();
  assert_eq!(meshes.len(), 1);
  assert_eq!(meshes[0].triangle_count(), 1);
  assert_eq!(meshes[0].vertices.len(), 3);
}

#[test]
fn shapes_without_triangles_are_dropped() {
  let meshes = import(
    "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
     o quads\nf 1 2 3 4\n\
     o tris\nf 1 2 3\n",
  )
  .unwrap();
  assert_eq!(meshes.len(), 1);
  assert_eq!(meshes[0].indices, vec![0, 1, 2]);
}

#[test]
fn indices_stay_in_bounds() {
  let meshes = import(
    "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv 0 0 1\n\
     f 1 2 3\nf 1 3 4\nf 2 3 5\nf 1 3 4\n",
  )
  .unwrap();
  let mesh = &meshes[0];
  assert_eq!(mesh.indices.len(), 12);
  assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
  assert_eq!(mesh.vertices.len(), 5);
}

#[test]
fn out_of_range_face_is_an_import_error() {
  let err = import(&format!("{TRIANGLE}f 1 2 9\n")).unwrap_err();
  assert!(
    matches!(
      err,
      RendererError::Parse { .. } | RendererError::MalformedGeometry { .. }
    ),
    "{err:?}"
  );
  assert!(!err.is_fatal());
}

#[test]
fn material_names_are_resolved_from_the_search_path() {
  let dir = scratch_dir("materials");
  fs::write(dir.join("scene.mtl"), "newmtl stone\nKd 0.8 0.8 0.8\n").unwrap();
  let model = dir.join("scene.obj");
  fs::write(
    &model,
    format!("mtllib scene.mtl\n{TRIANGLE}usemtl stone\nf 1 2 3\n"),
  )
  .unwrap();

  let meshes = ObjImporter::new(ImportOptions::default())
    .import(&model)
    .unwrap();
  fs::remove_dir_all(&dir).ok();

  assert_eq!(meshes.len(), 1);
  assert_eq!(meshes[0].material.as_deref(), Some("stone"));
}

#[test]
fn missing_material_library_is_not_fatal() {
  let meshes = import(&format!("mtllib nowhere.mtl\n{TRIANGLE}usemtl stone\nf 1 2 3\n")).unwrap();
  assert_eq!(meshes.len(), 1);
  assert_eq!(meshes[0].material, None);
}

#[test]
fn corners_without_attributes_take_defaults() {
  let meshes = import(
    "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\n\
     vt 0.5 0.25\nvn 0 0 1\n\
     f 1/1/1 2/1/1 3/1/1\n\
     f 2 3 4\n",
  )
  .unwrap();
  assert_eq!(meshes.len(), 1);

  let mesh = &meshes[0];
  // Shared positions carry different attributes in each face.
  assert_eq!(mesh.vertices.len(), 6);
  assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
  for v in &mesh.vertices[..3] {
    assert_eq!(v.normal, [0.0, 0.0, 1.0]);
    assert_eq!(v.tex_coord, [0.5, 0.75]);
  }
  for v in &mesh.vertices[3..] {
    assert_eq!(v.normal, [0.0, 1.0, 0.0]);
    assert_eq!(v.tex_coord, [0.0, 0.0]);
  }
}
