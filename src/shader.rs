//! Precompiled SPIR-V shader artifacts.
//!
//! The GLSL sources live in `shaders/` and are compiled ahead of time with
//! `glslc`; the viewer only loads and sanity checks the resulting words.

use std::{
  io::ErrorKind,
  path::{Path, PathBuf},
};

use crate::error::{RendererError, RendererResult};

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPaths {
  pub vertex:   PathBuf,
  pub fragment: PathBuf,
}

impl Default for ShaderPaths {
  fn default() -> Self {
    Self {
      vertex:   PathBuf::from("shaders/scene.vert.spv"),
      fragment: PathBuf::from("shaders/scene.frag.spv"),
    }
  }
}

/// Reads a SPIR-V binary and returns its words.
pub fn read_shader_artifact(path: impl AsRef<Path>) -> RendererResult<Vec<u32>> {
  let path = path.as_ref();
  let bytes = std::fs::read(path).map_err(|e| match e.kind() {
    ErrorKind::NotFound => RendererError::ShaderArtifactMissing(path.to_path_buf()),
    _ => RendererError::ShaderArtifactInvalid {
      path:   path.to_path_buf(),
      reason: e.to_string(),
    },
  })?;

  let words = parse_spirv(&bytes).map_err(|reason| RendererError::ShaderArtifactInvalid {
    path: path.to_path_buf(),
    reason,
  })?;
  log::debug!("loaded shader {} ({} words)", path.display(), words.len());
  Ok(words)
}

fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>, String> {
  if bytes.is_empty() || bytes.len() % 4 != 0 {
    return Err(format!("length {} is not a multiple of 4", bytes.len()));
  }

  let words: Vec<u32> = bytemuck::pod_collect_to_vec(bytes);

  match words.first() {
    Some(&SPIRV_MAGIC) => Ok(words),
    Some(&other) if other.swap_bytes() == SPIRV_MAGIC => {
      Ok(words.into_iter().map(u32::swap_bytes).collect())
    }
    Some(&other) => Err(format!("bad magic number {other:#010x}")),
    None => Err("empty module".into()),
  }
}
