//! Error taxonomy for import, resource creation and frame submission.

use std::path::PathBuf;

use thiserror::Error;

use crate::gpu::BackBufferState;

#[derive(Error, Debug)]
pub enum RendererError {
  /// The model file could not be read or parsed.
  #[error("failed to parse model `{path}`: {message}")]
  Parse { path: PathBuf, message: String },

  /// The parser produced geometry that references missing data.
  #[error("malformed geometry in shape `{shape}`: {detail}")]
  MalformedGeometry { shape: String, detail: String },

  #[error("failed to create {what}: {reason}")]
  ResourceCreationFailed { what: &'static str, reason: String },

  #[error("shader artifact `{0}` is missing")]
  ShaderArtifactMissing(PathBuf),

  #[error("shader artifact `{path}` is invalid: {reason}")]
  ShaderArtifactInvalid { path: PathBuf, reason: String },

  #[error("failed to decode texture `{path}`: {reason}")]
  TextureDecode { path: PathBuf, reason: String },

  #[error("back buffer {index} is {actual:?}, expected {expected:?}")]
  InvalidTransition {
    index:    usize,
    expected: BackBufferState,
    actual:   BackBufferState,
  },

  /// The CPU tried to touch host-visible memory the GPU still owns.
  #[error("host access to {what} rejected: {reason}")]
  HostAccess { what: &'static str, reason: String },

  #[error("GPU device lost: {0}")]
  DeviceLost(String),
}

pub type RendererResult<T> = Result<T, RendererError>;

impl RendererError {
  pub fn resource(what: &'static str, reason: impl std::fmt::Display) -> Self {
    Self::ResourceCreationFailed {
      what,
      reason: reason.to_string(),
    }
  }

  pub fn host_access(what: &'static str, reason: impl std::fmt::Display) -> Self {
    Self::HostAccess {
      what,
      reason: reason.to_string(),
    }
  }

  /// Whether the application has to terminate after this error.
  ///
  /// Import and texture problems leave the renderer usable with an empty or
  /// untextured scene; everything touching the device does not.
  pub fn is_fatal(&self) -> bool {
    !matches!(
      self,
      Self::Parse { .. } | Self::MalformedGeometry { .. } | Self::TextureDecode { .. }
    )
  }
}
