//! Command line configuration.

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{
  gpu::vulkan::VulkanSettings,
  logging::LoggingConfig,
  mesh::ImportOptions,
  render::{MAX_FRAMES_IN_FLIGHT, RenderSettings},
  shader::ShaderPaths,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "sponza-viewer", version, about = "Fly through an OBJ scene")]
pub struct Config {
  /// Wavefront OBJ file to load.
  #[arg(long, default_value = "models/sponza.obj")]
  pub model: PathBuf,

  /// Directory `mtllib` references are resolved against (defaults to the
  /// model's directory).
  #[arg(long)]
  pub material_dir: Option<PathBuf>,

  /// Image bound to the scene shaders; white when absent.
  #[arg(long)]
  pub texture: Option<PathBuf>,

  #[arg(long, default_value = "shaders/scene.vert.spv")]
  pub vertex_shader: PathBuf,

  #[arg(long, default_value = "shaders/scene.frag.spv")]
  pub fragment_shader: PathBuf,

  #[arg(long, default_value_t = 1280)]
  pub width: u32,

  #[arg(long, default_value_t = 720)]
  pub height: u32,

  /// Frames the CPU may record ahead of the GPU.
  #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=MAX_FRAMES_IN_FLIGHT as i64))]
  pub frames_in_flight: u8,

  /// Upper bound for a fence wait in milliseconds; 0 waits forever.
  #[arg(long, default_value_t = 5000)]
  pub fence_timeout_ms: u64,

  /// Wait for vertical blank when presenting.
  #[arg(long)]
  pub vsync: bool,

  /// `env_logger` filter, overrides `RUST_LOG`.
  #[arg(long)]
  pub log_filter: Option<String>,
}

impl Config {
  pub fn render_settings(&self) -> RenderSettings {
    RenderSettings {
      frames_in_flight: usize::from(self.frames_in_flight),
      fence_timeout: (self.fence_timeout_ms > 0)
        .then(|| Duration::from_millis(self.fence_timeout_ms)),
      ..Default::default()
    }
  }

  pub fn import_options(&self) -> ImportOptions {
    ImportOptions {
      material_search_path: self.material_dir.clone(),
    }
  }

  pub fn shader_paths(&self) -> ShaderPaths {
    ShaderPaths {
      vertex:   self.vertex_shader.clone(),
      fragment: self.fragment_shader.clone(),
    }
  }

  pub fn vulkan_settings(&self) -> VulkanSettings {
    VulkanSettings {
      shaders: self.shader_paths(),
      vsync:   self.vsync,
    }
  }

  pub fn logging_config(&self) -> LoggingConfig {
    LoggingConfig {
      env_filter: self.log_filter.clone(),
      ..Default::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let config = Config::try_parse_from(["sponza-viewer"]).unwrap();
    assert_eq!(config.model, PathBuf::from("models/sponza.obj"));
    assert_eq!((config.width, config.height), (1280, 720));
    assert_eq!(config.shader_paths(), ShaderPaths::default());

    let settings = config.render_settings();
    assert_eq!(settings.frames_in_flight, 2);
    assert_eq!(settings.fence_timeout, Some(Duration::from_secs(5)));
    assert!(config.import_options().material_search_path.is_none());
  }

  #[test]
  fn zero_timeout_waits_forever() {
    let config = Config::try_parse_from(["sponza-viewer", "--fence-timeout-ms", "0"]).unwrap();
    assert_eq!(config.render_settings().fence_timeout, None);
  }

  #[test]
  fn frames_in_flight_is_range_checked() {
    assert!(Config::try_parse_from(["sponza-viewer", "--frames-in-flight", "0"]).is_err());
    assert!(Config::try_parse_from(["sponza-viewer", "--frames-in-flight", "4"]).is_err());
    let config = Config::try_parse_from(["sponza-viewer", "--frames-in-flight", "1"]).unwrap();
    assert_eq!(config.render_settings().frames_in_flight, 1);
  }

  #[test]
  fn paths_are_forwarded() {
    let config = Config::try_parse_from([
      "sponza-viewer",
      "--model",
      "scene.obj",
      "--material-dir",
      "mtl",
      "--log-filter",
      "debug",
    ])
    .unwrap();
    assert_eq!(config.model, PathBuf::from("scene.obj"));
    assert_eq!(
      config.import_options().material_search_path,
      Some(PathBuf::from("mtl"))
    );
    assert_eq!(config.logging_config().env_filter.as_deref(), Some("debug"));
  }
}
