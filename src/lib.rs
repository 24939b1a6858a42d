pub mod app;
pub mod camera;
pub mod config;
pub mod error;
pub mod gpu;
pub mod gui;
pub mod logging;
pub mod mesh;
pub mod render;
pub mod shader;
pub mod texture;
pub mod vertex;

pub use app::App;
pub use camera::{Camera, CameraIntent};
pub use error::{RendererError, RendererResult};
pub use mesh::{ImportOptions, Mesh, ObjImporter};
pub use render::{FrameState, RenderSettings, Renderer};
