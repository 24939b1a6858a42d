//! Per-frame uniform data and the frame pipeline that consumes it.

pub mod frame_state;
pub mod renderer;

pub use frame_state::{FrameState, LightConstants, LightSettings, MatrixConstants};
pub use renderer::{FrameStats, MAX_FRAMES_IN_FLIGHT, RenderSettings, Renderer};
