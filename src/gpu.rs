//! GPU backend seam.
//!
//! The frame pipeline only talks to the GPU through the traits in this
//! module. [`vulkan`] implements them on top of vulkano; [`dummy`] records
//! every call instead of executing it and is what the tests drive.
//!
//! The split follows the lifetime of the objects involved:
//! * [`GpuDevice`] creates resources and turns recordings into submissions
//! * [`FrameCommands`] is one open recording
//! * [`FenceSource`] is the monotonically increasing completion counter
//! * [`Presenter`] owns the back buffers of the swapchain
//! * [`Overlay`] lets a debug UI append its own commands to a frame

pub mod allocator;
pub mod dummy;
pub mod fence;
pub mod upload;
pub mod vulkan;

use std::time::Duration;

pub use allocator::{ConstantBuffer, ResourceAllocator};
pub use fence::FrameSynchronizer;
pub use upload::UploadArena;

use crate::error::RendererResult;

/// Value of the frame fence. Work tagged `N` is complete once the device
/// reports a completed value `>= N`.
pub type FenceValue = u64;

/// What a device-local buffer is going to be bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceUsage {
  VertexBuffer,
  IndexBuffer,
  ConstantBuffer,
}

/// State of a swapchain back buffer as seen by the frame pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackBufferState {
  Present,
  RenderTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
  U32,
}

impl IndexFormat {
  pub fn size(self) -> u64 {
    match self {
      IndexFormat::U32 => 4,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
  pub color: [f32; 4],
  pub depth: f32,
}

impl Default for ClearValues {
  fn default() -> Self {
    Self {
      color: [0.0, 0.2, 0.4, 1.0],
      depth: 1.0,
    }
  }
}

/// A mesh that lives in device-local memory for the rest of the process.
#[derive(Debug, Clone)]
pub struct GpuMesh<B> {
  pub vertex_buffer: B,
  pub index_buffer:  B,
  pub vertex_stride: u32,
  pub vertex_bytes:  u64,
  pub index_bytes:   u64,
  pub index_format:  IndexFormat,
  pub index_count:   u32,
  pub material:      Option<String>,
}

/// Everything the scene shaders read besides the vertex stream.
pub struct SceneBindings<'a, M, T> {
  pub matrices: &'a M,
  pub lights:   &'a M,
  pub texture:  &'a T,
}

pub trait FenceSource {
  /// Enqueues a signal of `value` behind all work submitted so far.
  fn signal(&mut self, value: FenceValue) -> RendererResult<()>;

  fn completed_value(&mut self) -> RendererResult<FenceValue>;

  /// Blocks until `value` completes. Returns `Ok(false)` when `timeout`
  /// elapsed first; `None` waits forever.
  fn wait_for(&mut self, value: FenceValue, timeout: Option<Duration>) -> RendererResult<bool>;
}

pub trait Presenter {
  fn back_buffer_count(&self) -> usize;

  fn extent(&self) -> [u32; 2];

  /// Returns the back buffer to render into, or `None` when the swapchain
  /// has to be rebuilt and this frame should be skipped.
  fn acquire_back_buffer(&mut self) -> RendererResult<Option<usize>>;

  fn present(&mut self, index: usize) -> RendererResult<()>;
}

/// An open command recording.
pub trait FrameCommands {
  type Buffer;
  type Upload;
  type Mapped;
  type Texture;

  fn copy_buffer(&mut self, src: &Self::Upload, dst: &Self::Buffer) -> RendererResult<()>;

  fn copy_texture(&mut self, src: &Self::Upload, dst: &Self::Texture) -> RendererResult<()>;

  fn transition_back_buffer(
    &mut self,
    index: usize,
    from: BackBufferState,
    to: BackBufferState,
  ) -> RendererResult<()>;

  /// Binds back buffer `index` with the depth target and clears both.
  fn bind_targets(&mut self, index: usize, clear: &ClearValues) -> RendererResult<()>;

  fn bind_scene(
    &mut self,
    scene: SceneBindings<'_, Self::Mapped, Self::Texture>,
  ) -> RendererResult<()>;

  fn draw_indexed(&mut self, mesh: &GpuMesh<Self::Buffer>) -> RendererResult<()>;
}

pub trait GpuDevice: FenceSource + Presenter {
  type Buffer: Clone;
  type Upload;
  type Mapped;
  type Texture: Clone;
  type Recorder: FrameCommands<
      Buffer = Self::Buffer,
      Upload = Self::Upload,
      Mapped = Self::Mapped,
      Texture = Self::Texture,
    >;

  fn create_device_buffer(
    &mut self,
    size: u64,
    usage: ResourceUsage,
  ) -> RendererResult<Self::Buffer>;

  /// Creates a host-visible transfer source already filled with `data`.
  fn create_upload_buffer(&mut self, data: &[u8]) -> RendererResult<Self::Upload>;

  /// Creates a persistently host-visible constant buffer of `size` bytes.
  fn create_mapped_buffer(&mut self, size: u64) -> RendererResult<Self::Mapped>;

  fn write_mapped(&mut self, target: &Self::Mapped, data: &[u8]) -> RendererResult<()>;

  /// Creates an RGBA8 texture that can be sampled by the scene shaders.
  fn create_texture(&mut self, width: u32, height: u32) -> RendererResult<Self::Texture>;

  fn begin_recording(&mut self) -> RendererResult<Self::Recorder>;

  fn submit(&mut self, recorder: Self::Recorder) -> RendererResult<()>;
}

/// Appends debug UI commands to a frame right before the back buffer goes
/// back to the present state.
pub trait Overlay<R> {
  fn record(&mut self, recorder: &mut R, frame_index: u64) -> RendererResult<()>;
}

impl<R, F> Overlay<R> for F
where
  F: FnMut(&mut R, u64) -> RendererResult<()>,
{
  fn record(&mut self, recorder: &mut R, frame_index: u64) -> RendererResult<()> {
    self(recorder, frame_index)
  }
}

/// An overlay that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl<R> Overlay<R> for NoOverlay {
  fn record(&mut self, _recorder: &mut R, _frame_index: u64) -> RendererResult<()> {
    Ok(())
  }
}
