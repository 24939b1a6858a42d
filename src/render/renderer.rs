//! Frame orchestration on top of a [`GpuDevice`].

use std::time::Duration;

use super::frame_state::{FrameState, LightConstants, MatrixConstants};
use crate::{
  error::{RendererError, RendererResult},
  gpu::{
    BackBufferState,
    ClearValues,
    ConstantBuffer,
    FenceValue,
    FrameCommands,
    FrameSynchronizer,
    GpuDevice,
    GpuMesh,
    Overlay,
    ResourceAllocator,
    SceneBindings,
  },
  mesh::Mesh,
  texture::DecodedImage,
};

pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
  /// Frames the CPU may record ahead of the GPU, `1..=3`.
  pub frames_in_flight: usize,
  /// Upper bound for a single fence wait; `None` waits forever.
  pub fence_timeout:    Option<Duration>,
  pub clear:            ClearValues,
}

impl Default for RenderSettings {
  fn default() -> Self {
    Self {
      frames_in_flight: 2,
      fence_timeout:    Some(Duration::from_secs(5)),
      clear:            ClearValues::default(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
  pub frames_rendered:   u64,
  pub frames_skipped:    u64,
  pub draw_calls:        u32,
  pub meshes:            usize,
  pub triangles:         u64,
  pub last_signaled:     FenceValue,
  pub last_completed:    FenceValue,
  pub uploads_in_flight: usize,
}

/// Constant buffers owned by one in-flight frame, plus the fence of the last
/// submission that read them.
struct FrameSlot<D: GpuDevice> {
  matrices: ConstantBuffer<D, MatrixConstants>,
  lights:   ConstantBuffer<D, LightConstants>,
  fence:    FenceValue,
}

pub struct Renderer<D: GpuDevice> {
  device:       D,
  allocator:    ResourceAllocator<D>,
  sync:         FrameSynchronizer,
  settings:     RenderSettings,
  meshes:       Vec<GpuMesh<D::Buffer>>,
  texture:      D::Texture,
  slots:        Vec<FrameSlot<D>>,
  current_slot: usize,
  back_buffers: Vec<BackBufferState>,
  frame_index:  u64,
  stats:        FrameStats,
}

impl<D: GpuDevice> Renderer<D> {
  /// Creates per-frame constant buffers and binds a white texture until
  /// [`set_texture`](Self::set_texture) is called.
  pub fn new(mut device: D, mut settings: RenderSettings) -> RendererResult<Self> {
    if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&settings.frames_in_flight) {
      let clamped = settings.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT);
      log::warn!(
        "{} frames in flight not supported, using {clamped}",
        settings.frames_in_flight
      );
      settings.frames_in_flight = clamped;
    }

    let mut sync = FrameSynchronizer::new(settings.fence_timeout);
    let mut allocator = ResourceAllocator::new();
    let texture = allocator.upload_texture(&mut device, &mut sync, &DecodedImage::white())?;

    let slots = (0..settings.frames_in_flight)
      .map(|_| -> RendererResult<FrameSlot<D>> {
        Ok(FrameSlot {
          matrices: allocator.create_upload_backed(&mut device, &MatrixConstants::default())?,
          lights:   allocator.create_upload_backed(&mut device, &LightConstants::default())?,
          fence:    0,
        })
      })
      .collect::<RendererResult<Vec<_>>>()?;

    let back_buffers = vec![BackBufferState::Present; device.back_buffer_count()];

    log::info!(
      "renderer ready: {} frames in flight, {} back buffers",
      slots.len(),
      back_buffers.len()
    );

    Ok(Self {
      device,
      allocator,
      sync,
      settings,
      meshes: Vec::new(),
      texture,
      slots,
      current_slot: 0,
      back_buffers,
      frame_index: 0,
      stats: FrameStats::default(),
    })
  }

  /// Replaces the scene with `meshes`, uploaded as one batch.
  pub fn load_scene(&mut self, meshes: &[Mesh]) -> RendererResult<()> {
    self.wait_idle()?;
    self.meshes = self
      .allocator
      .upload_meshes(&mut self.device, &mut self.sync, meshes)?;
    self.stats.meshes = self.meshes.len();
    self.stats.triangles = self.meshes.iter().map(|m| m.index_count as u64 / 3).sum();
    Ok(())
  }

  pub fn set_texture(&mut self, image: &DecodedImage) -> RendererResult<()> {
    self.wait_idle()?;
    self.texture = self
      .allocator
      .upload_texture(&mut self.device, &mut self.sync, image)?;
    Ok(())
  }

  /// Renders and presents one frame.
  ///
  /// Returns `Ok(false)` when the presenter asked to skip the frame.
  pub fn render_frame<O>(&mut self, state: &FrameState, overlay: &mut O) -> RendererResult<bool>
  where
    O: Overlay<D::Recorder> + ?Sized,
  {
    let Some(index) = self.device.acquire_back_buffer()? else {
      self.stats.frames_skipped += 1;
      log::debug!("back buffer unavailable, skipping frame {}", self.frame_index);
      return Ok(false);
    };

    let count = self.device.back_buffer_count();
    if self.back_buffers.len() != count {
      log::debug!("presenter now has {count} back buffers");
      self.back_buffers = vec![BackBufferState::Present; count];
    }

    let slot = &mut self.slots[self.current_slot];
    self.sync.wait_for(&mut self.device, slot.fence)?;
    slot.matrices.write(&mut self.device, &state.matrices)?;
    slot.lights.write(&mut self.device, &state.lights)?;

    let mut recorder = self.device.begin_recording()?;
    transition(
      &mut self.back_buffers,
      &mut recorder,
      index,
      BackBufferState::Present,
      BackBufferState::RenderTarget,
    )?;
    recorder.bind_targets(index, &self.settings.clear)?;
    recorder.bind_scene(SceneBindings {
      matrices: slot.matrices.raw(),
      lights:   slot.lights.raw(),
      texture:  &self.texture,
    })?;
    for mesh in &self.meshes {
      recorder.draw_indexed(mesh)?;
    }
    overlay.record(&mut recorder, self.frame_index)?;
    transition(
      &mut self.back_buffers,
      &mut recorder,
      index,
      BackBufferState::RenderTarget,
      BackBufferState::Present,
    )?;

    self.device.submit(recorder)?;
    self.device.present(index)?;

    let fence = self.sync.signal(&mut self.device)?;
    slot.fence = fence;
    self.allocator.retire_pending(fence);
    let completed = self.device.completed_value()?;
    self.allocator.release_completed(completed);

    self.current_slot = (self.current_slot + 1) % self.slots.len();
    let next_fence = self.slots[self.current_slot].fence;
    self.sync.wait_for(&mut self.device, next_fence)?;

    self.stats.frames_rendered += 1;
    self.stats.draw_calls = self.meshes.len() as u32;
    self.stats.last_signaled = fence;
    self.stats.last_completed = self.device.completed_value()?;
    self.stats.uploads_in_flight = self.allocator.in_flight_len();
    self.frame_index += 1;

    log::trace!("frame {} submitted with fence {fence}", self.frame_index - 1);
    Ok(true)
  }

  /// Blocks until the GPU finished everything submitted so far.
  pub fn wait_idle(&mut self) -> RendererResult<()> {
    self.sync.wait_idle(&mut self.device)?;
    let completed = self.device.completed_value()?;
    self.allocator.release_completed(completed);
    self.stats.last_completed = completed;
    Ok(())
  }

  pub fn stats(&self) -> FrameStats {
    self.stats
  }

  pub fn meshes(&self) -> &[GpuMesh<D::Buffer>] {
    &self.meshes
  }

  pub fn frame_index(&self) -> u64 {
    self.frame_index
  }

  pub fn back_buffer_state(&self, index: usize) -> Option<BackBufferState> {
    self.back_buffers.get(index).copied()
  }

  pub fn settings(&self) -> &RenderSettings {
    &self.settings
  }

  pub fn device(&self) -> &D {
    &self.device
  }

  pub fn device_mut(&mut self) -> &mut D {
    &mut self.device
  }
}

fn transition<R: FrameCommands>(
  states: &mut [BackBufferState],
  recorder: &mut R,
  index: usize,
  from: BackBufferState,
  to: BackBufferState,
) -> RendererResult<()> {
  let state = states.get_mut(index).ok_or(RendererError::InvalidTransition {
    index,
    expected: from,
    actual: to,
  })?;
  if *state != from {
    return Err(RendererError::InvalidTransition {
      index,
      expected: from,
      actual: *state,
    });
  }
  recorder.transition_back_buffer(index, from, to)?;
  *state = to;
  Ok(())
}
