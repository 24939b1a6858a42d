//! Headless GPU backend that records instead of executing.
//!
//! Every recorded command, submission, present, fence signal and wait is
//! appended to an event log the tests can inspect. Fences complete when they
//! are waited on (or immediately with [`DummyDevice::with_auto_complete`]),
//! and the device keeps a list of hazards it observed: constant buffers
//! rewritten while a submission that reads them is still in flight, and
//! upload buffers freed before the copy out of them completed.
//!
//! Cloning a [`DummyDevice`] yields a handle to the same state, so a test can
//! keep one clone as a probe after handing the device to a renderer.

use std::{
  cell::RefCell,
  collections::HashMap,
  rc::{Rc, Weak},
  time::Duration,
};

use super::{
  BackBufferState,
  ClearValues,
  FenceSource,
  FenceValue,
  FrameCommands,
  GpuDevice,
  GpuMesh,
  Presenter,
  ResourceUsage,
  SceneBindings,
};
use crate::error::{RendererError, RendererResult};

pub type ResourceId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum DummyCommand {
  CopyBuffer {
    src:   ResourceId,
    dst:   ResourceId,
    bytes: usize,
  },
  CopyTexture {
    src:   ResourceId,
    dst:   ResourceId,
    bytes: usize,
  },
  Transition {
    index: usize,
    from:  BackBufferState,
    to:    BackBufferState,
  },
  BindTargets {
    index: usize,
    clear: ClearValues,
  },
  BindScene {
    matrices: ResourceId,
    lights:   ResourceId,
    texture:  ResourceId,
  },
  DrawIndexed {
    vertex_buffer: ResourceId,
    index_buffer:  ResourceId,
    index_count:   u32,
  },
  /// Free-form label, used by overlays.
  Marker(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DummyEvent {
  Acquire(usize),
  MappedWrite(ResourceId),
  Submit(Vec<DummyCommand>),
  Present(usize),
  Signal(FenceValue),
  Wait(FenceValue),
}

#[derive(Debug, Clone)]
pub struct DummyBuffer {
  pub id:    ResourceId,
  pub size:  u64,
  pub usage: ResourceUsage,
}

#[derive(Debug, Clone)]
pub struct DummyMapped {
  pub id:   ResourceId,
  pub size: u64,
}

#[derive(Debug, Clone)]
pub struct DummyTexture {
  pub id:     ResourceId,
  pub width:  u32,
  pub height: u32,
}

/// Upload buffer; reports a hazard when dropped while its copy is in flight.
#[derive(Debug)]
pub struct DummyUpload {
  pub id:    ResourceId,
  pub bytes: usize,
  state:     Weak<RefCell<DummyState>>,
}

impl Drop for DummyUpload {
  fn drop(&mut self) {
    let Some(state) = self.state.upgrade() else {
      return;
    };
    // Only fails when the upload is dropped from inside a device call that
    // holds the state, which no backend path does.
    let Ok(mut guard) = state.try_borrow_mut() else {
      log::warn!(
        "upload {} dropped while the device state is borrowed; hazard check skipped",
        self.id
      );
      return;
    };
    let state = &mut *guard;
    if let Some(&submission) = state.upload_use.get(&self.id) {
      if state.in_flight(submission) {
        let fence = state.submissions[submission];
        state.violations.push(format!(
          "upload {} dropped while submission {submission} (fence {fence:?}) is in flight",
          self.id
        ));
      }
    }
  }
}

#[derive(Debug, Default)]
pub struct DummyRecorder {
  commands: Vec<DummyCommand>,
  uploads:  Vec<ResourceId>,
  mapped:   Vec<ResourceId>,
}

impl DummyRecorder {
  pub fn marker(&mut self, label: impl Into<String>) {
    self.commands.push(DummyCommand::Marker(label.into()));
  }

  pub fn commands(&self) -> &[DummyCommand] {
    &self.commands
  }
}

impl FrameCommands for DummyRecorder {
  type Buffer = DummyBuffer;
  type Upload = DummyUpload;
  type Mapped = DummyMapped;
  type Texture = DummyTexture;

  fn copy_buffer(&mut self, src: &DummyUpload, dst: &DummyBuffer) -> RendererResult<()> {
    if src.bytes as u64 > dst.size {
      return Err(RendererError::resource(
        "buffer copy",
        format!("{} bytes do not fit into {} bytes", src.bytes, dst.size),
      ));
    }
    self.uploads.push(src.id);
    self.commands.push(DummyCommand::CopyBuffer {
      src:   src.id,
      dst:   dst.id,
      bytes: src.bytes,
    });
    Ok(())
  }

  fn copy_texture(&mut self, src: &DummyUpload, dst: &DummyTexture) -> RendererResult<()> {
    self.uploads.push(src.id);
    self.commands.push(DummyCommand::CopyTexture {
      src:   src.id,
      dst:   dst.id,
      bytes: src.bytes,
    });
    Ok(())
  }

  fn transition_back_buffer(
    &mut self,
    index: usize,
    from: BackBufferState,
    to: BackBufferState,
  ) -> RendererResult<()> {
    self
      .commands
      .push(DummyCommand::Transition { index, from, to });
    Ok(())
  }

  fn bind_targets(&mut self, index: usize, clear: &ClearValues) -> RendererResult<()> {
    self.commands.push(DummyCommand::BindTargets {
      index,
      clear: *clear,
    });
    Ok(())
  }

  fn bind_scene(
    &mut self,
    scene: SceneBindings<'_, DummyMapped, DummyTexture>,
  ) -> RendererResult<()> {
    self.mapped.push(scene.matrices.id);
    self.mapped.push(scene.lights.id);
    self.commands.push(DummyCommand::BindScene {
      matrices: scene.matrices.id,
      lights:   scene.lights.id,
      texture:  scene.texture.id,
    });
    Ok(())
  }

  fn draw_indexed(&mut self, mesh: &GpuMesh<DummyBuffer>) -> RendererResult<()> {
    self.commands.push(DummyCommand::DrawIndexed {
      vertex_buffer: mesh.vertex_buffer.id,
      index_buffer:  mesh.index_buffer.id,
      index_count:   mesh.index_count,
    });
    Ok(())
  }
}

#[derive(Debug)]
struct DummyState {
  next_id:         ResourceId,
  events:          Vec<DummyEvent>,
  violations:      Vec<String>,
  /// Fence each submission was tagged with, `None` until the next signal.
  submissions:     Vec<Option<FenceValue>>,
  upload_use:      HashMap<ResourceId, usize>,
  mapped_use:      HashMap<ResourceId, usize>,
  mapped_contents: HashMap<ResourceId, Vec<u8>>,
  last_signaled:   FenceValue,
  completed:       FenceValue,
  auto_complete:   bool,
  hang:            bool,
  fail_allocation: bool,
  back_buffers:    usize,
  next_back:       usize,
  acquired:        Option<usize>,
  out_of_date:     usize,
  extent:          [u32; 2],
}

impl DummyState {
  fn in_flight(&self, submission: usize) -> bool {
    match self.submissions[submission] {
      None => true,
      Some(fence) => fence > self.completed,
    }
  }

  fn allocate_id(&mut self, what: &'static str) -> RendererResult<ResourceId> {
    if self.fail_allocation {
      return Err(RendererError::resource(what, "dummy allocation failure"));
    }
    self.next_id += 1;
    Ok(self.next_id)
  }
}

#[derive(Debug, Clone)]
pub struct DummyDevice {
  state: Rc<RefCell<DummyState>>,
}

impl Default for DummyDevice {
  fn default() -> Self {
    Self::new()
  }
}

impl DummyDevice {
  pub fn new() -> Self {
    Self {
      state: Rc::new(RefCell::new(DummyState {
        next_id:         0,
        events:          Vec::new(),
        violations:      Vec::new(),
        submissions:     Vec::new(),
        upload_use:      HashMap::new(),
        mapped_use:      HashMap::new(),
        mapped_contents: HashMap::new(),
        last_signaled:   0,
        completed:       0,
        auto_complete:   false,
        hang:            false,
        fail_allocation: false,
        back_buffers:    2,
        next_back:       0,
        acquired:        None,
        out_of_date:     0,
        extent:          [1280, 720],
      })),
    }
  }

  /// A device whose fences complete as soon as they are signaled.
  pub fn with_auto_complete() -> Self {
    let device = Self::new();
    device.state.borrow_mut().auto_complete = true;
    device
  }

  /// Makes every fence wait time out from now on.
  pub fn set_hang(&self, hang: bool) {
    self.state.borrow_mut().hang = hang;
  }

  pub fn set_fail_allocation(&self, fail: bool) {
    self.state.borrow_mut().fail_allocation = fail;
  }

  /// Makes the next `frames` acquisitions report an out-of-date swapchain.
  pub fn set_out_of_date(&self, frames: usize) {
    self.state.borrow_mut().out_of_date = frames;
  }

  /// Completes every signaled fence, as if the GPU caught up.
  pub fn complete_all(&self) {
    let mut state = self.state.borrow_mut();
    state.completed = state.last_signaled;
  }

  pub fn events(&self) -> Vec<DummyEvent> {
    self.state.borrow().events.clone()
  }

  pub fn clear_events(&self) {
    self.state.borrow_mut().events.clear();
  }

  pub fn violations(&self) -> Vec<String> {
    self.state.borrow().violations.clone()
  }

  pub fn mapped_contents(&self, mapped: &DummyMapped) -> Vec<u8> {
    self
      .state
      .borrow()
      .mapped_contents
      .get(&mapped.id)
      .cloned()
      .unwrap_or_default()
  }

  pub fn last_signaled(&self) -> FenceValue {
    self.state.borrow().last_signaled
  }
}

impl FenceSource for DummyDevice {
  fn signal(&mut self, value: FenceValue) -> RendererResult<()> {
    let mut guard = self.state.borrow_mut();
    let state = &mut *guard;
    if value <= state.last_signaled {
      state.violations.push(format!(
        "fence {value} signaled after {}",
        state.last_signaled
      ));
    }
    for fence in state.submissions.iter_mut().filter(|f| f.is_none()) {
      *fence = Some(value);
    }
    state.last_signaled = value;
    if state.auto_complete {
      state.completed = value;
    }
    state.events.push(DummyEvent::Signal(value));
    Ok(())
  }

  fn completed_value(&mut self) -> RendererResult<FenceValue> {
    Ok(self.state.borrow().completed)
  }

  fn wait_for(&mut self, value: FenceValue, _timeout: Option<Duration>) -> RendererResult<bool> {
    let mut state = self.state.borrow_mut();
    state.events.push(DummyEvent::Wait(value));
    if state.hang || value > state.last_signaled {
      return Ok(false);
    }
    state.completed = state.completed.max(value);
    Ok(true)
  }
}

impl Presenter for DummyDevice {
  fn back_buffer_count(&self) -> usize {
    self.state.borrow().back_buffers
  }

  fn extent(&self) -> [u32; 2] {
    self.state.borrow().extent
  }

  fn acquire_back_buffer(&mut self) -> RendererResult<Option<usize>> {
    let mut state = self.state.borrow_mut();
    if state.out_of_date > 0 {
      state.out_of_date -= 1;
      return Ok(None);
    }
    let index = state.next_back;
    state.next_back = (index + 1) % state.back_buffers;
    state.acquired = Some(index);
    state.events.push(DummyEvent::Acquire(index));
    Ok(Some(index))
  }

  fn present(&mut self, index: usize) -> RendererResult<()> {
    let mut state = self.state.borrow_mut();
    if state.acquired.take() != Some(index) {
      state
        .violations
        .push(format!("back buffer {index} presented without being acquired"));
    }
    state.events.push(DummyEvent::Present(index));
    Ok(())
  }
}

impl GpuDevice for DummyDevice {
  type Buffer = DummyBuffer;
  type Upload = DummyUpload;
  type Mapped = DummyMapped;
  type Texture = DummyTexture;
  type Recorder = DummyRecorder;

  fn create_device_buffer(
    &mut self,
    size: u64,
    usage: ResourceUsage,
  ) -> RendererResult<DummyBuffer> {
    let id = self.state.borrow_mut().allocate_id("device buffer")?;
    log::trace!("DummyDevice: buffer {id} ({size} bytes, {usage:?})");
    Ok(DummyBuffer { id, size, usage })
  }

  fn create_upload_buffer(&mut self, data: &[u8]) -> RendererResult<DummyUpload> {
    let id = self.state.borrow_mut().allocate_id("upload buffer")?;
    Ok(DummyUpload {
      id,
      bytes: data.len(),
      state: Rc::downgrade(&self.state),
    })
  }

  fn create_mapped_buffer(&mut self, size: u64) -> RendererResult<DummyMapped> {
    let mut state = self.state.borrow_mut();
    let id = state.allocate_id("constant buffer")?;
    state.mapped_contents.insert(id, vec![0; size as usize]);
    Ok(DummyMapped { id, size })
  }

  fn write_mapped(&mut self, target: &DummyMapped, data: &[u8]) -> RendererResult<()> {
    let mut guard = self.state.borrow_mut();
    let state = &mut *guard;
    if data.len() as u64 > target.size {
      return Err(RendererError::host_access(
        "constant buffer",
        format!("{} bytes written into {} bytes", data.len(), target.size),
      ));
    }
    if let Some(&submission) = state.mapped_use.get(&target.id) {
      if state.in_flight(submission) {
        let fence = state.submissions[submission];
        state.violations.push(format!(
          "constant buffer {} written while submission {submission} (fence {fence:?}) reads it",
          target.id
        ));
      }
    }
    if let Some(contents) = state.mapped_contents.get_mut(&target.id) {
      contents[..data.len()].copy_from_slice(data);
    }
    state.events.push(DummyEvent::MappedWrite(target.id));
    Ok(())
  }

  fn create_texture(&mut self, width: u32, height: u32) -> RendererResult<DummyTexture> {
    let id = self.state.borrow_mut().allocate_id("texture")?;
    Ok(DummyTexture { id, width, height })
  }

  fn begin_recording(&mut self) -> RendererResult<DummyRecorder> {
    Ok(DummyRecorder::default())
  }

  fn submit(&mut self, recorder: DummyRecorder) -> RendererResult<()> {
    let mut state = self.state.borrow_mut();
    let submission = state.submissions.len();
    state.submissions.push(None);
    for id in recorder.uploads {
      state.upload_use.insert(id, submission);
    }
    for id in recorder.mapped {
      state.mapped_use.insert(id, submission);
    }
    log::trace!(
      "DummyDevice: submission {submission} with {} commands",
      recorder.commands.len()
    );
    state.events.push(DummyEvent::Submit(recorder.commands));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dropping_an_upload_in_flight_is_a_hazard() {
    let mut device = DummyDevice::new();
    let buffer = device
      .create_device_buffer(4, ResourceUsage::VertexBuffer)
      .unwrap();
    let upload = device.create_upload_buffer(&[0; 4]).unwrap();

    let mut recorder = device.begin_recording().unwrap();
    recorder.copy_buffer(&upload, &buffer).unwrap();
    device.submit(recorder).unwrap();
    device.signal(1).unwrap();

    drop(upload);
    assert_eq!(device.violations().len(), 1);
  }

  #[test]
  fn dropping_an_upload_during_a_borrow_does_not_panic() {
    let mut device = DummyDevice::new();
    let upload = device.create_upload_buffer(&[0; 4]).unwrap();
    {
      let _held = device.state.borrow();
      drop(upload);
    }
    assert!(device.violations().is_empty());
  }

  #[test]
  fn dropping_an_upload_after_its_fence_is_fine() {
    let mut device = DummyDevice::new();
    let buffer = device
      .create_device_buffer(4, ResourceUsage::IndexBuffer)
      .unwrap();
    let upload = device.create_upload_buffer(&[0; 4]).unwrap();

    let mut recorder = device.begin_recording().unwrap();
    recorder.copy_buffer(&upload, &buffer).unwrap();
    device.submit(recorder).unwrap();
    device.signal(1).unwrap();
    assert!(device.wait_for(1, None).unwrap());

    drop(upload);
    assert!(device.violations().is_empty());
  }

  #[test]
  fn oversized_copy_is_rejected() {
    let mut device = DummyDevice::new();
    let buffer = device
      .create_device_buffer(2, ResourceUsage::VertexBuffer)
      .unwrap();
    let upload = device.create_upload_buffer(&[0; 4]).unwrap();
    let mut recorder = device.begin_recording().unwrap();
    assert!(recorder.copy_buffer(&upload, &buffer).is_err());
  }

  #[test]
  fn back_buffers_rotate_and_out_of_date_skips() {
    let mut device = DummyDevice::new();
    device.set_out_of_date(1);
    assert_eq!(device.acquire_back_buffer().unwrap(), None);
    assert_eq!(device.acquire_back_buffer().unwrap(), Some(0));
    device.present(0).unwrap();
    assert_eq!(device.acquire_back_buffer().unwrap(), Some(1));
    device.present(1).unwrap();
    assert_eq!(device.acquire_back_buffer().unwrap(), Some(0));
    assert!(device.violations().is_empty());
  }

  #[test]
  fn waiting_on_an_unsignaled_fence_times_out() {
    let mut device = DummyDevice::new();
    assert!(!device.wait_for(1, Some(Duration::from_millis(1))).unwrap());
  }
}
