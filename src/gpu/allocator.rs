//! Device-local resources staged through transient upload buffers, and
//! host-visible constant buffers.

use std::marker::PhantomData;

use bytemuck::Pod;

use super::{
  FenceValue,
  FrameCommands,
  FrameSynchronizer,
  GpuDevice,
  GpuMesh,
  IndexFormat,
  ResourceUsage,
  UploadArena,
};
use crate::{
  error::{RendererError, RendererResult},
  mesh::Mesh,
  texture::DecodedImage,
  vertex::CompactVertex,
};

/// A persistently mapped buffer holding one `T`, rewritten by the CPU every
/// frame.
pub struct ConstantBuffer<D: GpuDevice, T> {
  buffer:  D::Mapped,
  _marker: PhantomData<fn(T)>,
}

impl<D: GpuDevice, T: Pod> ConstantBuffer<D, T> {
  pub fn write(&self, device: &mut D, value: &T) -> RendererResult<()> {
    device.write_mapped(&self.buffer, bytemuck::bytes_of(value))
  }

  pub fn raw(&self) -> &D::Mapped {
    &self.buffer
  }
}

/// Creates GPU resources and owns the upload buffers that feed them until
/// the GPU is done reading.
///
/// Uploads recorded into an open recording sit in a pending list. Once the
/// recording is submitted and fenced, [`retire_pending`](Self::retire_pending)
/// moves them into the [`UploadArena`] under that fence.
pub struct ResourceAllocator<D: GpuDevice> {
  pending: Vec<D::Upload>,
  arena:   UploadArena<D::Upload>,
}

impl<D: GpuDevice> Default for ResourceAllocator<D> {
  fn default() -> Self {
    Self {
      pending: Vec::new(),
      arena:   UploadArena::new(),
    }
  }
}

impl<D: GpuDevice> ResourceAllocator<D> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a device-local buffer for `usage` and records the copy of
  /// `data` into it on `recorder`.
  pub fn create_buffer(
    &mut self,
    device: &mut D,
    recorder: &mut D::Recorder,
    data: &[u8],
    usage: ResourceUsage,
  ) -> RendererResult<D::Buffer> {
    if data.is_empty() {
      return Err(RendererError::resource(
        usage_name(usage),
        "cannot create a zero-sized buffer",
      ));
    }

    let buffer = device.create_device_buffer(data.len() as u64, usage)?;
    let upload = device.create_upload_buffer(data)?;
    recorder.copy_buffer(&upload, &buffer)?;
    self.pending.push(upload);

    log::trace!("staged {} bytes for {}", data.len(), usage_name(usage));
    Ok(buffer)
  }

  /// Creates a sampled texture and records the copy of `image` into it.
  pub fn create_texture(
    &mut self,
    device: &mut D,
    recorder: &mut D::Recorder,
    image: &DecodedImage,
  ) -> RendererResult<D::Texture> {
    image
      .check_layout()
      .map_err(|reason| RendererError::resource("texture", reason))?;

    let texture = device.create_texture(image.width, image.height)?;
    let upload = device.create_upload_buffer(&image.tight_pixels())?;
    recorder.copy_texture(&upload, &texture)?;
    self.pending.push(upload);

    Ok(texture)
  }

  /// Creates a host-visible buffer sized for `T` and fills it with `initial`.
  pub fn create_upload_backed<T: Pod>(
    &mut self,
    device: &mut D,
    initial: &T,
  ) -> RendererResult<ConstantBuffer<D, T>> {
    let buffer = device.create_mapped_buffer(std::mem::size_of::<T>() as u64)?;
    let constant = ConstantBuffer {
      buffer,
      _marker: PhantomData,
    };
    constant.write(device, initial)?;
    Ok(constant)
  }

  /// Hands every pending upload to the arena under `fence`.
  pub fn retire_pending(&mut self, fence: FenceValue) {
    for upload in self.pending.drain(..) {
      self.arena.retain(fence, upload);
    }
  }

  pub fn release_completed(&mut self, completed: FenceValue) -> usize {
    self.arena.release_completed(completed)
  }

  /// Uploads recorded but not yet fenced.
  pub fn pending_len(&self) -> usize {
    self.pending.len()
  }

  /// Uploads fenced but not yet released.
  pub fn in_flight_len(&self) -> usize {
    self.arena.len()
  }

  /// Uploads all meshes in one recording behind one fence, waits for it once
  /// and frees the upload buffers.
  pub fn upload_meshes(
    &mut self,
    device: &mut D,
    sync: &mut FrameSynchronizer,
    meshes: &[Mesh],
  ) -> RendererResult<Vec<GpuMesh<D::Buffer>>> {
    if meshes.is_empty() {
      return Ok(Vec::new());
    }

    let mut recorder = device.begin_recording()?;
    let mut uploaded = Vec::with_capacity(meshes.len());
    for mesh in meshes {
      uploaded.push(self.stage_mesh(device, &mut recorder, mesh)?);
    }

    self.flush(device, sync, recorder)?;

    log::info!(
      "uploaded {} meshes ({} vertex bytes, {} index bytes)",
      uploaded.len(),
      uploaded.iter().map(|m| m.vertex_bytes).sum::<u64>(),
      uploaded.iter().map(|m| m.index_bytes).sum::<u64>()
    );
    Ok(uploaded)
  }

  /// Uploads one texture with its own submission and waits for it.
  pub fn upload_texture(
    &mut self,
    device: &mut D,
    sync: &mut FrameSynchronizer,
    image: &DecodedImage,
  ) -> RendererResult<D::Texture> {
    let mut recorder = device.begin_recording()?;
    let texture = self.create_texture(device, &mut recorder, image)?;
    self.flush(device, sync, recorder)?;
    log::debug!("uploaded {}x{} texture", image.width, image.height);
    Ok(texture)
  }

  fn stage_mesh(
    &mut self,
    device: &mut D,
    recorder: &mut D::Recorder,
    mesh: &Mesh,
  ) -> RendererResult<GpuMesh<D::Buffer>> {
    let vertex_buffer =
      self.create_buffer(device, recorder, mesh.vertex_bytes(), ResourceUsage::VertexBuffer)?;
    let index_buffer =
      self.create_buffer(device, recorder, mesh.index_bytes(), ResourceUsage::IndexBuffer)?;

    Ok(GpuMesh {
      vertex_buffer,
      index_buffer,
      vertex_stride: CompactVertex::STRIDE,
      vertex_bytes: mesh.vertex_bytes().len() as u64,
      index_bytes: mesh.index_bytes().len() as u64,
      index_format: IndexFormat::U32,
      index_count: mesh.indices.len() as u32,
      material: mesh.material.clone(),
    })
  }

  /// Submits `recorder`, fences it, waits for the fence and drains the arena.
  fn flush(
    &mut self,
    device: &mut D,
    sync: &mut FrameSynchronizer,
    recorder: D::Recorder,
  ) -> RendererResult<()> {
    device.submit(recorder)?;
    let fence = sync.signal(device)?;
    self.retire_pending(fence);
    sync.wait_for(device, fence)?;
    self.release_completed(fence);
    Ok(())
  }
}

fn usage_name(usage: ResourceUsage) -> &'static str {
  match usage {
    ResourceUsage::VertexBuffer => "vertex buffer",
    ResourceUsage::IndexBuffer => "index buffer",
    ResourceUsage::ConstantBuffer => "constant buffer",
  }
}
