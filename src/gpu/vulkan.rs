//! The vulkano backend.
//!
//! Work is chained into a single pending `GpuFuture` per frame: the acquire
//! future, the command buffer execution and the present are joined in the
//! order the frame pipeline calls them, and [`FenceSource::signal`] flushes
//! the chain behind a fence. Signaled fences are kept in a queue ordered by
//! fence value until the GPU reports them complete.

pub mod init;
pub mod recorder;
pub mod swapchain;

use std::{collections::VecDeque, sync::Arc, time::Duration};

use vulkano::{
  Validated,
  VulkanError,
  buffer::{Buffer, BufferCreateInfo, BufferUsage, Subbuffer},
  command_buffer::{AutoCommandBufferBuilder, CommandBufferUsage},
  device::{Device, Queue},
  format::Format,
  image::{Image, ImageCreateInfo, ImageType, ImageUsage, view::ImageView},
  memory::allocator::{AllocationCreateInfo, MemoryTypeFilter},
  pipeline::GraphicsPipeline,
  render_pass::{Framebuffer, RenderPass, Subpass},
  shader::EntryPoint,
  swapchain::{Surface, Swapchain, SwapchainCreateInfo, SwapchainPresentInfo, acquire_next_image},
  sync::{self, GpuFuture, future::FenceSignalFuture},
};
use winit::{dpi::PhysicalSize, event_loop::ActiveEventLoop, window::Window};

pub use self::{init::VulkanContext, recorder::VulkanRecorder};
use self::{
  init::initialize_vulkan,
  swapchain::{
    WindowSizeSetupConfig,
    create_render_pass,
    create_swapchain,
    load_shaders,
    window_size_dependent_setup,
  },
};
use super::{FenceSource, FenceValue, GpuDevice, Presenter, ResourceUsage};
use crate::{
  error::{RendererError, RendererResult},
  shader::ShaderPaths,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VulkanSettings {
  pub shaders: ShaderPaths,
  pub vsync:   bool,
}

fn vulkan_error(what: &'static str, error: Validated<VulkanError>) -> RendererError {
  match error {
    Validated::Error(VulkanError::DeviceLost) => {
      RendererError::DeviceLost(format!("device lost during {what}"))
    }
    other => RendererError::resource(what, other),
  }
}

type PendingFence = FenceSignalFuture<Box<dyn GpuFuture>>;

pub struct VulkanDevice {
  context:            VulkanContext,
  window:             Arc<Window>,
  surface:            Arc<Surface>,
  swapchain:          Arc<Swapchain>,
  render_pass:        Arc<RenderPass>,
  framebuffers:       Vec<Arc<Framebuffer>>,
  vertex_shader:      EntryPoint,
  fragment_shader:    EntryPoint,
  pipeline:           Arc<GraphicsPipeline>,
  recreate_swapchain: bool,
  /// Work chained since the last fence signal.
  pending:            Option<Box<dyn GpuFuture>>,
  timeline:           VecDeque<(FenceValue, PendingFence)>,
  completed:          FenceValue,
}

impl VulkanDevice {
  pub fn new(
    event_loop: &ActiveEventLoop,
    window: Arc<Window>,
    settings: &VulkanSettings,
  ) -> RendererResult<Self> {
    let context = initialize_vulkan(event_loop)?;
    let surface = Surface::from_window(context.instance.clone(), window.clone())
      .map_err(|e| RendererError::resource("window surface", e))?;

    let window_size = window.inner_size();
    let (swapchain, images) =
      create_swapchain(&context.device, &surface, window_size, settings.vsync)?;
    let render_pass = create_render_pass(&context.device, swapchain.image_format())?;
    let (vertex_shader, fragment_shader) = load_shaders(&context.device, &settings.shaders)?;

    let (framebuffers, pipeline) = window_size_dependent_setup(WindowSizeSetupConfig {
      window_size,
      images: &images,
      render_pass: &render_pass,
      memory_allocator: &context.memory_allocator,
      vertex_shader: &vertex_shader,
      fragment_shader: &fragment_shader,
    })?;

    Ok(Self {
      context,
      window,
      surface,
      swapchain,
      render_pass,
      framebuffers,
      vertex_shader,
      fragment_shader,
      pipeline,
      recreate_swapchain: false,
      pending: None,
      timeline: VecDeque::new(),
      completed: 0,
    })
  }

  /// Schedules a swapchain rebuild before the next acquisition.
  pub fn request_resize(&mut self) {
    self.recreate_swapchain = true;
  }

  pub fn window(&self) -> &Arc<Window> {
    &self.window
  }

  pub fn surface(&self) -> &Arc<Surface> {
    &self.surface
  }

  pub fn queue(&self) -> &Arc<Queue> {
    &self.context.queue
  }

  pub fn device(&self) -> &Arc<Device> {
    &self.context.device
  }

  pub fn image_format(&self) -> Format {
    self.swapchain.image_format()
  }

  /// The subpass the overlay draws in.
  pub fn overlay_subpass(&self) -> RendererResult<Subpass> {
    Subpass::from(self.render_pass.clone(), 1)
      .ok_or_else(|| RendererError::resource("overlay subpass", "render pass has one subpass"))
  }

  fn rebuild_swapchain(&mut self, window_size: PhysicalSize<u32>) -> RendererResult<()> {
    let (swapchain, images) = self
      .swapchain
      .recreate(SwapchainCreateInfo {
        image_extent: window_size.into(),
        ..self.swapchain.create_info()
      })
      .map_err(|e| vulkan_error("swapchain rebuild", e))?;

    let (framebuffers, pipeline) = window_size_dependent_setup(WindowSizeSetupConfig {
      window_size,
      images: &images,
      render_pass: &self.render_pass,
      memory_allocator: &self.context.memory_allocator,
      vertex_shader: &self.vertex_shader,
      fragment_shader: &self.fragment_shader,
    })?;

    log::debug!(
      "swapchain rebuilt at {}x{} with {} images",
      window_size.width,
      window_size.height,
      images.len()
    );
    self.swapchain = swapchain;
    self.framebuffers = framebuffers;
    self.pipeline = pipeline;
    self.recreate_swapchain = false;
    Ok(())
  }

  fn take_pending(&mut self) -> Box<dyn GpuFuture> {
    self
      .pending
      .take()
      .unwrap_or_else(|| sync::now(self.context.device.clone()).boxed())
  }

  fn buffer(
    &self,
    what: &'static str,
    size: u64,
    usage: BufferUsage,
    memory_type_filter: MemoryTypeFilter,
  ) -> RendererResult<Subbuffer<[u8]>> {
    Buffer::new_slice::<u8>(
      self.context.memory_allocator.clone(),
      BufferCreateInfo {
        usage,
        ..Default::default()
      },
      AllocationCreateInfo {
        memory_type_filter,
        ..Default::default()
      },
      size,
    )
    .map_err(|e| RendererError::resource(what, e))
  }
}

impl FenceSource for VulkanDevice {
  fn signal(&mut self, value: FenceValue) -> RendererResult<()> {
    let future = match self
      .take_pending()
      .then_signal_fence_and_flush()
      .map_err(Validated::unwrap)
    {
      Ok(future) => future,
      Err(VulkanError::OutOfDate) => {
        self.recreate_swapchain = true;
        sync::now(self.context.device.clone())
          .boxed()
          .then_signal_fence_and_flush()
          .map_err(|e| vulkan_error("frame fence", e))?
      }
      Err(e) => return Err(vulkan_error("frame fence", Validated::Error(e))),
    };
    self.timeline.push_back((value, future));
    Ok(())
  }

  fn completed_value(&mut self) -> RendererResult<FenceValue> {
    while let Some((value, future)) = self.timeline.front() {
      let signaled = future
        .is_signaled()
        .map_err(|e| vulkan_error("fence status", Validated::Error(e)))?;
      if !signaled {
        break;
      }
      self.completed = *value;
      self.timeline.pop_front();
    }
    Ok(self.completed)
  }

  fn wait_for(&mut self, value: FenceValue, timeout: Option<Duration>) -> RendererResult<bool> {
    if self.completed >= value {
      return Ok(true);
    }
    let Some(position) = self.timeline.iter().position(|(v, _)| *v >= value) else {
      return Ok(false);
    };

    match self.timeline[position].1.wait(timeout) {
      Ok(()) => {
        for (done, _) in self.timeline.drain(..=position) {
          self.completed = self.completed.max(done);
        }
        Ok(true)
      }
      Err(Validated::Error(VulkanError::Timeout)) => Ok(false),
      Err(e) => Err(vulkan_error("fence wait", e)),
    }
  }
}

impl Presenter for VulkanDevice {
  fn back_buffer_count(&self) -> usize {
    self.framebuffers.len()
  }

  fn extent(&self) -> [u32; 2] {
    self.swapchain.image_extent()
  }

  fn acquire_back_buffer(&mut self) -> RendererResult<Option<usize>> {
    let window_size = self.window.inner_size();
    if window_size.width == 0 || window_size.height == 0 {
      return Ok(None);
    }

    if self.recreate_swapchain {
      self.rebuild_swapchain(window_size)?;
    }

    match acquire_next_image(self.swapchain.clone(), None).map_err(Validated::unwrap) {
      Ok((image_index, suboptimal, acquire_future)) => {
        if suboptimal {
          self.recreate_swapchain = true;
        }
        let pending = self.take_pending();
        self.pending = Some(pending.join(acquire_future).boxed());
        Ok(Some(image_index as usize))
      }
      Err(VulkanError::OutOfDate) => {
        self.recreate_swapchain = true;
        Ok(None)
      }
      Err(e) => Err(vulkan_error("back buffer acquisition", Validated::Error(e))),
    }
  }

  fn present(&mut self, index: usize) -> RendererResult<()> {
    let pending = self.take_pending();
    self.pending = Some(
      pending
        .then_swapchain_present(
          self.context.queue.clone(),
          SwapchainPresentInfo::swapchain_image_index(self.swapchain.clone(), index as u32),
        )
        .boxed(),
    );
    Ok(())
  }
}

impl GpuDevice for VulkanDevice {
  type Buffer = Subbuffer<[u8]>;
  type Upload = Subbuffer<[u8]>;
  type Mapped = Subbuffer<[u8]>;
  type Texture = Arc<ImageView>;
  type Recorder = VulkanRecorder;

  fn create_device_buffer(
    &mut self,
    size: u64,
    usage: ResourceUsage,
  ) -> RendererResult<Subbuffer<[u8]>> {
    let (what, usage) = match usage {
      ResourceUsage::VertexBuffer => ("vertex buffer", BufferUsage::VERTEX_BUFFER),
      ResourceUsage::IndexBuffer => ("index buffer", BufferUsage::INDEX_BUFFER),
      ResourceUsage::ConstantBuffer => ("constant buffer", BufferUsage::UNIFORM_BUFFER),
    };
    self.buffer(
      what,
      size,
      usage | BufferUsage::TRANSFER_DST,
      MemoryTypeFilter::PREFER_DEVICE,
    )
  }

  fn create_upload_buffer(&mut self, data: &[u8]) -> RendererResult<Subbuffer<[u8]>> {
    Buffer::from_iter(
      self.context.memory_allocator.clone(),
      BufferCreateInfo {
        usage: BufferUsage::TRANSFER_SRC,
        ..Default::default()
      },
      AllocationCreateInfo {
        memory_type_filter: MemoryTypeFilter::PREFER_HOST
          | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
        ..Default::default()
      },
      data.iter().copied(),
    )
    .map_err(|e| RendererError::resource("upload buffer", e))
  }

  fn create_mapped_buffer(&mut self, size: u64) -> RendererResult<Subbuffer<[u8]>> {
    self.buffer(
      "constant buffer",
      size,
      BufferUsage::UNIFORM_BUFFER,
      MemoryTypeFilter::PREFER_DEVICE | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
    )
  }

  fn write_mapped(&mut self, target: &Subbuffer<[u8]>, data: &[u8]) -> RendererResult<()> {
    if data.len() as u64 != target.len() {
      return Err(RendererError::host_access(
        "constant buffer",
        format!("{} bytes written into {} bytes", data.len(), target.len()),
      ));
    }
    let mut mapped = target
      .write()
      .map_err(|e| RendererError::host_access("constant buffer", e))?;
    mapped.copy_from_slice(data);
    Ok(())
  }

  fn create_texture(&mut self, width: u32, height: u32) -> RendererResult<Arc<ImageView>> {
    let image = Image::new(
      self.context.memory_allocator.clone(),
      ImageCreateInfo {
        image_type: ImageType::Dim2d,
        format: Format::R8G8B8A8_SRGB,
        extent: [width, height, 1],
        usage: ImageUsage::TRANSFER_DST | ImageUsage::SAMPLED,
        ..Default::default()
      },
      AllocationCreateInfo {
        memory_type_filter: MemoryTypeFilter::PREFER_DEVICE,
        ..Default::default()
      },
    )
    .map_err(|e| RendererError::resource("texture", e))?;

    ImageView::new_default(image).map_err(|e| RendererError::resource("texture view", e))
  }

  fn begin_recording(&mut self) -> RendererResult<VulkanRecorder> {
    let builder = AutoCommandBufferBuilder::primary(
      self.context.command_buffer_allocator.clone(),
      self.context.queue.queue_family_index(),
      CommandBufferUsage::OneTimeSubmit,
    )
    .map_err(|e| vulkan_error("command buffer", e))?;

    Ok(VulkanRecorder::new(
      builder,
      self.pipeline.clone(),
      self.framebuffers.clone(),
      self.context.descriptor_set_allocator.clone(),
      self.context.sampler.clone(),
      self.swapchain.image_extent(),
    ))
  }

  fn submit(&mut self, recorder: VulkanRecorder) -> RendererResult<()> {
    let command_buffer = recorder.finish()?;
    let pending = self.take_pending();
    let future = pending
      .then_execute(self.context.queue.clone(), command_buffer)
      .map_err(|e| RendererError::resource("command submission", e))?;
    self.pending = Some(future.boxed());
    Ok(())
  }
}
