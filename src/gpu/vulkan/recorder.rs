//! [`FrameCommands`] on top of an `AutoCommandBufferBuilder`.
//!
//! vulkano tracks image layouts itself, so back buffer transitions map onto
//! the render pass: the present to render target transition happens when the
//! render pass begins, and the way back happens when it ends.

use std::sync::Arc;

use vulkano::{
  ValidationError,
  buffer::Subbuffer,
  command_buffer::{
    AutoCommandBufferBuilder,
    CopyBufferInfo,
    CopyBufferToImageInfo,
    PrimaryAutoCommandBuffer,
    RenderPassBeginInfo,
    SecondaryAutoCommandBuffer,
    SubpassBeginInfo,
    SubpassContents,
    SubpassEndInfo,
  },
  descriptor_set::{DescriptorSet, WriteDescriptorSet, allocator::StandardDescriptorSetAllocator},
  image::{sampler::Sampler, view::ImageView},
  pipeline::{GraphicsPipeline, Pipeline, PipelineBindPoint},
  render_pass::Framebuffer,
};

use crate::{
  error::{RendererError, RendererResult},
  gpu::{BackBufferState, ClearValues, FrameCommands, GpuMesh, SceneBindings},
};

fn failed(what: &'static str) -> impl FnOnce(Box<ValidationError>) -> RendererError {
  move |e| RendererError::resource(what, e)
}

pub struct VulkanRecorder {
  builder:                  AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
  pipeline:                 Arc<GraphicsPipeline>,
  framebuffers:             Vec<Arc<Framebuffer>>,
  descriptor_set_allocator: Arc<StandardDescriptorSetAllocator>,
  sampler:                  Arc<Sampler>,
  extent:                   [u32; 2],
  /// Current subpass while the render pass is open.
  subpass:                  Option<u32>,
}

impl VulkanRecorder {
  pub(super) fn new(
    builder: AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    pipeline: Arc<GraphicsPipeline>,
    framebuffers: Vec<Arc<Framebuffer>>,
    descriptor_set_allocator: Arc<StandardDescriptorSetAllocator>,
    sampler: Arc<Sampler>,
    extent: [u32; 2],
  ) -> Self {
    Self {
      builder,
      pipeline,
      framebuffers,
      descriptor_set_allocator,
      sampler,
      extent,
      subpass: None,
    }
  }

  pub fn extent(&self) -> [u32; 2] {
    self.extent
  }

  /// Moves to the overlay subpass and executes `commands` in it.
  pub fn execute_overlay(&mut self, commands: Arc<SecondaryAutoCommandBuffer>) -> RendererResult<()> {
    match self.subpass {
      Some(0) => {
        self
          .builder
          .next_subpass(SubpassEndInfo::default(), SubpassBeginInfo {
            contents: SubpassContents::SecondaryCommandBuffers,
            ..Default::default()
          })
          .map_err(failed("overlay subpass"))?;
        self.subpass = Some(1);
      }
      Some(_) => {}
      None => {
        return Err(RendererError::resource(
          "overlay commands",
          "recorded outside of the render pass",
        ));
      }
    }

    self
      .builder
      .execute_commands(commands)
      .map_err(failed("overlay commands"))?;
    Ok(())
  }

  pub(super) fn finish(self) -> RendererResult<Arc<PrimaryAutoCommandBuffer>> {
    if self.subpass.is_some() {
      return Err(RendererError::resource(
        "command buffer",
        "render pass still open at submission",
      ));
    }
    self
      .builder
      .build()
      .map_err(|e| RendererError::resource("command buffer", e))
  }
}

impl FrameCommands for VulkanRecorder {
  type Buffer = Subbuffer<[u8]>;
  type Upload = Subbuffer<[u8]>;
  type Mapped = Subbuffer<[u8]>;
  type Texture = Arc<ImageView>;

  fn copy_buffer(&mut self, src: &Subbuffer<[u8]>, dst: &Subbuffer<[u8]>) -> RendererResult<()> {
    self
      .builder
      .copy_buffer(CopyBufferInfo::buffers(src.clone(), dst.clone()))
      .map_err(failed("buffer copy"))?;
    Ok(())
  }

  fn copy_texture(&mut self, src: &Subbuffer<[u8]>, dst: &Arc<ImageView>) -> RendererResult<()> {
    self
      .builder
      .copy_buffer_to_image(CopyBufferToImageInfo::buffer_image(
        src.clone(),
        dst.image().clone(),
      ))
      .map_err(failed("texture copy"))?;
    Ok(())
  }

  fn transition_back_buffer(
    &mut self,
    index: usize,
    from: BackBufferState,
    to: BackBufferState,
  ) -> RendererResult<()> {
    match (from, to) {
      (BackBufferState::RenderTarget, BackBufferState::Present) => {
        if self.subpass == Some(0) {
          self
            .builder
            .next_subpass(SubpassEndInfo::default(), SubpassBeginInfo {
              contents: SubpassContents::Inline,
              ..Default::default()
            })
            .map_err(failed("overlay subpass"))?;
        }
        if self.subpass.take().is_some() {
          self
            .builder
            .end_render_pass(SubpassEndInfo::default())
            .map_err(failed("render pass end"))?;
        }
      }
      _ => log::trace!("back buffer {index}: {from:?} -> {to:?} handled by the render pass"),
    }
    Ok(())
  }

  fn bind_targets(&mut self, index: usize, clear: &ClearValues) -> RendererResult<()> {
    let framebuffer = self.framebuffers.get(index).cloned().ok_or_else(|| {
      RendererError::resource("render pass begin", format!("no framebuffer for back buffer {index}"))
    })?;

    self
      .builder
      .begin_render_pass(
        RenderPassBeginInfo {
          clear_values: vec![
            Some(clear.color.into()), // msaa_color
            None,                     // final_color, resolved into
            Some(clear.depth.into()), // depth
          ],
          ..RenderPassBeginInfo::framebuffer(framebuffer)
        },
        SubpassBeginInfo {
          contents: SubpassContents::Inline,
          ..Default::default()
        },
      )
      .map_err(failed("render pass begin"))?;
    self.subpass = Some(0);
    Ok(())
  }

  fn bind_scene(
    &mut self,
    scene: SceneBindings<'_, Subbuffer<[u8]>, Arc<ImageView>>,
  ) -> RendererResult<()> {
    let layout = self
      .pipeline
      .layout()
      .set_layouts()
      .first()
      .cloned()
      .ok_or_else(|| RendererError::resource("descriptor set", "pipeline has no set 0"))?;

    let descriptor_set = DescriptorSet::new(
      self.descriptor_set_allocator.clone(),
      layout,
      [
        WriteDescriptorSet::buffer(0, scene.matrices.clone()),
        WriteDescriptorSet::buffer(1, scene.lights.clone()),
        WriteDescriptorSet::image_view_sampler(2, scene.texture.clone(), self.sampler.clone()),
      ],
      [],
    )
    .map_err(|e| RendererError::resource("descriptor set", e))?;

    self
      .builder
      .bind_pipeline_graphics(self.pipeline.clone())
      .map_err(failed("scene pipeline"))?
      .bind_descriptor_sets(
        PipelineBindPoint::Graphics,
        self.pipeline.layout().clone(),
        0,
        descriptor_set,
      )
      .map_err(failed("descriptor set"))?;
    Ok(())
  }

  fn draw_indexed(&mut self, mesh: &GpuMesh<Subbuffer<[u8]>>) -> RendererResult<()> {
    self
      .builder
      .bind_vertex_buffers(0, mesh.vertex_buffer.clone())
      .map_err(failed("vertex buffer binding"))?
      .bind_index_buffer(mesh.index_buffer.clone().reinterpret::<[u32]>())
      .map_err(failed("index buffer binding"))?;

    // SAFETY: indices were produced by the deduplicator and stay below the
    // vertex count of the bound buffer.
    unsafe { self.builder.draw_indexed(mesh.index_count, 1, 0, 0, 0) }
      .map_err(failed("indexed draw"))?;
    Ok(())
  }
}
