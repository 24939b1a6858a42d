//! Swapchain, render pass and everything that depends on the window size.
//!
//! The render pass has two subpasses: the scene renders into a 4x
//! multisampled color target that resolves into the swapchain image, and the
//! second subpass draws the overlay directly onto the resolved image.

use std::sync::Arc;

use vulkano::{
  device::{Device, DeviceOwned},
  format::Format,
  image::{Image, ImageCreateInfo, ImageType, ImageUsage, SampleCount, view::ImageView},
  memory::allocator::{AllocationCreateInfo, StandardMemoryAllocator},
  pipeline::{
    GraphicsPipeline,
    PipelineLayout,
    PipelineShaderStageCreateInfo,
    graphics::{
      GraphicsPipelineCreateInfo,
      color_blend::{ColorBlendAttachmentState, ColorBlendState},
      depth_stencil::{DepthState, DepthStencilState},
      input_assembly::InputAssemblyState,
      multisample::MultisampleState,
      rasterization::{CullMode, RasterizationState},
      vertex_input::{Vertex, VertexDefinition},
      viewport::{Viewport, ViewportState},
    },
    layout::PipelineDescriptorSetLayoutCreateInfo,
  },
  render_pass::{Framebuffer, FramebufferCreateInfo, RenderPass, Subpass},
  shader::{EntryPoint, ShaderModule, ShaderModuleCreateInfo},
  swapchain::{
    CompositeAlpha,
    PresentMode,
    Surface,
    Swapchain,
    SwapchainCreateInfo,
  },
};
use winit::dpi::PhysicalSize;

use crate::{
  error::{RendererError, RendererResult},
  shader::{ShaderPaths, read_shader_artifact},
  vertex::CompactVertex,
};

pub const DEPTH_FORMAT: Format = Format::D32_SFLOAT;
pub const SAMPLES: SampleCount = SampleCount::Sample4;

pub fn create_swapchain(
  device: &Arc<Device>,
  surface: &Arc<Surface>,
  window_size: PhysicalSize<u32>,
  vsync: bool,
) -> RendererResult<(Arc<Swapchain>, Vec<Arc<Image>>)> {
  let physical_device = device.physical_device();
  let surface_capabilities = physical_device
    .surface_capabilities(surface, Default::default())
    .map_err(|e| RendererError::resource("surface capabilities", e))?;

  let present_modes = physical_device
    .surface_present_modes(surface, Default::default())
    .map_err(|e| RendererError::resource("present modes", e))?;

  let present_mode = if vsync {
    PresentMode::Fifo
  } else if present_modes.contains(&PresentMode::Mailbox) {
    PresentMode::Mailbox
  } else if present_modes.contains(&PresentMode::Immediate) {
    PresentMode::Immediate
  } else {
    PresentMode::Fifo
  };
  log::info!("present mode: {present_mode:?}");

  let formats = physical_device
    .surface_formats(surface, Default::default())
    .map_err(|e| RendererError::resource("surface formats", e))?;
  let (image_format, _) = formats
    .iter()
    .copied()
    .find(|(format, _)| {
      matches!(
        format,
        Format::B8G8R8A8_UNORM | Format::R8G8B8A8_UNORM | Format::A8B8G8R8_UNORM_PACK32
      )
    })
    .or_else(|| formats.first().copied())
    .ok_or_else(|| RendererError::resource("swapchain", "surface reports no formats"))?;
  log::debug!("swapchain format: {image_format:?}");

  Swapchain::new(device.clone(), surface.clone(), SwapchainCreateInfo {
    min_image_count: surface_capabilities.min_image_count.max(2),
    image_format,
    image_extent: window_size.into(),
    image_usage: ImageUsage::COLOR_ATTACHMENT,
    composite_alpha: CompositeAlpha::Opaque,
    pre_transform: surface_capabilities.current_transform,
    clipped: true,
    present_mode,
    ..Default::default()
  })
  .map_err(|e| RendererError::resource("swapchain", e))
}

pub fn create_render_pass(device: &Arc<Device>, format: Format) -> RendererResult<Arc<RenderPass>> {
  vulkano::ordered_passes_renderpass!(
    device.clone(),
    attachments: {
      msaa_color: {
        format: format,
        samples: 4,
        load_op: Clear,
        store_op: DontCare,
      },
      final_color: {
        format: format,
        samples: 1,
        load_op: DontCare,
        store_op: Store,
      },
      depth: {
        format: DEPTH_FORMAT,
        samples: 4,
        load_op: Clear,
        store_op: DontCare,
      }
    },
    passes: [
      {
        color: [msaa_color],
        color_resolve: [final_color],
        depth_stencil: {depth},
        input: []
      },
      {
        color: [final_color],
        depth_stencil: {},
        input: []
      }
    ]
  )
  .map_err(|e| RendererError::resource("render pass", e))
}

/// Loads the precompiled scene shaders and returns their `main` entry points.
pub fn load_shaders(
  device: &Arc<Device>,
  paths: &ShaderPaths,
) -> RendererResult<(EntryPoint, EntryPoint)> {
  Ok((
    load_entry_point(device, &paths.vertex)?,
    load_entry_point(device, &paths.fragment)?,
  ))
}

fn load_entry_point(device: &Arc<Device>, path: &std::path::Path) -> RendererResult<EntryPoint> {
  let words = read_shader_artifact(path)?;
  // SAFETY: the words passed the SPIR-V header check; vulkano validates the
  // module's interface against the pipeline when it is linked.
  let module = unsafe { ShaderModule::new(device.clone(), ShaderModuleCreateInfo::new(&words)) }
    .map_err(|e| RendererError::ShaderArtifactInvalid {
      path:   path.to_path_buf(),
      reason: e.to_string(),
    })?;
  module
    .entry_point("main")
    .ok_or_else(|| RendererError::ShaderArtifactInvalid {
      path:   path.to_path_buf(),
      reason: "no `main` entry point".into(),
    })
}

/// Inputs for [`window_size_dependent_setup`].
#[derive(Clone)]
pub struct WindowSizeSetupConfig<'a> {
  pub window_size:      PhysicalSize<u32>,
  pub images:           &'a [Arc<Image>],
  pub render_pass:      &'a Arc<RenderPass>,
  pub memory_allocator: &'a Arc<StandardMemoryAllocator>,
  pub vertex_shader:    &'a EntryPoint,
  pub fragment_shader:  &'a EntryPoint,
}

/// Creates the framebuffers and the scene pipeline for the current swapchain
/// images. Called at startup and after every swapchain rebuild.
pub fn window_size_dependent_setup(
  config: WindowSizeSetupConfig,
) -> RendererResult<(Vec<Arc<Framebuffer>>, Arc<GraphicsPipeline>)> {
  let device = config.memory_allocator.device();
  let first = config
    .images
    .first()
    .ok_or_else(|| RendererError::resource("framebuffer", "swapchain has no images"))?;

  let attachment = |format: Format, usage: ImageUsage| -> RendererResult<Arc<ImageView>> {
    let image = Image::new(
      config.memory_allocator.clone(),
      ImageCreateInfo {
        image_type: ImageType::Dim2d,
        format,
        extent: first.extent(),
        usage: usage | ImageUsage::TRANSIENT_ATTACHMENT,
        samples: SAMPLES,
        ..Default::default()
      },
      AllocationCreateInfo::default(),
    )
    .map_err(|e| RendererError::resource("render target", e))?;
    ImageView::new_default(image).map_err(|e| RendererError::resource("render target view", e))
  };

  let depth_buffer = attachment(DEPTH_FORMAT, ImageUsage::DEPTH_STENCIL_ATTACHMENT)?;

  let framebuffers = config
    .images
    .iter()
    .map(|image| {
      let view = ImageView::new_default(image.clone())
        .map_err(|e| RendererError::resource("swapchain image view", e))?;
      let msaa_color = attachment(image.format(), ImageUsage::COLOR_ATTACHMENT)?;

      Framebuffer::new(config.render_pass.clone(), FramebufferCreateInfo {
        attachments: vec![msaa_color, view, depth_buffer.clone()],
        ..Default::default()
      })
      .map_err(|e| RendererError::resource("framebuffer", e))
    })
    .collect::<RendererResult<Vec<_>>>()?;

  let vertex_input_state = CompactVertex::per_vertex()
    .definition(config.vertex_shader)
    .map_err(|e| RendererError::resource("vertex input state", e))?;

  let stages = [
    PipelineShaderStageCreateInfo::new(config.vertex_shader.clone()),
    PipelineShaderStageCreateInfo::new(config.fragment_shader.clone()),
  ];

  let layout = PipelineLayout::new(
    device.clone(),
    PipelineDescriptorSetLayoutCreateInfo::from_stages(&stages)
      .into_pipeline_layout_create_info(device.clone())
      .map_err(|e| RendererError::resource("pipeline layout", format!("{e:?}")))?,
  )
  .map_err(|e| RendererError::resource("pipeline layout", e))?;

  let subpass = Subpass::from(config.render_pass.clone(), 0)
    .ok_or_else(|| RendererError::resource("scene pipeline", "render pass has no scene subpass"))?;

  let pipeline = GraphicsPipeline::new(device.clone(), None, GraphicsPipelineCreateInfo {
    stages: stages.into_iter().collect(),
    vertex_input_state: Some(vertex_input_state),
    input_assembly_state: Some(InputAssemblyState::default()),
    viewport_state: Some(ViewportState {
      viewports: [Viewport {
        offset:      [0.0, 0.0],
        extent:      config.window_size.into(),
        depth_range: 0.0..=1.0,
      }]
      .into_iter()
      .collect(),
      ..Default::default()
    }),
    rasterization_state: Some(RasterizationState {
      cull_mode: CullMode::None,
      ..Default::default()
    }),
    depth_stencil_state: Some(DepthStencilState {
      depth: Some(DepthState::simple()),
      ..Default::default()
    }),
    multisample_state: Some(MultisampleState {
      rasterization_samples: SAMPLES,
      ..Default::default()
    }),
    color_blend_state: Some(ColorBlendState::with_attachment_states(
      subpass.num_color_attachments(),
      ColorBlendAttachmentState::default(),
    )),
    subpass: Some(subpass.into()),
    ..GraphicsPipelineCreateInfo::layout(layout)
  })
  .map_err(|e| RendererError::resource("scene pipeline", e))?;

  Ok((framebuffers, pipeline))
}
