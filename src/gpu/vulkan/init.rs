//! Instance, device and allocator setup.

use std::sync::Arc;

use vulkano::{
  VulkanLibrary,
  command_buffer::allocator::StandardCommandBufferAllocator,
  descriptor_set::allocator::StandardDescriptorSetAllocator,
  device::{
    Device,
    DeviceCreateInfo,
    DeviceExtensions,
    Queue,
    QueueCreateInfo,
    QueueFlags,
    physical::PhysicalDeviceType,
  },
  image::sampler::{Filter, Sampler, SamplerAddressMode, SamplerCreateInfo},
  instance::{Instance, InstanceCreateFlags, InstanceCreateInfo},
  memory::allocator::StandardMemoryAllocator,
  swapchain::Surface,
};
use winit::event_loop::ActiveEventLoop;

use crate::error::{RendererError, RendererResult};

/// Long-lived Vulkan objects that do not depend on the window size.
pub struct VulkanContext {
  pub instance:                 Arc<Instance>,
  pub device:                   Arc<Device>,
  pub queue:                    Arc<Queue>,
  pub memory_allocator:         Arc<StandardMemoryAllocator>,
  pub descriptor_set_allocator: Arc<StandardDescriptorSetAllocator>,
  pub command_buffer_allocator: Arc<StandardCommandBufferAllocator>,
  pub sampler:                  Arc<Sampler>,
}

/// Picks the best graphics queue that can present to windows of
/// `event_loop`, preferring discrete GPUs.
pub fn initialize_vulkan(event_loop: &ActiveEventLoop) -> RendererResult<VulkanContext> {
  let library = VulkanLibrary::new().map_err(|e| RendererError::resource("vulkan library", e))?;
  let required_extensions = Surface::required_extensions(event_loop)
    .map_err(|e| RendererError::resource("surface extensions", e))?;
  let instance = Instance::new(library, InstanceCreateInfo {
    flags: InstanceCreateFlags::ENUMERATE_PORTABILITY,
    enabled_extensions: required_extensions,
    ..Default::default()
  })
  .map_err(|e| RendererError::resource("vulkan instance", e))?;

  let device_extensions = DeviceExtensions {
    khr_swapchain: true,
    ..DeviceExtensions::empty()
  };

  let (physical_device, queue_family_index) = instance
    .enumerate_physical_devices()
    .map_err(|e| RendererError::resource("physical device list", e))?
    .filter(|p| p.supported_extensions().contains(&device_extensions))
    .filter_map(|p| {
      p.queue_family_properties()
        .iter()
        .enumerate()
        .position(|(i, q)| {
          q.queue_flags.intersects(QueueFlags::GRAPHICS)
            && p
              .presentation_support(i as u32, event_loop)
              .unwrap_or(false)
        })
        .map(|i| (p, i as u32))
    })
    .min_by_key(|(p, _)| match p.properties().device_type {
      PhysicalDeviceType::DiscreteGpu => 0,
      PhysicalDeviceType::IntegratedGpu => 1,
      PhysicalDeviceType::VirtualGpu => 2,
      PhysicalDeviceType::Cpu => 3,
      PhysicalDeviceType::Other => 4,
      _ => 5,
    })
    .ok_or_else(|| {
      RendererError::resource("physical device", "no GPU with a presenting graphics queue")
    })?;

  log::info!(
    "using device: {} (type: {:?})",
    physical_device.properties().device_name,
    physical_device.properties().device_type,
  );

  let (device, mut queues) = Device::new(physical_device, DeviceCreateInfo {
    enabled_extensions: device_extensions,
    queue_create_infos: vec![QueueCreateInfo {
      queue_family_index,
      ..Default::default()
    }],
    ..Default::default()
  })
  .map_err(|e| RendererError::resource("logical device", e))?;

  let queue = queues
    .next()
    .ok_or_else(|| RendererError::resource("graphics queue", "device returned no queue"))?;

  let memory_allocator = Arc::new(StandardMemoryAllocator::new_default(device.clone()));
  let descriptor_set_allocator = Arc::new(StandardDescriptorSetAllocator::new(
    device.clone(),
    Default::default(),
  ));
  let command_buffer_allocator = Arc::new(StandardCommandBufferAllocator::new(
    device.clone(),
    Default::default(),
  ));

  let sampler = Sampler::new(device.clone(), SamplerCreateInfo {
    mag_filter: Filter::Linear,
    min_filter: Filter::Linear,
    address_mode: [SamplerAddressMode::Repeat; 3],
    ..Default::default()
  })
  .map_err(|e| RendererError::resource("texture sampler", e))?;

  Ok(VulkanContext {
    instance,
    device,
    queue,
    memory_allocator,
    descriptor_set_allocator,
    command_buffer_allocator,
    sampler,
  })
}
