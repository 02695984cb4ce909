/*!
# Krakatoa Engine - Vulkan Backend

Vulkan implementation of the `krakatoa_engine` [`GpuDevice`] trait, built on
`ash` for the bindings and `gpu-allocator` for memory.

[`VulkanDevice`] owns the instance, logical device, queues (one per distinct
family, so uploads can run on a dedicated transfer queue), the swapchain with
its render pass, and the descriptor pools. Validation layers and the debug
messenger are compiled in with the `vulkan-validation` feature.

```no_run
use std::sync::Arc;
use krakatoa_engine::krakatoa::frame::{Config, RenderContext};
use krakatoa_engine::krakatoa::gpu::GpuDevice;
use krakatoa_engine_renderer_vulkan::{SpirvDirectory, VulkanConfig, VulkanDevice};

# fn run(window: &winit::window::Window) -> krakatoa_engine::krakatoa::Result<()> {
let device: Arc<dyn GpuDevice> = Arc::new(VulkanDevice::new(window, &VulkanConfig::default())?);
let shaders = SpirvDirectory::new("shaders");
let context = RenderContext::new(device, &shaders, Config::default())?;
# Ok(())
# }
```

[`GpuDevice`]: krakatoa_engine::krakatoa::gpu::GpuDevice
*/

mod vulkan_config;
mod vulkan_context;
mod vulkan_convert;
// Only the messenger path calls into the callback
#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
mod vulkan_debug;
mod vulkan_descriptors;
mod vulkan_device;
mod vulkan_pipeline;
mod vulkan_shader_source;
mod vulkan_swapchain;

pub use vulkan_config::{DebugConfig, DebugMessageFilter, DebugOutput, DebugSeverity, VulkanConfig};
pub use vulkan_debug::{print_validation_stats_report, validation_stats, ValidationStats};
pub use vulkan_device::VulkanDevice;
pub use vulkan_shader_source::SpirvDirectory;
