/*!
# Nebula Engine - Vulkan Device

Vulkan implementation of the `nebula_engine` capability surface, built on
[ash](https://crates.io/crates/ash) with GPU memory managed by
[gpu-allocator](https://crates.io/crates/gpu-allocator).

The engine core drives all GPU work through the `GraphicsDevice` and
`CommandRecorder` traits; this crate maps those calls onto a Vulkan 1.3
instance/device pair created for a winit window.

## Usage

```no_run
use std::sync::Arc;
use nebula_engine::{Engine, EngineDesc};
use nebula_engine::nebula::device::{Extent2d, GraphicsDevice};
use nebula_engine_device_vulkan::{DeviceConfig, VulkanDevice};

# fn run(window: winit::window::Window) -> nebula_engine::Result<()> {
let device: Arc<dyn GraphicsDevice> =
    Arc::new(VulkanDevice::new(&window, DeviceConfig::default())?);
let window = Arc::new(window);
let extent_window = Arc::clone(&window);
let mut engine = Engine::new(
    device,
    Box::new(move || {
        let size = extent_window.inner_size();
        Extent2d::new(size.width, size.height)
    }),
    EngineDesc::default(),
)?;
# Ok(())
# }
```

## Features

- `vulkan-validation`: compiles in the Khronos validation layer plus a
  debug messenger that routes validation messages into the engine logger.
*/

mod vulkan_context;
mod vulkan_device;
mod vulkan_format;
mod vulkan_recorder;
mod vulkan_sampler;
mod vulkan_swapchain;
#[cfg(feature = "vulkan-validation")]
mod vulkan_debug;

pub use vulkan_device::{DeviceConfig, VulkanDevice};
pub use vulkan_recorder::Recorder;
