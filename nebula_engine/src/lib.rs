/*!
# Nebula Engine

Core traits and types for the Nebula rendering engine.

This crate provides the platform-agnostic frame-pacing and
resource-synchronization core: the N-buffered frame scheduler, the
swapchain lifecycle manager with its resize cascade, the descriptor
binding sets with their validity protocol, and the resource pool.
Backend implementations (Vulkan, etc.) implement the capability surface
in [`device`] and are plugged in at engine creation.

## Architecture

- **GraphicsDevice / CommandRecorder**: the capability surface consumed
  from the device layer
- **FrameScheduler**: N-buffered frame pacing (begin/end, compute overlap)
- **SwapchainManager**: presentable chain lifecycle + resize cascade
- **DescriptorBindingSet**: resource references with per-binding validity
- **ResourcePool**: buffer/image/sampler build, fill and teardown
- **Pipeline**: compiled programs with binding sets and push constants
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod device;
pub mod frame;
pub mod swapchain;
pub mod binding;
pub mod resource;
pub mod target;
pub mod pipeline;

// Main nebula namespace module
pub mod nebula {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine driver
    pub use crate::engine::{Engine, EngineDesc};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
        // Note: engine_* macros are NOT re-exported here - they are crate-root macros
    }

    // Device capability surface
    pub mod device {
        pub use crate::device::*;
    }

    // Frame pacing
    pub mod frame {
        pub use crate::frame::*;
    }

    // Swapchain lifecycle
    pub mod swapchain {
        pub use crate::swapchain::*;
    }

    // Binding sets and declarations
    pub mod binding {
        pub use crate::binding::*;
    }

    // Resources
    pub mod resource {
        pub use crate::resource::*;
    }

    // Render targets
    pub mod target {
        pub use crate::target::*;
    }

    // Pipelines
    pub mod pipeline {
        pub use crate::pipeline::*;
    }
}

// Flat re-exports for the common entry points
pub use engine::{Engine, EngineDesc};
pub use error::{Error, Result};
