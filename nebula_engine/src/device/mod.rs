/// Device module - the capability surface consumed from the graphics API
///
/// Everything the engine needs from the device layer is expressed through
/// the [`GraphicsDevice`] and [`CommandRecorder`] traits plus plain handle
/// and descriptor types. Backend crates (e.g. the Vulkan device) implement
/// these traits; the engine core never talks to a graphics API directly.

// Module declarations
pub mod handles;
pub mod resources;
pub mod binding_table;
pub mod pipeline_state;
pub mod recorder;
pub mod graphics_device;
#[cfg(test)]
pub mod mock_device;

// Re-export everything
pub use handles::*;
pub use resources::*;
pub use binding_table::*;
pub use pipeline_state::*;
pub use recorder::*;
pub use graphics_device::*;
