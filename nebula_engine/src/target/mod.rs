/// Target module - off-screen render targets

// Module declarations
pub mod render_target;

// Re-export from modules
pub use render_target::*;
