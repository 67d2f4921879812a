/// Binding module - descriptor binding sets and their validity protocol

// Module declarations
pub mod declaration;
pub mod binding_set;

// Re-export from modules
pub use declaration::*;
pub use binding_set::*;
