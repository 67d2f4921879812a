/// Frame module - flight slots and the frame scheduler

// Module declarations
pub mod flight_slot;
pub mod scheduler;

// Re-export from modules
pub use flight_slot::*;
pub use scheduler::*;
