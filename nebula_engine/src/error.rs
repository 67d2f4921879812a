//! Error types for the Nebula engine
//!
//! This module defines the error types used throughout the engine,
//! including device, resource and initialization failures.
//!
//! Per-frame recoverable conditions (stale presentation surface, bindings
//! whose resources are not built yet) are never reported through these
//! types; they travel as ordinary return values so the steady-state frame
//! loop does not need error handling for routine window resizes.

use std::fmt;

/// Result type for Nebula engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Nebula engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan, DirectX, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource or blueprint (malformed descriptor, colliding
    /// binding declarations, mismatched array lengths, ...)
    InvalidResource(String),

    /// Initialization failed (engine, device, subsystems)
    InitializationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Log an ERROR and produce an [`Error::BackendError`] value.
///
/// # Example
///
/// ```no_run
/// let err = engine_err!("nebula::Frame", "Submission failed: {:?}", code);
/// return Err(err);
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        $crate::engine_error!($source, $($arg)*);
        $crate::nebula::Error::BackendError(format!($($arg)*))
    }};
}

/// Log an ERROR and return early with an [`Error::BackendError`].
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

/// Log an ERROR and return early with an [`Error::InvalidResource`].
///
/// Used for configuration mistakes detected at build time (bad blueprints,
/// colliding binding declarations).
#[macro_export]
macro_rules! engine_bail_invalid {
    ($source:expr, $($arg:tt)*) => {{
        $crate::engine_error!($source, $($arg)*);
        return Err($crate::nebula::Error::InvalidResource(format!($($arg)*)));
    }};
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
