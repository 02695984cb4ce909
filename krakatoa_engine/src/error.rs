//! Error types for the Krakatoa engine
//!
//! This module defines the error types used throughout the engine,
//! including device setup, frame pacing, and resource management.
//!
//! Library code never terminates the process. Setup failures are returned
//! as [`Error`] values and the application boundary decides what is fatal
//! (see [`OrAbort`]).

use std::fmt;

/// Result type for Krakatoa engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Krakatoa engine errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (Vulkan, mock device, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (buffer, image, descriptor set, etc.)
    InvalidResource(String),

    /// Initialization failed (device, swapchain, pools, sync objects)
    InitializationFailed(String),

    /// An operation was called out of sequence (e.g. reading a ring slot
    /// before the first advance)
    InvalidState(String),

    /// The presentation surface no longer matches the swapchain
    SurfaceOutOfDate,

    /// A bounded wait expired before the GPU signaled
    Timeout,
}

impl Error {
    /// Whether this error belongs to the environment/setup class.
    ///
    /// Stale surfaces and expired waits are per-frame conditions the frame
    /// loop recovers from; everything else means the GPU environment is
    /// unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::SurfaceOutOfDate | Error::Timeout)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::SurfaceOutOfDate => write!(f, "Surface out of date"),
            Error::Timeout => write!(f, "GPU wait timed out"),
        }
    }
}

impl std::error::Error for Error {}

/// Terminate the process on fatal errors.
///
/// Intended for application entry points: environment failures at this
/// layer are unrecoverable, so the diagnostic is logged and the process
/// aborts. Non-fatal errors are handed back unchanged.
pub trait OrAbort<T> {
    fn or_abort(self, source: &str) -> Result<T>;
}

impl<T> OrAbort<T> for Result<T> {
    fn or_abort(self, source: &str) -> Result<T> {
        match self {
            Err(e) if e.is_fatal() => {
                crate::engine_error!(source, "Fatal: {}", e);
                std::process::abort();
            }
            other => other,
        }
    }
}

// ===== ERROR MACROS =====

/// Log an error and build an [`Error::BackendError`] from the same message
///
/// # Example
///
/// ```ignore
/// return Err(engine_err!("krakatoa::vulkan", "Failed to create fence: {:?}", e));
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::krakatoa::Error::BackendError(message)
    }};
}

/// Log an error and return it as `Err(Error::BackendError(..))`
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
