/*!
# Krakatoa Engine

GPU resource and frame-synchronization core for a real-time camera-backed
renderer.

The crate is backend-agnostic: every GPU operation goes through the
[`GpuDevice`](krakatoa::gpu::GpuDevice) trait, implemented over Vulkan by
`krakatoa_engine_renderer_vulkan`.

## Architecture

- **RingSlotSet**: one resource instance per frame in flight with a cursor
- **CommandSubmissionManager**: command pools, frame command buffers and
  blocking one-shot uploads with queue ownership transfer
- **FramePacer**: frame fences, per-image semaphores and image occupancy
- **ResourceCache**: per-object uniform buffers with death-counter eviction
- **CameraPlaneIngestor**: YUV luma/chroma plane upload
- **RenderContext**: the frame loop tying them together
*/

mod error;
mod engine;
pub mod log;
pub mod utils;
pub mod gpu;
pub mod command;
pub mod frame;
pub mod resource;
pub mod camera;
pub mod pipeline;

// Main krakatoa namespace module
pub mod krakatoa {
    // Error types
    pub use crate::error::{Error, Result, OrAbort};

    // Logging entry point
    pub use crate::engine::Engine;

    // Logging sub-module (types only; the engine_* macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    pub mod gpu {
        pub use crate::gpu::*;
    }

    pub mod command {
        pub use crate::command::*;
    }

    pub mod frame {
        pub use crate::frame::*;
    }

    pub mod resource {
        pub use crate::resource::*;
    }

    pub mod camera {
        pub use crate::camera::*;
    }

    pub mod pipeline {
        pub use crate::pipeline::*;
    }

    pub mod utils {
        pub use crate::utils::*;
    }
}

// Re-export math library at crate root
pub use glam;
