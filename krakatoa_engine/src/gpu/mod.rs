/// GPU abstraction module - device trait, handles and descriptor types

pub mod handles;
pub mod queue;
pub mod barrier;
pub mod resources;
pub mod device;
pub mod scoped;

pub use handles::*;
pub use queue::*;
pub use barrier::*;
pub use resources::*;
pub use device::*;
pub use scoped::*;

// Mock device for tests (no GPU required)
#[cfg(test)]
pub mod mock_device;
