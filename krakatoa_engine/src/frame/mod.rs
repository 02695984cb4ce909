/// Frame pacing, timing and the render context that drives a frame

pub mod config;
pub mod frame_pacer;
pub mod frame_timer;
pub mod render_context;

pub use config::Config;
pub use frame_pacer::{FramePacer, FrameSlotReady, FrameWait};
pub use frame_timer::FrameTimer;
pub use render_context::{FrameOutcome, RenderContext};
