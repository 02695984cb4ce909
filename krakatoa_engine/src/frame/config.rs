/// Render context configuration

use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Frames the CPU may record ahead of the GPU
    pub frames_in_flight: usize,
    /// Sweeps an undrawn uniform cache entry survives
    pub uniform_grace: u32,
    /// Bound on every fence wait; `None` waits forever
    pub fence_timeout: Option<Duration>,
    pub clear_color: [f32; 4],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            uniform_grace: 8,
            fence_timeout: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(Error::InitializationFailed("frames_in_flight must be at least 1".to_string()));
        }
        if self.fence_timeout == Some(Duration::ZERO) {
            return Err(Error::InitializationFailed(
                "fence_timeout of zero would stall every frame".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the frame depth against the swapchain. The acquire semaphore
    /// rotation is only safe while frames in flight do not exceed images.
    pub fn validate_for_swapchain(&self, image_count: u32) -> Result<()> {
        self.validate()?;
        if self.frames_in_flight > image_count as usize {
            return Err(Error::InitializationFailed(format!(
                "{} frames in flight exceed {} swapchain images",
                self.frames_in_flight, image_count
            )));
        }
        Ok(())
    }
}
