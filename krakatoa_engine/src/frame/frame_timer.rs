/// Per-frame delta and total time with pause support.
///
/// `tick()` is called once at the start of every frame. The delta is zero on
/// the first tick and while paused; the paused interval is never counted,
/// including by the first tick after `resume()`.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct FrameTimer {
    last_tick: Instant,
    delta: Duration,
    total: Duration,
    paused: bool,
    first_tick: bool,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            last_tick: now,
            delta: Duration::ZERO,
            total: Duration::ZERO,
            paused: false,
            first_tick: true,
        }
    }

    /// Advance the timer, returning the new delta
    pub fn tick(&mut self) -> Duration {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Duration {
        self.delta = if self.first_tick || self.paused {
            Duration::ZERO
        } else {
            now.saturating_duration_since(self.last_tick)
        };
        self.first_tick = false;
        self.total += self.delta;
        self.last_tick = now;
        self.delta
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.resume_at(Instant::now());
    }

    fn resume_at(&mut self, now: Instant) {
        if self.paused {
            self.paused = false;
            self.last_tick = now;
        }
    }

    /// Time between the last two ticks
    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Total unpaused time
    pub fn elapsed(&self) -> Duration {
        self.total
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "frame_timer_tests.rs"]
mod tests;
