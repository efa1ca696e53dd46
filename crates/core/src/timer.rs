//! Frame timing.

use std::time::{Duration, Instant};

/// Measures per-frame delta time and a rolling frame rate.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    frame_count: u64,
    window_start: Instant,
    window_frames: u32,
    average_fps: f32,
}

impl FrameTimer {
    /// Length of the window the frame rate is averaged over.
    pub const FPS_WINDOW: Duration = Duration::from_secs(1);

    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frame_count: 0,
            window_start: now,
            window_frames: 0,
            average_fps: 0.0,
        }
    }

    /// Seconds since the timer was created or last reset.
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Marks the end of a frame and returns the time since the previous one.
    ///
    /// Returns `Some(fps)` in addition whenever an averaging window closes.
    pub fn tick(&mut self) -> (Duration, Option<f32>) {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.frame_count += 1;
        self.window_frames += 1;

        let window = now - self.window_start;
        if window >= Self::FPS_WINDOW {
            self.average_fps = self.window_frames as f32 / window.as_secs_f32();
            self.window_frames = 0;
            self.window_start = now;
            return (delta, Some(self.average_fps));
        }
        (delta, None)
    }

    /// Number of frames ticked so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frame rate of the last completed averaging window.
    pub fn average_fps(&self) -> f32 {
        self.average_fps
    }

    /// Reset all counters to the current time.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = FrameTimer::new();
        for _ in 0..3 {
            timer.tick();
        }
        assert_eq!(timer.frame_count(), 3);
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut timer = FrameTimer::new();
        timer.tick();
        timer.reset();
        assert_eq!(timer.frame_count(), 0);
        assert_eq!(timer.average_fps(), 0.0);
    }
}
