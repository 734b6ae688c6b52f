//! Frame timing: delta time and a rolling frames-per-second figure.

use std::time::{Duration, Instant};

/// Window over which frame counts are averaged into an FPS value.
const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Measures time between frames and averages the frame rate.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    window_start: Instant,
    frames_in_window: u32,
    fps: f32,
}

impl FrameTimer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            start: now,
            last_tick: now,
            window_start: now,
            frames_in_window: 0,
            fps: 0.0,
        }
    }

    /// Total time since the timer was created or last reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Advance one frame and return the delta since the previous tick.
    ///
    /// Returns `Some(fps)` as the second element whenever a new averaging
    /// window has completed.
    pub fn tick(&mut self) -> (Duration, Option<f32>) {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> (Duration, Option<f32>) {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.frames_in_window += 1;

        let window = now.saturating_duration_since(self.window_start);
        if window >= FPS_WINDOW {
            self.fps = self.frames_in_window as f32 / window.as_secs_f32();
            self.frames_in_window = 0;
            self.window_start = now;
            (delta, Some(self.fps))
        } else {
            (delta, None)
        }
    }

    /// Most recent averaged frame rate, 0 until the first window completes.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Restart all measurements from now.
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
    fn test_tick_reports_delta() {
        let t0 = Instant::now();
        let mut timer = FrameTimer::starting_at(t0);
        let (delta, fps) = timer.tick_at(t0 + Duration::from_millis(16));
        assert_eq!(delta, Duration::from_millis(16));
        assert!(fps.is_none());
    }

    #[test]
    fn test_fps_after_window() {
        let t0 = Instant::now();
        let mut timer = FrameTimer::starting_at(t0);
        let mut reported = None;
        for i in 1..=60u64 {
            let (_, fps) = timer.tick_at(t0 + Duration::from_micros(i * 16_667));
            if fps.is_some() {
                reported = fps;
            }
        }
        let fps = reported.expect("a full window elapsed");
        assert!((fps - 60.0).abs() < 1.0, "fps was {fps}");
        assert_eq!(timer.fps(), fps);
    }
}
