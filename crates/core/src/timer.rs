//! Clocks for animation time and frame pacing.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
///
/// The timer can be paused; paused time does not count towards
/// [`Timer::elapsed`], which is what drives the animation clock.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    /// Total running time since creation or the last reset, excluding pauses.
    pub fn elapsed(&self) -> Duration {
        let end = self.paused_at.unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.start)
            .saturating_sub(self.paused_total)
    }

    /// Running time in seconds.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Stop the running clock. No-op if already paused.
    pub fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    /// Resume a paused clock. No-op if running.
    pub fn resume(&mut self) {
        if let Some(at) = self.paused_at.take() {
            self.paused_total += at.elapsed();
        }
    }

    /// Flip between paused and running. Returns `true` if now paused.
    pub fn toggle_pause(&mut self) -> bool {
        if self.is_paused() {
            self.resume();
        } else {
            self.pause();
        }
        self.is_paused()
    }

    /// Whether the clock is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Reset the timer to the current time, keeping the paused flag.
    pub fn reset(&mut self) {
        let now = Instant::now();
        let was_paused = self.is_paused();
        self.start = now;
        self.paused_total = Duration::ZERO;
        self.paused_at = was_paused.then_some(now);
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Caps the rate at which frames are started.
///
/// `FramePacer::should_render` answers whether enough time has passed since
/// the previous frame; the event loop uses [`FramePacer::next_deadline`] to
/// sleep until then instead of spinning.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    last_frame: Option<Instant>,
}

impl FramePacer {
    /// Pace to `fps` frames per second. `0` disables pacing.
    pub fn new(fps: u32) -> Self {
        let interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / f64::from(fps))
        };
        Self {
            interval,
            last_frame: None,
        }
    }

    /// Minimum time between two frames.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` and records the frame start if a frame is due at `now`.
    pub fn should_render(&mut self, now: Instant) -> bool {
        match self.last_frame {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_frame = Some(now);
                true
            }
        }
    }

    /// Instant at which the next frame becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.last_frame.map(|last| last + self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paused_timer_does_not_advance() {
        let mut timer = Timer::new();
        timer.pause();
        let first = timer.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(timer.elapsed(), first);
        assert!(timer.is_paused());
    }

    #[test]
    fn test_toggle_pause() {
        let mut timer = Timer::new();
        assert!(timer.toggle_pause());
        assert!(!timer.toggle_pause());
    }

    #[test]
    fn test_reset_keeps_pause_state() {
        let mut timer = Timer::new();
        timer.pause();
        timer.reset();
        assert!(timer.is_paused());
        assert_eq!(timer.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_pacer_rejects_early_frames() {
        let mut pacer = FramePacer::new(60);
        let t0 = Instant::now();
        assert!(pacer.should_render(t0));
        assert!(!pacer.should_render(t0 + Duration::from_millis(1)));
        assert!(pacer.should_render(t0 + Duration::from_millis(17)));
    }

    #[test]
    fn test_pacer_zero_fps_never_blocks() {
        let mut pacer = FramePacer::new(0);
        let t0 = Instant::now();
        assert!(pacer.should_render(t0));
        assert!(pacer.should_render(t0));
        assert_eq!(pacer.interval(), Duration::ZERO);
    }
}
