//! Frame pacing and resize debouncing.
//!
//! Both types take the current time as an argument so the frame loop decides
//! what "now" is and tests can step time by hand.

use std::time::Duration;

use instant::Instant;

/// Lets a frame through only when at least `interval` has passed since the last
/// frame that was let through.
#[derive(Clone, Copy, Debug)]
pub struct FrameThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl FrameThrottle {
    pub fn new(target_fps: u32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / target_fps.max(1) as f64),
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Earliest time the next frame will be let through.
    pub fn next_frame_at(&self) -> Option<Instant> {
        self.last.map(|last| last + self.interval)
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Collapses a burst of resize events into the last one, released once no
/// further event arrived for `delay`.
#[derive(Clone, Copy, Debug)]
pub struct ResizeDebounce {
    delay: Duration,
    pending: Option<((u32, u32), Instant)>,
}

impl ResizeDebounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule(&mut self, size: (u32, u32), now: Instant) {
        self.pending = Some((size, now));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take_ready(&mut self, now: Instant) -> Option<(u32, u32)> {
        match self.pending {
            Some((size, at)) if now.saturating_duration_since(at) >= self.delay => {
                self.pending = None;
                Some(size)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_skips_frames_inside_the_interval() {
        let start = Instant::now();
        let mut throttle = FrameThrottle::new(30);
        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_millis(10)));
        assert!(!throttle.ready(start + Duration::from_millis(33)));
        assert!(throttle.ready(start + Duration::from_millis(34)));
        // measured from the last executed frame, not the last attempt
        assert!(!throttle.ready(start + Duration::from_millis(60)));
        assert!(throttle.ready(start + Duration::from_millis(68)));
    }

    #[test]
    fn sixty_hertz_vsync_runs_every_other_frame() {
        let start = Instant::now();
        let mut throttle = FrameThrottle::new(30);
        let ran = (0..60)
            .filter(|i| throttle.ready(start + Duration::from_micros(16_667 * i)))
            .count();
        assert_eq!(ran, 30);
    }

    #[test]
    fn debounce_releases_only_the_last_size() {
        let start = Instant::now();
        let mut debounce = ResizeDebounce::new(Duration::from_millis(100));
        debounce.schedule((800, 600), start);
        debounce.schedule((900, 700), start + Duration::from_millis(50));
        assert_eq!(debounce.take_ready(start + Duration::from_millis(120)), None);
        assert_eq!(
            debounce.take_ready(start + Duration::from_millis(150)),
            Some((900, 700))
        );
        assert!(!debounce.is_pending());
        assert_eq!(debounce.take_ready(start + Duration::from_millis(400)), None);
    }
}
