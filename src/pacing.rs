use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockState {
    Idle,
    Running,
    Stopped,
}

/// Synthetic presentation clock for the sample pacer.
///
/// `Idle → Running → Stopped`: `start()` arms the clock so the first
/// `advance()` stamps exactly 0, each later one adds one frame duration.
/// `rewind()` resets the index at a loop boundary, `halt()` parks the clock
/// at non-looping end of stream, `stop()` returns to Idle so the owner must
/// `start()` again before ticking.
#[derive(Debug)]
pub struct PacingClock {
    frame_duration_us: u64,
    frame_index: u64,
    state: ClockState,
}

impl PacingClock {
    pub fn new(frame_duration_us: u64) -> Self {
        Self {
            frame_duration_us,
            frame_index: 0,
            state: ClockState::Idle,
        }
    }

    pub fn start(&mut self) {
        self.frame_index = 0;
        self.state = ClockState::Running;
    }

    pub fn stop(&mut self) {
        self.frame_index = 0;
        self.state = ClockState::Idle;
    }

    pub fn halt(&mut self) {
        self.state = ClockState::Stopped;
    }

    pub fn rewind(&mut self) {
        self.frame_index = 0;
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    pub fn frame_duration_us(&self) -> u64 {
        self.frame_duration_us
    }

    /// Timestamp for the next emitted sample. Saturating, never wraps.
    pub fn advance(&mut self) -> u64 {
        let time_us = self.frame_index.saturating_mul(self.frame_duration_us);
        self.frame_index = self.frame_index.saturating_add(1);
        time_us
    }
}

pub type RateHook = Box<dyn FnMut(u64) + Send>;

/// Per-tick throughput meter. Counts ticks and, once per reporting
/// interval, hands the measured rate to an injected hook instead of keeping
/// any process-wide counter.
pub struct RateMeter {
    interval: Duration,
    last_report: Instant,
    ticks: u64,
    hook: RateHook,
}

impl RateMeter {
    pub fn new(interval: Duration, hook: RateHook) -> Self {
        Self {
            interval,
            last_report: Instant::now(),
            ticks: 0,
            hook,
        }
    }

    pub fn with_default_hook(interval: Duration) -> Self {
        Self::new(
            interval,
            Box::new(|fps| tracing::debug!(fps, "processing rate")),
        )
    }

    pub fn tick(&mut self) {
        self.ticks += 1;
        let elapsed = self.last_report.elapsed();
        if elapsed >= self.interval {
            let secs = elapsed.as_secs_f64();
            let rate = if secs > 0.0 {
                (self.ticks as f64 / secs).round() as u64
            } else {
                self.ticks
            };
            (self.hook)(rate);
            self.ticks = 0;
            self.last_report = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_first_advance_is_zero() {
        let mut clock = PacingClock::new(40_000);
        clock.start();
        assert_eq!(clock.advance(), 0);
        assert_eq!(clock.advance(), 40_000);
        assert_eq!(clock.advance(), 80_000);
    }

    #[test]
    fn test_rewind_resets_epoch() {
        let mut clock = PacingClock::new(33_333);
        clock.start();
        clock.advance();
        clock.advance();
        clock.rewind();
        assert_eq!(clock.advance(), 0);
        assert!(clock.is_running());
    }

    #[test]
    fn test_idle_until_started_and_after_stop() {
        let mut clock = PacingClock::new(40_000);
        assert!(!clock.is_running());
        clock.start();
        assert!(clock.is_running());
        clock.stop();
        assert!(!clock.is_running());
        // start() re-arms from zero
        clock.start();
        assert_eq!(clock.advance(), 0);
    }

    #[test]
    fn test_halt_parks_the_clock() {
        let mut clock = PacingClock::new(40_000);
        clock.start();
        clock.advance();
        clock.halt();
        assert!(!clock.is_running());
    }

    #[test]
    fn test_advance_saturates_instead_of_wrapping() {
        let mut clock = PacingClock::new(u64::MAX);
        clock.start();
        assert_eq!(clock.advance(), 0);
        assert_eq!(clock.advance(), u64::MAX);
        assert_eq!(clock.advance(), u64::MAX);
    }

    #[test]
    fn test_rate_meter_reports_through_hook() {
        let reports = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&reports);
        let mut meter = RateMeter::new(
            Duration::ZERO,
            Box::new(move |_| {
                seen.fetch_add(1, Ordering::Relaxed);
            }),
        );
        meter.tick();
        meter.tick();
        assert_eq!(reports.load(Ordering::Relaxed), 2);
    }
}
