//! Loop pacing and log throttling

use std::thread;
use std::time::{Duration, Instant};

/// Fixed-period pacing: work, then sleep whatever is left of the period.
///
/// An overrun period is not made up for; the next period starts when `wait` is
/// called.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    next_tick: Instant,
}

impl Cadence {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_tick: Instant::now() + period,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        Self::new(period_for_hz(hz))
    }

    /// Sleeps until the end of the current period and starts the next one
    pub fn wait(&mut self) {
        let now = Instant::now();
        if now < self.next_tick {
            thread::sleep(self.next_tick - now);
            self.next_tick += self.period;
        } else {
            self.next_tick = now + self.period;
        }
    }

    /// Starts a fresh period now, e.g. after an error pause
    pub fn reset(&mut self) {
        self.next_tick = Instant::now() + self.period;
    }
}

pub fn period_for_hz(hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(hz.max(1)))
}

/// Lets one event through per interval and counts the rest
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_event_time: Option<Instant>,
    suppressed: u64,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_event_time: None,
            suppressed: 0,
        }
    }

    pub fn should_process(&mut self) -> bool {
        self.should_process_at(Instant::now())
    }

    pub fn should_process_at(&mut self, now: Instant) -> bool {
        let due = match self.last_event_time {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        };
        if due {
            self.last_event_time = Some(now);
        } else {
            self.suppressed += 1;
        }
        due
    }

    /// Number of events held back since the last call
    pub fn take_suppressed(&mut self) -> u64 {
        std::mem::take(&mut self.suppressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_event_per_window() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        assert!(limiter.should_process_at(start));
        assert!(!limiter.should_process_at(start + Duration::from_millis(100)));
        assert!(!limiter.should_process_at(start + Duration::from_millis(999)));
        assert!(limiter.should_process_at(start + Duration::from_millis(1000)));
        assert!(!limiter.should_process_at(start + Duration::from_millis(1500)));
        assert!(limiter.should_process_at(start + Duration::from_millis(2100)));
    }

    #[test]
    fn suppressed_events_are_counted_and_reset() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.should_process_at(start);
        for ms in 1..=4 {
            limiter.should_process_at(start + Duration::from_millis(ms));
        }
        assert_eq!(limiter.take_suppressed(), 4);
        assert_eq!(limiter.take_suppressed(), 0);
    }

    #[test]
    fn cadence_sleeps_the_remainder() {
        let mut cadence = Cadence::new(Duration::from_millis(20));
        let start = Instant::now();
        cadence.wait();
        cadence.wait();
        assert!(start.elapsed() >= Duration::from_millis(38));
    }

    #[test]
    fn period_from_rate() {
        assert_eq!(period_for_hz(100), Duration::from_millis(10));
        assert_eq!(period_for_hz(0), Duration::from_secs(1));
    }
}
