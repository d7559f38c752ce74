//! Rate limit for recognition passes.

use std::time::Duration;
use tokio::time::Instant;

/// Admits at most one event per `interval`.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// True (and records `now`) when at least `interval` has passed since the
    /// last admitted event. The first call is always admitted.
    pub fn ready(&mut self, now: Instant) -> bool {
        let admit = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if admit {
            self.last = Some(now);
        }
        admit
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_admitted() {
        let mut t = Throttle::new(Duration::from_millis(100));
        assert!(t.ready(Instant::now()));
    }

    #[test]
    fn test_one_per_interval_at_display_rate() {
        let mut t = Throttle::new(Duration::from_millis(100));
        let start = Instant::now();

        // 60 Hz display ticks for one second
        let admitted: Vec<u64> = (0..60u64)
            .map(|i| i * 1000 / 60)
            .filter(|&ms| t.ready(start + Duration::from_millis(ms)))
            .collect();

        assert_eq!(admitted.first(), Some(&0));
        assert!(admitted.windows(2).all(|w| w[1] - w[0] >= 100));
        assert!(admitted.len() <= 10);
    }

    #[test]
    fn test_rejected_ticks_do_not_delay() {
        let mut t = Throttle::new(Duration::from_millis(100));
        let start = Instant::now();
        assert!(t.ready(start));
        assert!(!t.ready(start + Duration::from_millis(99)));
        assert!(t.ready(start + Duration::from_millis(100)));
    }

    #[test]
    fn test_reset() {
        let mut t = Throttle::new(Duration::from_secs(10));
        let now = Instant::now();
        assert!(t.ready(now));
        t.reset();
        assert!(t.ready(now));
    }
}
