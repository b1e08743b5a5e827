use std::time::{Duration, Instant};

/// Decides when vote weights decay. Runs on wall-clock time, independent of
/// the control period: at most one tick per interval, and the first call
/// always ticks.
#[derive(Debug, Clone)]
pub struct DecayClock {
    interval: Duration,
    last: Option<Instant>,
}

impl DecayClock {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_ticks() {
        let mut clock = DecayClock::new(Duration::from_secs(1));
        assert!(clock.tick(Instant::now()));
    }

    #[test]
    fn at_most_once_per_window_at_fast_cycle_rates() {
        let mut clock = DecayClock::new(Duration::from_secs(1));
        let start = Instant::now();

        // 20 Hz for 3 seconds
        let ticks = (0..60)
            .filter(|i| clock.tick(start + Duration::from_millis(50 * i)))
            .count();

        assert_eq!(ticks, 3);
    }

    #[test]
    fn ticks_again_after_interval() {
        let mut clock = DecayClock::new(Duration::from_secs(1));
        let start = Instant::now();
        assert!(clock.tick(start));
        assert!(!clock.tick(start + Duration::from_millis(999)));
        assert!(clock.tick(start + Duration::from_millis(1000)));
        assert!(!clock.tick(start + Duration::from_millis(1500)));
    }
}
