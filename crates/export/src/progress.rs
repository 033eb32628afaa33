use std::collections::VecDeque;
use std::time::{Duration, Instant};


/// Sliding-window speed meter over a monotonic total.
///
/// Observations older than the window are dropped; the reported speed is
/// the increase between the oldest retained observation and the latest.
pub struct SpeedMeter {
    window: Duration,
    samples: VecDeque<(Instant, u64)>
}


impl SpeedMeter {
    pub fn new(window: Duration) -> SpeedMeter {
        assert!(!window.is_zero());
        SpeedMeter {
            window,
            samples: VecDeque::new()
        }
    }

    pub fn observe(&mut self, total: u64) {
        let now = Instant::now();
        if let Some(&(_, last)) = self.samples.back() {
            debug_assert!(total >= last);
        }
        self.samples.push_back((now, total));
        while let Some(&(time, _)) = self.samples.front() {
            if now.duration_since(time) > self.window && self.samples.len() > 2 {
                self.samples.pop_front();
            } else {
                break
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.samples.back().map(|&(_, total)| total).unwrap_or(0)
    }

    pub fn speed(&self) -> f64 {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if first.0 < last.0 => (first, last),
            _ => return 0.0
        };
        let elapsed = last.0.duration_since(first.0).as_secs_f64();
        (last.1 - first.1) as f64 / elapsed
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meter_reports_zero() {
        let meter = SpeedMeter::new(Duration::from_secs(10));
        assert_eq!(meter.total(), 0);
        assert_eq!(meter.speed(), 0.0);
    }

    #[test]
    fn total_tracks_latest_observation() {
        let mut meter = SpeedMeter::new(Duration::from_secs(10));
        meter.observe(5);
        meter.observe(12);
        assert_eq!(meter.total(), 12);
    }

    #[test]
    fn single_observation_has_no_speed() {
        let mut meter = SpeedMeter::new(Duration::from_secs(10));
        meter.observe(100);
        assert_eq!(meter.speed(), 0.0);
    }
}
