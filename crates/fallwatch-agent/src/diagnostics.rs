use std::time::{Duration, Instant};

/// At-most-one-log-line-per-interval gate, shared by every part of the
/// agent that needs to warn without flooding the host's diagnostic sink:
/// malformed-input drops and queue backpressure.
pub struct Throttle {
    interval: Duration,
    last_fired_at: Option<Instant>,
}

impl Throttle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            last_fired_at: None,
        }
    }

    /// Returns true at most once per `interval`, updating internal state
    /// only when it returns true.
    pub fn allow(&mut self, now: Instant) -> bool {
        let allowed = match self.last_fired_at {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if allowed {
            self.last_fired_at = Some(now);
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_immediately_then_suppresses_until_interval_elapses() {
        let mut t = Throttle::new(1_000);
        let t0 = Instant::now();
        assert!(t.allow(t0));
        assert!(!t.allow(t0 + Duration::from_millis(500)));
        assert!(t.allow(t0 + Duration::from_millis(1_000)));
    }
}
