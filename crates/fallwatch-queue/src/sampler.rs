/// Time-based gate admitting at most one frame per `1 / sampleFps` window.
/// Owned by the ingress side; no locking, since `push_frame` runs on the
/// host's serialized ingress thread for a given camera.
pub struct FrameSampler {
    sample_fps: f64,
    last_accepted_us: Option<i64>,
}

impl FrameSampler {
    pub fn new(sample_fps: f64) -> Self {
        Self {
            sample_fps,
            last_accepted_us: None,
        }
    }

    /// Decide whether to admit a frame with this host timestamp, updating
    /// internal state on acceptance.
    pub fn accept(&mut self, timestamp_us: i64) -> bool {
        let accepted = if self.sample_fps <= 0.0 {
            true
        } else if timestamp_us <= 0 {
            true
        } else {
            match self.last_accepted_us {
                None => true,
                Some(last) => {
                    let min_interval_us = (1_000_000.0 / self.sample_fps) as i64;
                    timestamp_us - last >= min_interval_us
                }
            }
        };

        if accepted {
            self.last_accepted_us = Some(timestamp_us);
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_or_negative_fps_passes_everything() {
        let mut s = FrameSampler::new(0.0);
        assert!(s.accept(1));
        assert!(s.accept(2));
        let mut s = FrameSampler::new(-5.0);
        assert!(s.accept(1));
        assert!(s.accept(2));
    }

    #[test]
    fn non_positive_timestamp_always_passes() {
        let mut s = FrameSampler::new(5.0);
        assert!(s.accept(0));
        assert!(s.accept(-100));
    }

    #[test]
    fn five_fps_admits_every_200ms() {
        let mut s = FrameSampler::new(5.0);
        assert!(s.accept(0));
        assert!(!s.accept(100_000));
        assert!(s.accept(200_000));
        assert!(!s.accept(250_000));
        assert!(s.accept(400_000));
    }

    #[test]
    fn rate_matches_target_within_one_per_second() {
        let mut s = FrameSampler::new(5.0);
        let mut accepted = 0;
        // 30 fps input stream over one second.
        for i in 0..30 {
            let ts = i * (1_000_000 / 30);
            if s.accept(ts) {
                accepted += 1;
            }
        }
        assert!((accepted as i64 - 5).abs() <= 1, "accepted={accepted}");
    }
}
