use fallwatch_detector::{DetectorConfig, Error as DetectorError};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// The full per-camera configuration surface: the Detector Client's config
/// plus the sampler/queue/tracking parameters that live above it. One
/// `AgentConfig` per camera instance.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub detector: DetectorConfig,
    pub sample_fps: f64,
    pub max_queue_size: usize,
    pub fall_finish_grace_us: i64,
    pub synthetic_track_ttl_us: i64,
    pub track_map_ttl_us: i64,
}

impl AgentConfig {
    pub fn new(service_url: &str) -> Result<Self, DetectorError> {
        Ok(Self {
            detector: DetectorConfig::new(service_url)?,
            sample_fps: 5.0,
            max_queue_size: 4,
            fall_finish_grace_us: 3_000_000,
            synthetic_track_ttl_us: 2_000_000,
            track_map_ttl_us: 60_000_000,
        })
    }

    /// Load from environment variables. `SERVICE_URL` is required (via
    /// [`DetectorConfig::from_env`]); every other field falls back to its
    /// documented default when unset or unparseable.
    pub fn from_env() -> Result<Self, DetectorError> {
        let detector = DetectorConfig::from_env()?;
        let mut cfg = Self {
            detector,
            sample_fps: 5.0,
            max_queue_size: 4,
            fall_finish_grace_us: 3_000_000,
            synthetic_track_ttl_us: 2_000_000,
            track_map_ttl_us: 60_000_000,
        };
        cfg.sample_fps = env_or("SAMPLE_FPS", cfg.sample_fps);
        cfg.max_queue_size = env_or("MAX_QUEUE_SIZE", cfg.max_queue_size);
        cfg.fall_finish_grace_us = env_or("FALL_FINISH_GRACE_US", cfg.fall_finish_grace_us);
        cfg.synthetic_track_ttl_us = env_or("SYNTHETIC_TRACK_TTL_US", cfg.synthetic_track_ttl_us);
        cfg.track_map_ttl_us = env_or("TRACK_MAP_TTL_US", cfg.track_map_ttl_us);
        Ok(cfg.clamped())
    }

    fn clamped(mut self) -> Self {
        self.sample_fps = self.sample_fps.clamp(0.1, 60.0);
        self.max_queue_size = self.max_queue_size.clamp(1, 120);
        self.fall_finish_grace_us = self.fall_finish_grace_us.clamp(0, 120_000_000);
        self
    }
}
