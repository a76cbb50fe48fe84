use crate::error::{Error, Result};

fn clamp_u64(v: u64, min: u64, max: u64) -> u64 {
    v.clamp(min, max)
}

fn clamp_u32(v: u32, min: u32, max: u32) -> u32 {
    v.clamp(min, max)
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Configuration for the [`crate::DetectorClient`]. Every numeric field is
/// clamped to its documented range rather than rejected; only the service
/// URL's scheme is a hard construction-time error.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub host: String,
    pub port: u16,
    /// Normalized to end in `/infer`.
    pub infer_path: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub send_width: u32,
    pub jpeg_quality: u8,
    pub circuit_failure_threshold: u32,
    pub circuit_open_ms: u64,
    pub log_throttle_ms: u64,
}

impl DetectorConfig {
    /// Parse `service_url` (which must use the `http://` scheme) and apply
    /// the documented defaults for every other field.
    pub fn new(service_url: &str) -> Result<Self> {
        let (host, port, path) = parse_service_url(service_url)?;
        Ok(Self {
            host,
            port,
            infer_path: normalize_infer_path(&path),
            connect_timeout_ms: 250,
            read_timeout_ms: 400,
            write_timeout_ms: 250,
            send_width: 640,
            jpeg_quality: 80,
            circuit_failure_threshold: 3,
            circuit_open_ms: 3000,
            log_throttle_ms: 5000,
        })
    }

    /// Load from environment variables, falling back to [`DetectorConfig::new`]'s
    /// defaults for anything unset or unparseable. `SERVICE_URL` is required.
    pub fn from_env() -> Result<Self> {
        let service_url =
            std::env::var("SERVICE_URL").map_err(|_| Error::MissingHost("SERVICE_URL".into()))?;
        let mut cfg = Self::new(&service_url)?;
        cfg.connect_timeout_ms = env_or("CONNECT_TIMEOUT_MS", cfg.connect_timeout_ms);
        cfg.read_timeout_ms = env_or("READ_TIMEOUT_MS", cfg.read_timeout_ms);
        cfg.write_timeout_ms = env_or("WRITE_TIMEOUT_MS", cfg.write_timeout_ms);
        cfg.send_width = env_or("SEND_WIDTH", cfg.send_width);
        cfg.jpeg_quality = env_or("JPEG_QUALITY", cfg.jpeg_quality);
        cfg.circuit_failure_threshold =
            env_or("CIRCUIT_FAILURE_THRESHOLD", cfg.circuit_failure_threshold);
        cfg.circuit_open_ms = env_or("CIRCUIT_OPEN_MS", cfg.circuit_open_ms);
        cfg.log_throttle_ms = env_or("LOG_THROTTLE_MS", cfg.log_throttle_ms);
        Ok(cfg.clamped())
    }

    fn clamped(mut self) -> Self {
        self.connect_timeout_ms = clamp_u64(self.connect_timeout_ms, 50, 5000);
        self.read_timeout_ms = clamp_u64(self.read_timeout_ms, 50, 5000);
        self.write_timeout_ms = clamp_u64(self.write_timeout_ms, 50, 5000);
        self.send_width = clamp_u32(self.send_width, 160, 3840);
        self.jpeg_quality = self.jpeg_quality.clamp(40, 95);
        self.circuit_failure_threshold = self.circuit_failure_threshold.max(1);
        self
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.infer_path)
    }
}

fn normalize_infer_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.ends_with("/infer") {
        trimmed.to_string()
    } else if trimmed.is_empty() {
        "/infer".to_string()
    } else {
        format!("{trimmed}/infer")
    }
}

/// Parse `scheme://host[:port][/path]` without pulling in a general-purpose
/// URL crate: the accepted shape is narrow enough (http only, optional
/// port, optional path) that hand-rolling it is simpler than a dependency.
fn parse_service_url(service_url: &str) -> Result<(String, u16, String)> {
    let rest = service_url
        .strip_prefix("http://")
        .ok_or_else(|| Error::InvalidServiceUrl(service_url.to_string()))?;

    if rest.starts_with("https://") || service_url.starts_with("https://") {
        return Err(Error::InvalidServiceUrl(service_url.to_string()));
    }

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    if authority.is_empty() {
        return Err(Error::MissingHost(service_url.to_string()));
    }

    let (host, port) = match authority.rfind(':') {
        Some(idx) => {
            let host = &authority[..idx];
            let port_str = &authority[idx + 1..];
            let port: u16 = port_str
                .parse()
                .map_err(|_| Error::InvalidServiceUrl(service_url.to_string()))?;
            (host.to_string(), port)
        }
        None => (authority.to_string(), 80),
    };

    Ok((host, port, path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_is_rejected() {
        assert!(matches!(
            DetectorConfig::new("https://example.com"),
            Err(Error::InvalidServiceUrl(_))
        ));
    }

    #[test]
    fn default_port_is_80() {
        let cfg = DetectorConfig::new("http://ai-service").unwrap();
        assert_eq!(cfg.port, 80);
        assert_eq!(cfg.infer_path, "/infer");
    }

    #[test]
    fn explicit_port_and_path_are_kept() {
        let cfg = DetectorConfig::new("http://ai-service:9000/v2").unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.infer_path, "/v2/infer");
    }

    #[test]
    fn infer_suffix_is_not_duplicated() {
        let cfg = DetectorConfig::new("http://ai-service/model/infer").unwrap();
        assert_eq!(cfg.infer_path, "/model/infer");
    }

    #[test]
    fn base_url_is_well_formed() {
        let cfg = DetectorConfig::new("http://ai-service:9000/v2").unwrap();
        assert_eq!(cfg.base_url(), "http://ai-service:9000/v2/infer");
    }

    #[test]
    fn numeric_fields_are_clamped() {
        let mut cfg = DetectorConfig::new("http://ai-service").unwrap();
        cfg.connect_timeout_ms = 1;
        cfg.send_width = 10;
        cfg.jpeg_quality = 200;
        let cfg = cfg.clamped();
        assert_eq!(cfg.connect_timeout_ms, 50);
        assert_eq!(cfg.send_width, 160);
        assert_eq!(cfg.jpeg_quality, 95);
    }
}
