use std::io::Read;
use std::time::{Duration, Instant};

use base64::Engine;
use fallwatch_types::{Detection, Rect};
use image::RgbImage;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::circuit::CircuitBreaker;
use crate::config::DetectorConfig;
use crate::error::Error;

/// The worker's view of a detector: run inference on one frame, never
/// raising. Lets the worker's pipeline be exercised against a scripted fake
/// instead of a real network call.
pub trait DetectorBackend: Send {
    fn infer(&mut self, camera_id: &str, now: Instant, width: u32, height: u32, bgr: &[u8]) -> Vec<Detection>;
}

impl<T: Transport> DetectorBackend for DetectorClient<T> {
    fn infer(&mut self, camera_id: &str, now: Instant, width: u32, height: u32, bgr: &[u8]) -> Vec<Detection> {
        self.run(camera_id, now, width, height, bgr)
    }
}

/// The HTTP round trip itself, factored out so the circuit breaker and
/// response-parsing logic can be exercised against a scripted transport in
/// tests, without a real AI service listening anywhere.
pub trait Transport: Send {
    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<(u16, Vec<u8>), Error>;
}

/// The real transport, backed by a blocking `ureq` agent — the same crate
/// `utils/download-verify` uses for its own blocking HTTP round trip from a
/// plain OS thread.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    fn new(config: &DetectorConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_connect(Some(Duration::from_millis(config.connect_timeout_ms)))
            .timeout_send_request(Some(Duration::from_millis(config.write_timeout_ms)))
            .timeout_send_body(Some(Duration::from_millis(config.write_timeout_ms)))
            .timeout_recv_response(Some(Duration::from_millis(config.read_timeout_ms)))
            .timeout_recv_body(Some(Duration::from_millis(config.read_timeout_ms)))
            .build();
        Self {
            agent: agent_config.into(),
        }
    }
}

impl Transport for UreqTransport {
    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<(u16, Vec<u8>), Error> {
        let response = self
            .agent
            .post(url)
            .content_type("application/json")
            .send_json(body)
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let mut bytes = Vec::new();
        response
            .into_body()
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok((status, bytes))
    }
}

/// Encodes a frame, POSTs it to the AI service, parses detections, and
/// enforces timeouts and a circuit breaker. `run` never raises: on any
/// failure it returns an empty list and updates the internal breaker.
///
/// Not `Sync` by design — this type is owned exclusively by the worker
/// thread, which owns its circuit-breaker state; there is no locking here
/// because there is never a second caller.
pub struct DetectorClient<T: Transport = UreqTransport> {
    config: DetectorConfig,
    breaker: CircuitBreaker,
    transport: T,
    last_log_at: Option<Instant>,
}

impl DetectorClient<UreqTransport> {
    pub fn new(config: DetectorConfig) -> Self {
        let transport = UreqTransport::new(&config);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> DetectorClient<T> {
    pub fn with_transport(config: DetectorConfig, transport: T) -> Self {
        let breaker = CircuitBreaker::new(config.circuit_failure_threshold, config.circuit_open_ms);
        Self {
            config,
            breaker,
            transport,
            last_log_at: None,
        }
    }

    /// Run inference on one frame. `now` gates the circuit breaker and the
    /// failure-log throttle; it is ordinary wall-clock time, independent of
    /// the frame's own `timestamp_us`.
    pub fn run(&mut self, camera_id: &str, now: Instant, width: u32, height: u32, bgr: &[u8]) -> Vec<Detection> {
        if !self.breaker.gate(now) {
            return Vec::new();
        }

        match self.call(camera_id, width, height, bgr) {
            Ok(detections) => {
                self.breaker.record_success();
                detections
            }
            Err(e) => {
                let tripped = self.breaker.record_failure(now);
                self.log_failure(camera_id, now, &e, tripped);
                Vec::new()
            }
        }
    }

    fn log_failure(&mut self, camera_id: &str, now: Instant, err: &Error, tripped: bool) {
        let should_log = match self.last_log_at {
            None => true,
            Some(last) => now.duration_since(last) >= Duration::from_millis(self.config.log_throttle_ms),
        };
        if should_log {
            self.last_log_at = Some(now);
            warn!(
                camera_id,
                error = %err,
                circuit_open = self.breaker.is_open(),
                just_tripped = tripped,
                "detector call failed"
            );
        }
    }

    fn call(&self, camera_id: &str, width: u32, height: u32, bgr: &[u8]) -> Result<Vec<Detection>, Error> {
        let (jpeg, sent_width, sent_height) = encode_frame(width, height, bgr, self.config.send_width, self.config.jpeg_quality)?;
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&jpeg);

        let body = serde_json::json!({
            "camera_id": camera_id,
            "image": image_b64,
        });

        let (status, bytes) = self.transport.post_json(&self.config.base_url(), &body)?;
        if status != 200 {
            return Err(Error::HttpStatus(status));
        }

        let raw: Vec<RawDetection> =
            serde_json::from_slice(&bytes).map_err(|e| Error::InvalidJson(e.to_string()))?;

        Ok(raw
            .into_iter()
            .filter_map(|d| normalize(d, sent_width, sent_height))
            .collect())
    }

    #[cfg(test)]
    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.breaker.consecutive_failures()
    }
}

/// Downscale (if wider than `send_width`) and JPEG-encode a BGR24 frame.
/// Returns the encoded bytes and the width/height actually sent, since
/// detection coordinates from the service are in that image's pixel space.
fn encode_frame(
    width: u32,
    height: u32,
    bgr: &[u8],
    send_width: u32,
    jpeg_quality: u8,
) -> Result<(Vec<u8>, u32, u32), Error> {
    let expected_len = (width as usize) * (height as usize) * 3;
    if bgr.len() != expected_len {
        return Err(Error::Encode(format!(
            "expected {expected_len} bytes for {width}x{height} BGR24, got {}",
            bgr.len()
        )));
    }

    let mut rgb_buf = vec![0u8; bgr.len()];
    for (dst, src) in rgb_buf.chunks_exact_mut(3).zip(bgr.chunks_exact(3)) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
    }
    let rgb = RgbImage::from_raw(width, height, rgb_buf)
        .ok_or_else(|| Error::Encode("failed to build image buffer".into()))?;

    let (rgb, sent_width, sent_height) = if width > send_width {
        let new_height = ((height as u64 * send_width as u64) / width as u64).max(1) as u32;
        let resized = image::imageops::resize(&rgb, send_width, new_height, image::imageops::FilterType::Triangle);
        (resized, send_width, new_height)
    } else {
        (rgb, width, height)
    };

    let mut out = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, jpeg_quality);
    encoder
        .encode(rgb.as_raw(), sent_width, sent_height, image::ColorType::Rgb8.into())
        .map_err(|e| Error::Encode(e.to_string()))?;

    Ok((out, sent_width, sent_height))
}

/// The AI service's per-detection wire schema. All keys are optional;
/// missing numerics default to 0, missing booleans to false, missing
/// strings to "person".
#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    w: f64,
    #[serde(default)]
    h: f64,
    #[serde(default, alias = "class")]
    cls: Option<String>,
    #[serde(default, alias = "confidence")]
    score: Option<f32>,
    #[serde(default)]
    fall_detected: bool,
    #[serde(default)]
    track_id: Option<serde_json::Value>,
}

fn parse_track_id(value: &Option<serde_json::Value>) -> Option<i64> {
    match value {
        None => None,
        Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                n.as_f64().map(|f| f.round() as i64)
            }
        }
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    }
}

/// Convert one raw response element into a normalized [`Detection`],
/// dropping it if the pixel box has no positive area or the normalized,
/// clamped rect collapses to zero.
fn normalize(raw: RawDetection, image_width: u32, image_height: u32) -> Option<Detection> {
    if raw.w <= 0.0 || raw.h <= 0.0 {
        return None;
    }
    let iw = image_width as f64;
    let ih = image_height as f64;
    if iw <= 0.0 || ih <= 0.0 {
        return None;
    }

    let rect = Rect::new(
        (raw.x / iw) as f32,
        (raw.y / ih) as f32,
        (raw.w / iw) as f32,
        (raw.h / ih) as f32,
    )
    .clamp()?;

    let ai_track_id = parse_track_id(&raw.track_id);
    debug!(?ai_track_id, "normalized detection");

    Some(Detection {
        bbox: rect,
        class_label: raw.cls.unwrap_or_else(|| "person".to_string()),
        confidence: raw.score.unwrap_or(0.0).clamp(0.0, 1.0),
        fall_detected: raw.fall_detected,
        ai_track_id,
        // Assigned later by the track registry; a nil placeholder here is
        // never observed outside this module.
        track_id: uuid::Uuid::nil(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn drops_non_positive_pixel_boxes() {
        let raw = RawDetection {
            x: 0.0,
            y: 0.0,
            w: 0.0,
            h: 10.0,
            cls: None,
            score: None,
            fall_detected: false,
            track_id: None,
        };
        assert!(normalize(raw, 640, 480).is_none());
    }

    #[test]
    fn normalizes_pixel_coords_to_unit_square() {
        let raw = RawDetection {
            x: 100.0,
            y: 100.0,
            w: 50.0,
            h: 200.0,
            cls: Some("person".into()),
            score: Some(0.9),
            fall_detected: false,
            track_id: Some(serde_json::json!(7)),
        };
        let d = normalize(raw, 640, 480).unwrap();
        assert_relative_eq!(d.bbox.x, 0.15625, epsilon = 1e-4);
        assert_relative_eq!(d.bbox.y, 0.2083, epsilon = 1e-4);
        assert_relative_eq!(d.bbox.width, 0.0781, epsilon = 1e-4);
        assert_relative_eq!(d.bbox.height, 0.4167, epsilon = 1e-4);
        assert_eq!(d.ai_track_id, Some(7));
    }

    #[test]
    fn track_id_accepts_string_and_float() {
        assert_eq!(parse_track_id(&Some(serde_json::json!("42"))), Some(42));
        assert_eq!(parse_track_id(&Some(serde_json::json!(3.6))), Some(4));
        assert_eq!(parse_track_id(&Some(serde_json::json!("not a number"))), None);
        assert_eq!(parse_track_id(&None), None);
    }

    #[test]
    fn missing_fields_get_documented_defaults() {
        let raw: RawDetection = serde_json::from_str(r#"{"x":0,"y":0,"w":10,"h":10}"#).unwrap();
        let d = normalize(raw, 100, 100).unwrap();
        assert_eq!(d.class_label, "person");
        assert_eq!(d.confidence, 0.0);
        assert!(!d.fall_detected);
        assert_eq!(d.ai_track_id, None);
    }

    #[test]
    fn encode_frame_rejects_mismatched_buffer_len() {
        let err = encode_frame(4, 4, &[0u8; 10], 640, 80).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }

    #[test]
    fn encode_frame_downscales_wide_frames() {
        let bgr = vec![128u8; 320 * 240 * 3];
        let (_jpeg, w, h) = encode_frame(320, 240, &bgr, 160, 80).unwrap();
        assert_eq!(w, 160);
        assert_eq!(h, 120);
    }

    /// Always returns HTTP 503 with an empty body, counting calls so tests
    /// can assert the circuit breaker actually skips the network once open.
    struct AlwaysFailsTransport {
        calls: AtomicU32,
    }

    impl Transport for AlwaysFailsTransport {
        fn post_json(&self, _url: &str, _body: &serde_json::Value) -> Result<(u16, Vec<u8>), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((503, Vec::new()))
        }
    }

    fn bgr_frame() -> (u32, u32, Vec<u8>) {
        (4, 4, vec![0u8; 4 * 4 * 3])
    }

    #[test]
    fn breaker_trips_on_threshold_and_suppresses_the_network_call() {
        let mut config = DetectorConfig::new("http://ai-service").unwrap();
        config.circuit_failure_threshold = 3;
        config.circuit_open_ms = 3_000;
        let transport = AlwaysFailsTransport { calls: AtomicU32::new(0) };
        let mut client = DetectorClient::with_transport(config, transport);

        let t0 = Instant::now();
        let (w, h, bgr) = bgr_frame();
        for _ in 0..3 {
            assert!(client.run("cam0", t0, w, h, &bgr).is_empty());
        }
        assert_eq!(client.consecutive_failures(), 3);

        // Fourth call within the open window: no network request at all.
        assert!(client.run("cam0", t0 + Duration::from_millis(10), w, h, &bgr).is_empty());
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn breaker_reattempts_the_service_after_open_duration_elapses() {
        let mut config = DetectorConfig::new("http://ai-service").unwrap();
        config.circuit_failure_threshold = 3;
        config.circuit_open_ms = 3_000;
        let transport = AlwaysFailsTransport { calls: AtomicU32::new(0) };
        let mut client = DetectorClient::with_transport(config, transport);

        let t0 = Instant::now();
        let (w, h, bgr) = bgr_frame();
        for _ in 0..3 {
            client.run("cam0", t0, w, h, &bgr);
        }
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 3);

        // Still open just before the window elapses.
        client.run("cam0", t0 + Duration::from_millis(2_999), w, h, &bgr);
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 3);

        // Window elapsed: the breaker closes and the service is retried.
        client.run("cam0", t0 + Duration::from_millis(3_000), w, h, &bgr);
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 4);
    }
}
