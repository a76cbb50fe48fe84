use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use fallwatch_detector::DetectorClient;
use fallwatch_hostsdk::{DiagnosticLevel, DiagnosticSink, HostPixelFormat, MetadataSink};
use fallwatch_queue::{FrameQueue, FrameSampler};
use fallwatch_types::FrameJob;

use crate::config::AgentConfig;
use crate::diagnostics::Throttle;
use crate::pixel;
use crate::worker::Worker;

/// Hosts the ingress callback, owns the worker thread, and exposes the
/// configuration surface and diagnostic logging. One instance per camera;
/// nothing here is shared across cameras.
pub struct DeviceAgent {
    camera_id: String,
    queue: Arc<FrameQueue>,
    sampler: Mutex<FrameSampler>,
    malformed_input_throttle: Mutex<Throttle>,
    backpressure_throttle: Mutex<Throttle>,
    diagnostic_sink: Arc<dyn DiagnosticSink>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DeviceAgent {
    pub fn new(
        camera_id: impl Into<String>,
        config: AgentConfig,
        metadata_sink: Arc<dyn MetadataSink>,
        diagnostic_sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let camera_id = camera_id.into();
        let queue = Arc::new(FrameQueue::new(config.max_queue_size));
        let log_throttle_ms = config.detector.log_throttle_ms;

        let detector = DetectorClient::new(config.detector.clone());
        let mut worker = Worker::new(
            camera_id.clone(),
            Box::new(detector),
            config.synthetic_track_ttl_us,
            config.track_map_ttl_us,
            config.fall_finish_grace_us,
            metadata_sink,
        );

        let worker_queue = queue.clone();
        let worker_handle = std::thread::Builder::new()
            .name(format!("fallwatch-worker-{camera_id}"))
            .spawn(move || {
                while let Some(job) = worker_queue.pop_blocking() {
                    worker.process_job(job, Instant::now());
                }
            })
            .expect("failed to spawn worker thread");

        Self {
            camera_id,
            queue,
            sampler: Mutex::new(FrameSampler::new(config.sample_fps)),
            malformed_input_throttle: Mutex::new(Throttle::new(log_throttle_ms)),
            backpressure_throttle: Mutex::new(Throttle::new(log_throttle_ms)),
            diagnostic_sink,
            worker_handle: Some(worker_handle),
        }
    }

    /// Sample, convert, and enqueue one host frame. Bounded in wall-clock
    /// time: no blocking I/O and no inference happen here. Unsupported
    /// pixel formats or malformed frames, and any oldest-frame drop caused
    /// by a full queue, are reported via a throttled diagnostic; the frame
    /// itself is dropped silently either way.
    pub fn push_frame(
        &self,
        timestamp_us: i64,
        width: u32,
        height: u32,
        format: HostPixelFormat,
        planes: &[&[u8]],
        line_sizes: &[usize],
    ) {
        if width == 0 || height == 0 {
            self.warn_throttled(&self.malformed_input_throttle, "zero-dimension frame dropped");
            return;
        }

        let accepted = self.sampler.lock().unwrap().accept(timestamp_us);
        if !accepted {
            return;
        }

        match pixel::to_bgr24(format, width, height, planes, line_sizes) {
            Some(pixels) => {
                let dropped = self.queue.push(FrameJob {
                    timestamp_us,
                    width,
                    height,
                    pixels,
                });
                if dropped {
                    self.warn_throttled(&self.backpressure_throttle, "queue full, dropped oldest frame");
                }
            }
            None => self.warn_throttled(&self.malformed_input_throttle, "unsupported pixel format or malformed frame dropped"),
        }
    }

    fn warn_throttled(&self, throttle: &Mutex<Throttle>, message: &str) {
        let should_log = throttle.lock().unwrap().allow(Instant::now());
        if should_log {
            self.diagnostic_sink.log(DiagnosticLevel::Warning, &self.camera_id, message);
        }
    }
}

impl Drop for DeviceAgent {
    fn drop(&mut self) {
        self.queue.stop();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fallwatch_hostsdk::test_util::{NullDiagnosticSink, RecordingDiagnosticSink, RecordingMetadataSink};
    use std::time::Duration;

    #[test]
    fn zero_dimension_frame_is_dropped_without_enqueue() {
        let sink = Arc::new(RecordingMetadataSink::new());
        let diag = Arc::new(NullDiagnosticSink);
        let config = AgentConfig::new("http://127.0.0.1:1").unwrap();
        let agent = DeviceAgent::new("cam0", config, sink, diag);
        agent.push_frame(1, 0, 0, HostPixelFormat::Bgr24, &[&[]], &[0]);
        assert_eq!(agent.queue.len(), 0);
    }

    #[test]
    fn dropped_frame_is_reported_through_the_diagnostic_sink() {
        let sink = Arc::new(RecordingMetadataSink::new());
        let diag = Arc::new(RecordingDiagnosticSink::default());
        let config = AgentConfig::new("http://127.0.0.1:1").unwrap();
        let agent = DeviceAgent::new("cam0", config, sink, diag.clone());

        // Exercises the same path `push_frame` takes when `FrameQueue::push`
        // reports a drop, without racing the live worker thread for queue
        // occupancy.
        agent.warn_throttled(&agent.backpressure_throttle, "queue full, dropped oldest frame");

        let entries = diag.entries.lock();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, DiagnosticLevel::Warning);
        assert_eq!(entries[0].1, "cam0");
    }

    #[test]
    fn drop_joins_worker_thread_cleanly() {
        let sink = Arc::new(RecordingMetadataSink::new());
        let diag = Arc::new(NullDiagnosticSink);
        let config = AgentConfig::new("http://127.0.0.1:1").unwrap();
        let agent = DeviceAgent::new("cam0", config, sink, diag);
        drop(agent);
        std::thread::sleep(Duration::from_millis(10));
    }
}
