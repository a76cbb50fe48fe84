use std::sync::Arc;
use std::time::Instant;

use fallwatch_detector::DetectorBackend;
use fallwatch_hostsdk::{type_ids, MetadataSink, ObjectAttributes, ObjectMetadataItem};
use fallwatch_tracking::{FallStateMachine, TrackRegistry};
use fallwatch_types::FrameJob;

/// Drives one frame through Detector → Track Registry → Fall State Machine
/// and emits the resulting packets. Owned exclusively by the worker
/// thread; holds no lock over its own state.
///
/// `detector` is boxed behind [`DetectorBackend`] rather than a concrete
/// `DetectorClient` so integration tests can substitute a scripted fake
/// that never touches the network.
pub struct Worker {
    camera_id: String,
    detector: Box<dyn DetectorBackend>,
    registry: TrackRegistry,
    fall_state: FallStateMachine,
    metadata_sink: Arc<dyn MetadataSink>,
}

impl Worker {
    pub fn new(
        camera_id: String,
        detector: Box<dyn DetectorBackend>,
        synthetic_track_ttl_us: i64,
        track_map_ttl_us: i64,
        fall_finish_grace_us: i64,
        metadata_sink: Arc<dyn MetadataSink>,
    ) -> Self {
        Self {
            camera_id,
            detector,
            registry: TrackRegistry::new(synthetic_track_ttl_us, track_map_ttl_us),
            fall_state: FallStateMachine::new(fall_finish_grace_us),
            metadata_sink,
        }
    }

    /// Run one job through the full pipeline. `now` gates the detector's
    /// circuit breaker and is ordinary wall-clock time; `job.timestamp_us`
    /// is what every emitted packet is stamped with.
    pub fn process_job(&mut self, job: FrameJob, now: Instant) {
        let mut detections = self.detector.infer(&self.camera_id, now, job.width, job.height, &job.pixels);
        self.registry.resolve(&mut detections, job.timestamp_us);

        if !detections.is_empty() {
            let items: Vec<ObjectMetadataItem> = detections
                .iter()
                .map(|d| ObjectMetadataItem {
                    bbox: d.bbox,
                    confidence: d.confidence,
                    type_id: if d.class_label == "person" {
                        type_ids::PERSON_OBJECT_TYPE
                    } else {
                        type_ids::GENERIC_OBJECT_TYPE
                    },
                    track_id: d.track_id,
                    attributes: ObjectAttributes {
                        class_label: d.class_label.clone(),
                        confidence: d.confidence,
                        fall_detected: d.fall_detected,
                    },
                })
                .collect();
            self.metadata_sink.emit_objects(&self.camera_id, job.timestamp_us, &items);
        }

        let events = self.fall_state.process_frame(&detections, job.timestamp_us);
        if !events.is_empty() {
            self.metadata_sink.emit_events(&self.camera_id, job.timestamp_us, &events);
        }

        self.registry.cleanup(job.timestamp_us);
    }

    /// Sweep expired track/fall state without processing a frame, so the
    /// steady-state-empty-maps invariant can be tested directly.
    pub fn run_cleanup(&mut self, now_us: i64) {
        self.registry.cleanup(now_us);
    }

    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        self.registry.is_empty() && self.fall_state.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fallwatch_detector::{DetectorClient, DetectorConfig};
    use fallwatch_hostsdk::test_util::RecordingMetadataSink;

    fn worker(sink: Arc<RecordingMetadataSink>) -> Worker {
        let detector = DetectorClient::new(DetectorConfig::new("http://127.0.0.1:1").unwrap());
        Worker::new("cam0".into(), Box::new(detector), 2_000_000, 60_000_000, 3_000_000, sink)
    }

    #[test]
    fn cleanup_is_idempotent_on_idle_worker() {
        let sink = Arc::new(RecordingMetadataSink::new());
        let mut w = worker(sink);
        w.run_cleanup(0);
        assert!(w.is_idle());
    }
}
