// Copyright (c) The fallwatch Authors.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Abstract host VMS ports.
//!
//! The host SDK itself (frame ingress, metadata egress, the concrete UUID
//! and bounding-box wire types, diagnostic logging) is out of scope for this
//! crate — it is an external contract we consume, not reimplement. What
//! lives here is the narrow, synchronous trait boundary the rest of the
//! fallwatch core is written against: a fixed trait that concrete host
//! backends implement, rather than baking one backend into the processing
//! code.

use fallwatch_types::Rect;

/// Stable, opaque type identifiers published to the host's metadata sink.
/// Concrete string values are this crate's choice; callers must not rely on
/// them changing within a deployment.
pub mod type_ids {
    pub const PERSON_OBJECT_TYPE: &str = "fallwatch.object.person";
    pub const GENERIC_OBJECT_TYPE: &str = "fallwatch.object.generic";
    pub const FALL_EVENT_TYPE: &str = "fallwatch.event.fall";
}

/// The three attributes the worker attaches to every object-metadata item.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectAttributes {
    pub class_label: String,
    pub confidence: f32,
    pub fall_detected: bool,
}

/// One item in an object-metadata packet: a detected, clamped bounding box
/// with a stable identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetadataItem {
    pub bbox: Rect,
    pub confidence: f32,
    pub type_id: &'static str,
    pub track_id: uuid::Uuid,
    pub attributes: ObjectAttributes,
}

/// One item in an event-metadata packet: a START or FINISH fall event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetadataItem {
    pub type_id: &'static str,
    pub caption: String,
    pub description: String,
    /// `true` for START (the episode is active), `false` for FINISH.
    pub is_active: bool,
}

/// Severity levels accepted by the host's diagnostic-event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// The host's metadata sink: accepts object-metadata and event-metadata
/// packets timestamped in microseconds. Implementations must not block for
/// longer than the host's own bounded-time contract — this core never waits
/// on a call to this trait.
pub trait MetadataSink: Send + Sync {
    fn emit_objects(&self, camera_id: &str, timestamp_us: i64, items: &[ObjectMetadataItem]);
    fn emit_events(&self, camera_id: &str, timestamp_us: i64, items: &[EventMetadataItem]);
}

/// The host's diagnostic-event sink.
pub trait DiagnosticSink: Send + Sync {
    fn log(&self, level: DiagnosticLevel, camera_id: &str, message: &str);
}

/// The host pixel formats the frame converter accepts (see the Device
/// Agent's pixel-format conversion contract). Fixed and small enough that a
/// runtime `match`, not a type parameter, is the idiomatic shape, since the
/// pixel format of incoming data isn't known until runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPixelFormat {
    /// Packed B, G, R, 3 bytes per pixel.
    Bgr24,
    /// Packed B, G, R, A, 4 bytes per pixel.
    Bgra32,
    /// Packed R, G, B, A, 4 bytes per pixel.
    Rgba32,
    /// Packed R, G, B, 3 bytes per pixel.
    Rgb24,
    /// YUV 4:2:0 planar with V and U planes swapped relative to I420
    /// (i.e. Y plane, then V plane, then U plane).
    Yv12,
}

/// Test doubles for [`MetadataSink`] and [`DiagnosticSink`], kept next to
/// the trait definitions rather than in a separate mock crate.
#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;
    use parking_lot::Mutex;

    /// Collects every emitted packet so tests can assert on ordering and
    /// content.
    #[derive(Default)]
    pub struct RecordingMetadataSink {
        pub objects: Mutex<Vec<(String, i64, Vec<ObjectMetadataItem>)>>,
        pub events: Mutex<Vec<(String, i64, Vec<EventMetadataItem>)>>,
    }

    impl RecordingMetadataSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn all_events(&self) -> Vec<EventMetadataItem> {
            self.events
                .lock()
                .iter()
                .flat_map(|(_, _, items)| items.clone())
                .collect()
        }
    }

    impl MetadataSink for RecordingMetadataSink {
        fn emit_objects(&self, camera_id: &str, timestamp_us: i64, items: &[ObjectMetadataItem]) {
            self.objects
                .lock()
                .push((camera_id.to_string(), timestamp_us, items.to_vec()));
        }

        fn emit_events(&self, camera_id: &str, timestamp_us: i64, items: &[EventMetadataItem]) {
            self.events
                .lock()
                .push((camera_id.to_string(), timestamp_us, items.to_vec()));
        }
    }

    /// A diagnostic sink that discards everything. Useful for tests that
    /// don't care about throttled warnings.
    #[derive(Default)]
    pub struct NullDiagnosticSink;

    impl DiagnosticSink for NullDiagnosticSink {
        fn log(&self, _level: DiagnosticLevel, _camera_id: &str, _message: &str) {}
    }

    /// A diagnostic sink that records every call, for assertions on
    /// throttling behavior.
    #[derive(Default)]
    pub struct RecordingDiagnosticSink {
        pub entries: Mutex<Vec<(DiagnosticLevel, String, String)>>,
    }

    impl DiagnosticSink for RecordingDiagnosticSink {
        fn log(&self, level: DiagnosticLevel, camera_id: &str, message: &str) {
            self.entries
                .lock()
                .push((level, camera_id.to_string(), message.to_string()));
        }
    }
}
