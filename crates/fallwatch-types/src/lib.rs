// Copyright (c) The fallwatch Authors.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Shared, dependency-light data model for the fallwatch per-camera
//! analytics core.
//!
//! These types cross the boundary between every other `fallwatch-*` crate:
//! the detector client produces [`Detection`]s, the tracking crate resolves
//! their [`uuid::Uuid`] identity and fall state, and the agent crate moves
//! [`FrameJob`]s from ingress to the worker thread. Nothing here does I/O or
//! holds a lock; it is plain data.

use serde::{Deserialize, Serialize};

/// The internal integer identifier for a track.
///
/// Positive when supplied by the AI service, negative when synthesized
/// locally by IoU association. See the crate-level synthetic track
/// allocator in `fallwatch-tracking`.
pub type TrackKey = i64;

/// An axis-aligned rectangle in normalized `[0, 1]` image coordinates.
///
/// Invariants (enforced by [`Rect::clamp`], not by the plain constructor):
/// `x + width <= 1`, `y + height <= 1`, `width > 0`, `height > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Build a rect without enforcing any invariant. Used internally while
    /// still in pixel space, before [`Rect::clamp`] is applied.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clamp this rect to the unit square, trimming any `x + width` or
    /// `y + height` overflow by reducing the dimension rather than moving
    /// the origin. Returns `None` if the clamped width or height reaches
    /// zero (or was already non-positive).
    pub fn clamp(mut self) -> Option<Self> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return None;
        }
        self.x = self.x.clamp(0.0, 1.0);
        self.y = self.y.clamp(0.0, 1.0);
        if self.x + self.width > 1.0 {
            self.width = 1.0 - self.x;
        }
        if self.y + self.height > 1.0 {
            self.height = 1.0 - self.y;
        }
        if self.width <= 0.0 || self.height <= 0.0 || !self.is_finite() {
            return None;
        }
        Some(self)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Intersection-over-union against another rect. Returns `0.0` if
    /// either rect has zero area. A small epsilon guards the denominator.
    pub fn iou(&self, other: &Rect) -> f32 {
        let ax0 = self.x;
        let ay0 = self.y;
        let ax1 = self.x + self.width;
        let ay1 = self.y + self.height;

        let bx0 = other.x;
        let by0 = other.y;
        let bx1 = other.x + other.width;
        let by1 = other.y + other.height;

        let ix0 = ax0.max(bx0);
        let iy0 = ay0.max(by0);
        let ix1 = ax1.min(bx1);
        let iy1 = ay1.min(by1);

        let iw = (ix1 - ix0).max(0.0);
        let ih = (iy1 - iy0).max(0.0);
        let intersection = iw * ih;

        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / (union + 1e-6)
    }
}

/// One bounding box with class, confidence, and fall flag, after
/// normalization and track resolution.
///
/// `ai_track_id` is the raw, optional identifier the AI service supplied
/// (absent means "synthesize one"); `track_id` is always present and is
/// assigned by the track registry before the detection is emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: Rect,
    pub class_label: String,
    pub confidence: f32,
    pub fall_detected: bool,
    pub ai_track_id: Option<i64>,
    pub track_id: uuid::Uuid,
}

/// One frame handed from ingress to the worker. Move-only in spirit: there
/// is exactly one owner at a time (ingress constructs it, the queue holds
/// it, the worker consumes it once).
#[derive(Debug, Clone)]
pub struct FrameJob {
    /// Host-supplied monotonic microseconds.
    pub timestamp_us: i64,
    pub width: u32,
    pub height: u32,
    /// Packed BGR24 pixel data, `height * width * 3` bytes, row-major.
    pub pixels: Vec<u8>,
}

/// A track whose identity was inferred locally by IoU matching across
/// frames, keyed by a negative [`TrackKey`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticTrack {
    pub bbox: Rect,
    pub last_seen_us: i64,
}

/// Bookkeeping for one track UUID currently in the "falling" state: a
/// START event has been emitted and no FINISH has fired yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallTrackState {
    pub last_seen_us: i64,
}
