use std::collections::BTreeMap;

use fallwatch_types::{Detection, SyntheticTrack, TrackKey};
use tracing::trace;
use uuid::Uuid;

/// Minimum IoU for a detection to be matched against an existing synthetic
/// track.
const IOU_MATCH_THRESHOLD: f32 = 0.3;

/// Turns the service's per-frame detections into a temporally consistent
/// identity per object. Owned exclusively by the worker thread; no
/// internal locking.
///
/// `BTreeMap` (ordered by key), not `HashMap`, backs every table here: IoU
/// tie-breaks only need some deterministic order, and an ordered map gives
/// that for free without a separate insertion-order tracker.
pub struct TrackRegistry {
    synthetic_track_ttl_us: i64,
    track_map_ttl_us: i64,
    next_synthetic_id: TrackKey,
    synthetic_tracks: BTreeMap<TrackKey, SyntheticTrack>,
    track_uuid_by_key: BTreeMap<TrackKey, Uuid>,
    track_last_seen_us: BTreeMap<TrackKey, i64>,
}

impl TrackRegistry {
    pub fn new(synthetic_track_ttl_us: i64, track_map_ttl_us: i64) -> Self {
        Self {
            synthetic_track_ttl_us,
            track_map_ttl_us,
            next_synthetic_id: -1,
            synthetic_tracks: BTreeMap::new(),
            track_uuid_by_key: BTreeMap::new(),
            track_last_seen_us: BTreeMap::new(),
        }
    }

    /// Assign a stable [`Uuid`] to every detection in place, mutating each
    /// detection's `track_id`. Must be called once per frame, before the
    /// fall state machine sees the detections.
    pub fn resolve(&mut self, detections: &mut [Detection], now_us: i64) {
        for detection in detections.iter_mut() {
            let key = match detection.ai_track_id {
                Some(ai_id) => ai_id,
                None => self.match_or_allocate_synthetic(detection, now_us),
            };

            if key < 0 {
                self.synthetic_tracks.insert(
                    key,
                    SyntheticTrack {
                        bbox: detection.bbox,
                        last_seen_us: now_us,
                    },
                );
            }

            let uuid = *self
                .track_uuid_by_key
                .entry(key)
                .or_insert_with(Uuid::new_v4);
            self.track_last_seen_us.insert(key, now_us);

            detection.track_id = uuid;
        }
    }

    fn match_or_allocate_synthetic(&mut self, detection: &Detection, now_us: i64) -> TrackKey {
        let mut best: Option<(TrackKey, f32)> = None;
        for (&key, track) in self.synthetic_tracks.iter() {
            if now_us - track.last_seen_us > self.synthetic_track_ttl_us {
                continue;
            }
            let iou = detection.bbox.iou(&track.bbox);
            if iou > IOU_MATCH_THRESHOLD {
                match best {
                    Some((_, best_iou)) if iou <= best_iou => {}
                    _ => best = Some((key, iou)),
                }
            }
        }

        if let Some((key, iou)) = best {
            trace!(key, iou, "matched synthetic track by IoU");
            key
        } else {
            let key = self.next_synthetic_id;
            self.next_synthetic_id -= 1;
            trace!(key, "allocated new synthetic track");
            key
        }
    }

    /// Drop synthetic tracks and track/UUID mappings that have aged out.
    /// Idempotent and safe to call even with no live frames, so the
    /// "steady state -> empty maps" invariant can be exercised directly.
    pub fn cleanup(&mut self, now_us: i64) {
        self.synthetic_tracks
            .retain(|_, track| now_us - track.last_seen_us <= self.synthetic_track_ttl_us);
        self.track_last_seen_us
            .retain(|_, &mut last_seen| now_us - last_seen <= self.track_map_ttl_us);
        self.track_uuid_by_key
            .retain(|key, _| self.track_last_seen_us.contains_key(key));
    }

    pub fn is_empty(&self) -> bool {
        self.synthetic_tracks.is_empty()
            && self.track_uuid_by_key.is_empty()
            && self.track_last_seen_us.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn synthetic_track_count(&self) -> usize {
        self.synthetic_tracks.len()
    }
}
