use std::collections::{BTreeMap, BTreeSet};

use fallwatch_hostsdk::{type_ids, EventMetadataItem};
use fallwatch_types::{Detection, FallTrackState};
use tracing::debug;
use uuid::Uuid;

/// Converts per-frame `fallDetected` flags into START/FINISH events per
/// track, with deduplication and a grace period for missing observations.
///
/// `BTreeMap<Uuid, _>` gives deterministic iteration for the same reason
/// the track registry uses one: the event sequence for identical
/// (detections, timestamps) input should stay reproducible, independent of
/// real-time pacing.
pub struct FallStateMachine {
    finish_grace_us: i64,
    active: BTreeMap<Uuid, FallTrackState>,
}

impl FallStateMachine {
    pub fn new(finish_grace_us: i64) -> Self {
        Self {
            finish_grace_us,
            active: BTreeMap::new(),
        }
    }

    /// Process one frame's resolved detections, returning any START/FINISH
    /// events produced. Events are returned in an unspecified but stable
    /// order (START events before FINISH events is not guaranteed across
    /// tracks, only within a single track's own episode).
    pub fn process_frame(&mut self, detections: &[Detection], now_us: i64) -> Vec<EventMetadataItem> {
        let seen: BTreeSet<Uuid> = detections.iter().map(|d| d.track_id).collect();
        let falling: BTreeSet<Uuid> = detections
            .iter()
            .filter(|d| d.fall_detected)
            .map(|d| d.track_id)
            .collect();

        let mut events = Vec::new();

        for &track_id in &falling {
            match self.active.get_mut(&track_id) {
                None => {
                    self.active.insert(track_id, FallTrackState { last_seen_us: now_us });
                    debug!(%track_id, now_us, "fall START");
                    events.push(start_event(track_id));
                }
                Some(state) => {
                    state.last_seen_us = now_us;
                }
            }
        }

        let mut to_finish = Vec::new();
        for (&track_id, state) in self.active.iter() {
            if falling.contains(&track_id) {
                continue;
            }
            let still_seen = seen.contains(&track_id);
            let grace_expired = now_us - state.last_seen_us >= self.finish_grace_us;
            if still_seen || grace_expired {
                to_finish.push(track_id);
            }
        }

        for track_id in to_finish {
            self.active.remove(&track_id);
            debug!(%track_id, now_us, "fall FINISH");
            events.push(finish_event(track_id));
        }

        events
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn active_count(&self) -> usize {
        self.active.len()
    }
}

fn start_event(track_id: Uuid) -> EventMetadataItem {
    EventMetadataItem {
        type_id: type_ids::FALL_EVENT_TYPE,
        caption: "Fall detected STARTED".to_string(),
        description: format!("track {track_id} started falling"),
        is_active: true,
    }
}

fn finish_event(track_id: Uuid) -> EventMetadataItem {
    EventMetadataItem {
        type_id: type_ids::FALL_EVENT_TYPE,
        caption: "Fall detected FINISHED".to_string(),
        description: format!("track {track_id} stopped falling"),
        is_active: false,
    }
}
