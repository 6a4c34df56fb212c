// FOVEA Stream State
// Copyright (c) 2026 The FOVEA Project
//
// Read-mostly counters shared between the pipeline loops and the dashboard
// status endpoint. Nothing here participates in producer/consumer
// coordination; that goes through the filesystem.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::config::LayerId;

pub struct StreamState {
    started_at: Instant,
    published_low: AtomicU64,
    published_med: AtomicU64,
    published_high: AtomicU64,
    combined: AtomicU64,
    gaze: Mutex<(u32, u32)>,
}

#[derive(Serialize)]
pub struct GazeStatus {
    pub x: u32,
    pub y: u32,
}

#[derive(Serialize)]
pub struct PublishedStatus {
    pub low: u64,
    pub med: u64,
    pub high: u64,
}

#[derive(Serialize)]
pub struct StreamStatus {
    pub uptime_secs: u64,
    pub gaze: GazeStatus,
    pub published: PublishedStatus,
    pub combined: u64,
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            published_low: AtomicU64::new(0),
            published_med: AtomicU64::new(0),
            published_high: AtomicU64::new(0),
            combined: AtomicU64::new(0),
            gaze: Mutex::new((0, 0)),
        }
    }

    pub fn record_published(&self, layer: LayerId) {
        let counter = match layer {
            LayerId::Low => &self.published_low,
            LayerId::Med => &self.published_med,
            LayerId::High => &self.published_high,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_combined(&self, total: u64) {
        self.combined.store(total, Ordering::Relaxed);
    }

    pub fn set_gaze(&self, point: (u32, u32)) {
        *self.gaze.lock().unwrap() = point;
    }

    pub fn snapshot(&self) -> StreamStatus {
        let (x, y) = *self.gaze.lock().unwrap();
        StreamStatus {
            uptime_secs: self.started_at.elapsed().as_secs(),
            gaze: GazeStatus { x, y },
            published: PublishedStatus {
                low: self.published_low.load(Ordering::Relaxed),
                med: self.published_med.load(Ordering::Relaxed),
                high: self.published_high.load(Ordering::Relaxed),
            },
            combined: self.combined.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_activity() {
        let state = StreamState::new();
        state.record_published(LayerId::Low);
        state.record_published(LayerId::Low);
        state.record_published(LayerId::High);
        state.set_combined(2);
        state.set_gaze((960, 540));

        let status = state.snapshot();
        assert_eq!(status.published.low, 2);
        assert_eq!(status.published.med, 0);
        assert_eq!(status.published.high, 1);
        assert_eq!(status.combined, 2);
        assert_eq!((status.gaze.x, status.gaze.y), (960, 540));
    }

    #[test]
    fn status_serializes_for_the_dashboard() {
        let state = StreamState::new();
        state.set_gaze((12, 34));
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["gaze"]["x"], 12);
        assert_eq!(json["published"]["low"], 0);
    }
}
