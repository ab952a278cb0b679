use serde_derive::{Deserialize, Serialize};
use tracing::warn;

use crate::config::DetectionFilter;
use crate::detection::Detection;

/// Detections produced for one video frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position of the frame in its stream, strictly increasing.
    pub index: u64,
    pub timestamp: f64, // in seconds
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(index: u64, timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            index,
            timestamp,
            detections,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Keeps the well-formed detections of the wanted classes, best scores first, at most
    /// `max_detections` of them.
    pub fn select(&mut self, filter: &DetectionFilter) {
        let index = self.index;
        self.detections.retain(|det| {
            if let Err(err) = det.validate() {
                warn!(frame = index, ?det, "dropping detection: {}", err);
                return false;
            }

            filter.classes.is_empty() || filter.classes.contains(&det.class)
        });

        self.detections
            .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        self.detections.truncate(filter.max_detections);
    }
}
