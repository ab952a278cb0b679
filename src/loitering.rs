use std::collections::HashMap;

use crate::config::LoiteringConfig;
use crate::track::Track;

/// Flags tracks that stay in view longer than a configured time.
pub struct LoiteringDetector {
    enabled: bool,
    threshold_frames: f32,
    classes: Vec<i32>,
    first_seen: HashMap<u64, u64>,
    frame: u64,
}

impl LoiteringDetector {
    pub fn new(config: &LoiteringConfig) -> Self {
        Self {
            enabled: config.enabled,
            threshold_frames: config.threshold_secs * config.fps,
            classes: config.classes.clone(),
            first_seen: HashMap::new(),
            frame: 0,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn update_frame(&mut self, index: u64) {
        self.frame = index;
    }

    #[inline]
    fn watches(&self, class: i32) -> bool {
        self.classes.is_empty() || self.classes.contains(&class)
    }

    /// Notes that track `id` is visible in the current frame, returns whether it is loitering.
    pub fn observe(&mut self, id: u64, class: i32) -> bool {
        if !self.enabled || !self.watches(class) {
            return false;
        }

        let start = *self.first_seen.entry(id).or_insert(self.frame);

        self.frame.saturating_sub(start) as f32 > self.threshold_frames
    }

    /// Sets `loitering` on every snapshot of frame `frame`.
    pub fn annotate(&mut self, frame: u64, tracks: &mut [Track]) {
        self.update_frame(frame);

        for track in tracks.iter_mut() {
            track.loitering = self.observe(track.id, track.class);
        }
    }

    pub fn retain<F: FnMut(u64) -> bool>(&mut self, mut keep: F) {
        self.first_seen.retain(|id, _| keep(*id));
    }

    pub fn clear(&mut self) {
        self.first_seen.clear();
        self.frame = 0;
    }
}
