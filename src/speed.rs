//! Real-world speed of tracks from their position history.

use std::collections::HashMap;

use nalgebra as na;
use tracing::debug;

use crate::config::{Calibration, SpeedConfig};
use crate::rolling_avg::RollingAvg;
use crate::track::Track;

const MPS_TO_KMH: f32 = 3.6;

pub struct SpeedEstimator {
    calibration: Calibration,
    min_elapsed: f64,
    window: usize,
    buffers: HashMap<u64, RollingAvg<f32>>,
}

impl SpeedEstimator {
    pub fn new(config: &SpeedConfig) -> Self {
        Self {
            calibration: config.calibration,
            min_elapsed: config.min_elapsed,
            window: config.smoothing_window,
            buffers: HashMap::new(),
        }
    }

    #[inline]
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Takes effect from the next sample on; already averaged samples are kept.
    pub fn set_calibration(&mut self, calibration: Calibration) {
        debug!(
            meters_per_pixel = calibration.meters_per_pixel(),
            "speed calibration changed"
        );
        self.calibration = calibration;
    }

    /// Records a raw sample for `track` and returns its smoothed speed in km/h.
    ///
    /// Returns `None`, recording nothing, until the history spans at least two samples
    /// and `min_elapsed` seconds.
    pub fn update(&mut self, track: &Track) -> Option<f32> {
        if track.history.len() < 2 {
            return None;
        }

        let first = track.history.first()?;
        let last = track.history.last()?;

        let elapsed = last.ts - first.ts;
        if elapsed.is_nan() || elapsed < self.min_elapsed {
            return None;
        }

        let pixels = na::distance(&first.pos, &last.pos);
        let meters = pixels * self.calibration.meters_per_pixel();
        let kmh = meters / elapsed as f32 * MPS_TO_KMH;

        let window = self.window;
        let avg = self
            .buffers
            .entry(track.id)
            .or_insert_with(|| RollingAvg::new(window));

        Some(avg.push(kmh))
    }

    /// Last smoothed speed of a track.
    #[inline]
    pub fn speed(&self, id: u64) -> Option<f32> {
        self.buffers.get(&id)?.mean()
    }

    /// Writes the speed of every confirmed track into its snapshot.
    pub fn annotate(&mut self, tracks: &mut [Track]) {
        for track in tracks.iter_mut().filter(|t| t.is_confirmed()) {
            let speed = self.update(track).or_else(|| self.speed(track.id));
            track.speed = speed;
        }
    }

    /// Forgets the tracks for which `keep` returns false.
    pub fn retain<F: FnMut(u64) -> bool>(&mut self, mut keep: F) {
        self.buffers.retain(|id, _| keep(*id));
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
