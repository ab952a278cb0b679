use tracing::{debug, warn};

use crate::bbox::{BBox, Ltrb, Xyah};
use crate::config::TrackerConfig;
use crate::detection::Detection;
use crate::error::Error;
use crate::frame::Frame;
use crate::kalman::KalmanFilter;
use crate::matching::{associate, Gate, IndexedSlice};
use crate::track::{Participant, Track, TrackState};

/// Tracker state of one video stream.
///
/// Frames must be fed in order; each call to [`Scene::update`] either processes the whole
/// frame or rejects it without touching any track.
pub struct Scene {
    config: TrackerConfig,
    kf: KalmanFilter,
    tracks: Vec<Participant>,
    lost: Vec<Participant>,
    next_id: u64,
    last_frame: Option<(u64, f64)>,
}

impl Scene {
    pub fn new(config: TrackerConfig) -> Self {
        let kf = KalmanFilter::new(config.std_weight_position, config.std_weight_velocity);

        Self {
            config,
            kf,
            tracks: Vec::with_capacity(64),
            lost: Vec::with_capacity(32),
            next_id: 0,
            last_frame: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Index of the last processed frame.
    #[inline]
    pub fn frame_index(&self) -> Option<u64> {
        self.last_frame.map(|(index, _)| index)
    }

    /// Drops every track and restarts id numbering.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.lost.clear();
        self.next_id = 0;
        self.last_frame = None;
    }

    /// Confirmed tracks.
    pub fn tracks(&self) -> Vec<Track> {
        self.tracks
            .iter()
            .filter(|p| p.state == TrackState::Tracked)
            .map(Participant::snapshot)
            .collect()
    }

    /// Every track still kept, confirmed or not, lost ones last.
    pub fn all_tracks(&self) -> Vec<Track> {
        self.tracks
            .iter()
            .chain(self.lost.iter())
            .map(Participant::snapshot)
            .collect()
    }

    /// Whether track `id` is still kept, lost or not.
    pub fn contains(&self, id: u64) -> bool {
        self.tracks
            .iter()
            .chain(self.lost.iter())
            .any(|p| p.id == id)
    }

    // Frames elapsed since the previous one.
    fn frame_gap(&self, frame: &Frame) -> Result<u64, Error> {
        let (last_index, last_ts) = match self.last_frame {
            Some(last) => last,
            None if frame.timestamp.is_finite() => return Ok(1),
            None => {
                return Err(Error::Timestamp {
                    last: f64::NEG_INFINITY,
                    got: frame.timestamp,
                })
            }
        };

        if frame.index <= last_index {
            return Err(Error::FrameOrder {
                last: last_index,
                got: frame.index,
            });
        }

        if !frame.timestamp.is_finite() || frame.timestamp < last_ts {
            return Err(Error::Timestamp {
                last: last_ts,
                got: frame.timestamp,
            });
        }

        Ok(frame.index - last_index)
    }

    fn gate(&self, max_cost: f32) -> Gate {
        Gate {
            max_cost,
            aspect_ratio_thresh: self.config.aspect_ratio_thresh,
            min_box_area: self.config.min_box_area,
        }
    }

    /// Advances the stream by one frame and returns the confirmed tracks.
    pub fn update(&mut self, frame: &Frame) -> Result<Vec<Track>, Error> {
        let dt = self.frame_gap(frame)? as f32;
        let index = frame.index;
        let ts = frame.timestamp;

        let dets: Vec<Detection> = frame
            .iter()
            .filter(|det| match det.validate() {
                Ok(()) => true,
                Err(err) => {
                    warn!(frame = index, ?det, "dropping detection: {}", err);
                    false
                }
            })
            .copied()
            .collect();

        let mut high = Vec::new();
        let mut low = Vec::new();
        for (i, det) in dets.iter().enumerate() {
            if det.confidence >= self.config.track_thresh {
                high.push(i);
            } else if det.confidence > self.config.low_thresh {
                low.push(i);
            }
        }

        // Pool order: active tracks, then lost ones.
        let predictions: Vec<_> = self
            .tracks
            .iter()
            .chain(self.lost.iter())
            .map(|p| p.predicted(&self.kf, dt))
            .collect();

        let boxes: Vec<BBox<Ltrb>> = predictions
            .iter()
            .map(|(mean, _)| BBox::<Xyah>::from_state(mean).clamped())
            .collect();

        let states: Vec<TrackState> = self
            .tracks
            .iter()
            .chain(self.lost.iter())
            .map(|p| p.state)
            .collect();

        let first = associate(
            &IndexedSlice::new(&boxes),
            &IndexedSlice::new_with_indexes(&dets, high),
            &self.gate(self.config.match_thresh),
        )?;

        let remaining: Vec<usize> = first
            .unmatched_tracks
            .iter()
            .copied()
            .filter(|&i| states[i] == TrackState::Tracked)
            .collect();

        let second = associate(
            &IndexedSlice::new_with_indexes(&boxes, remaining),
            &IndexedSlice::new_with_indexes(&dets, low),
            &self.gate(self.config.low_match_thresh),
        )?;

        // Nothing below this point can fail.
        let mut pool: Vec<Participant> = self
            .tracks
            .drain(..)
            .chain(self.lost.drain(..))
            .collect();
        for (p, (mean, covariance)) in pool.iter_mut().zip(predictions) {
            p.mean = mean;
            p.covariance = covariance;
        }

        let mut matched = vec![false; pool.len()];
        for &(t, d) in first.pairs.iter().chain(second.pairs.iter()) {
            matched[t] = true;

            let p = &mut pool[t];
            if p.hit(&self.kf, &dets[d], index, ts, &self.config) {
                debug!(track_id = p.id, frame = index, "track re-acquired");
            }
        }

        for (p, _) in pool.iter_mut().zip(matched).filter(|(_, m)| !m) {
            let was = p.state;
            p.miss(self.config.track_buffer);

            if was != TrackState::Lost && p.state == TrackState::Lost {
                debug!(track_id = p.id, frame = index, "track lost");
            }
        }

        for d in first.unmatched_detections {
            let det = &dets[d];
            if det.area() < self.config.min_box_area {
                continue;
            }

            self.next_id += 1;
            debug!(track_id = self.next_id, frame = index, class = det.class, "track created");

            pool.push(Participant::new(
                self.next_id,
                &self.kf,
                det,
                index,
                ts,
                self.config.history_len,
            ));
        }

        for p in pool {
            match p.state {
                TrackState::Removed => {
                    debug!(track_id = p.id, frame = index, misses = p.misses, "track removed");
                }
                TrackState::Lost => self.lost.push(p),
                TrackState::New | TrackState::Tracked => self.tracks.push(p),
            }
        }

        self.last_frame = Some((index, ts));

        Ok(self.tracks())
    }
}
