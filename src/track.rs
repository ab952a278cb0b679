use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb, Xyah};
use crate::circular_queue::CircularQueue;
use crate::config::{ReacquirePolicy, TrackerConfig};
use crate::detection::Detection;
use crate::kalman::{KalmanFilter, StateCov, StateMean};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    New,
    Tracked,
    Lost,
    Removed,
}

impl TrackState {
    /// State after a successful match.
    ///
    /// `activated` tells whether the track was ever confirmed, `hit_streak` counts the
    /// consecutive matches including this one.
    pub fn on_hit(self, activated: bool, hit_streak: u32, confirm_hits: u32) -> TrackState {
        match self {
            TrackState::Removed => TrackState::Removed,
            TrackState::Tracked => TrackState::Tracked,
            TrackState::New | TrackState::Lost => {
                if activated || hit_streak >= confirm_hits {
                    TrackState::Tracked
                } else {
                    TrackState::New
                }
            }
        }
    }

    /// State after a frame without a match; `misses` includes this one.
    pub fn on_miss(self, misses: u32, track_buffer: u32) -> TrackState {
        match self {
            TrackState::New | TrackState::Tracked => TrackState::Lost,
            TrackState::Lost if misses > track_buffer => TrackState::Removed,
            TrackState::Lost => TrackState::Lost,
            TrackState::Removed => TrackState::Removed,
        }
    }
}

/// Box center observed at a given time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub pos: na::Point2<f32>,
    pub ts: f64,
}

impl PositionSample {
    #[inline]
    pub fn new(pos: na::Point2<f32>, ts: f64) -> Self {
        Self { pos, ts }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Participant {
    pub id: u64,
    pub state: TrackState,
    pub activated: bool,
    pub mean: StateMean,
    pub covariance: StateCov,
    pub class: i32,
    pub score: f32,
    pub start_frame: u64,
    pub last_frame: u64,
    pub hit_streak: u32,
    pub misses: u32,
    pub history: CircularQueue<PositionSample>,
}

impl Participant {
    pub fn new(
        id: u64,
        kf: &KalmanFilter,
        det: &Detection,
        frame: u64,
        ts: f64,
        history_len: usize,
    ) -> Self {
        let (mean, covariance) = kf.initiate(&det.xyah());

        let mut history = CircularQueue::with_capacity(history_len);
        history.push(PositionSample::new(det.bbox.center(), ts));

        Self {
            id,
            state: TrackState::New,
            activated: false,
            mean,
            covariance,
            class: det.class,
            score: det.confidence,
            start_frame: frame,
            last_frame: frame,
            hit_streak: 0,
            misses: 0,
            history,
        }
    }

    /// Motion state advanced by `dt` frames, leaving `self` untouched.
    pub fn predicted(&self, kf: &KalmanFilter, dt: f32) -> (StateMean, StateCov) {
        let mut mean = self.mean;
        if self.state != TrackState::Tracked {
            mean[7] = 0.0;
        }

        kf.predict(&mean, &self.covariance, dt)
    }

    /// Applies a matched detection. Returns `true` when the track was re-acquired from `Lost`.
    pub fn hit(
        &mut self,
        kf: &KalmanFilter,
        det: &Detection,
        frame: u64,
        ts: f64,
        config: &TrackerConfig,
    ) -> bool {
        let reacquired = self.state == TrackState::Lost;

        if reacquired && config.reacquire == ReacquirePolicy::ResetVelocity {
            let (mean, covariance) = kf.reset_velocity(&self.mean, &self.covariance);
            self.mean = mean;
            self.covariance = covariance;
        }

        let (mean, covariance) = kf.update(&self.mean, &self.covariance, &det.xyah());
        self.mean = mean;
        self.covariance = covariance;

        self.class = det.class;
        self.score = det.confidence;
        self.last_frame = frame;
        self.misses = 0;
        self.hit_streak = self.hit_streak.saturating_add(1);

        self.state = self
            .state
            .on_hit(self.activated, self.hit_streak, config.confirm_hits);
        if self.state == TrackState::Tracked {
            self.activated = true;
        }

        self.history.push(PositionSample::new(self.center(), ts));

        reacquired
    }

    pub fn miss(&mut self, track_buffer: u32) {
        self.misses += 1;
        self.hit_streak = 0;
        self.state = self.state.on_miss(self.misses, track_buffer);
    }

    #[inline]
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new(self.mean[0], self.mean[1])
    }

    #[inline]
    pub fn bbox(&self) -> BBox<Ltrb> {
        BBox::<Xyah>::from_state(&self.mean).clamped()
    }

    pub fn snapshot(&self) -> Track {
        Track {
            id: self.id,
            state: self.state,
            bbox: self.bbox(),
            class: self.class,
            score: self.score,
            start_frame: self.start_frame,
            last_frame: self.last_frame,
            history: self.history.asc_iter().copied().collect(),
            speed: None,
            loitering: false,
        }
    }
}

/// Immutable view of one track, taken after a frame was processed.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub id: u64,
    pub state: TrackState,
    pub bbox: BBox<Ltrb>,
    pub class: i32,
    pub score: f32,
    pub start_frame: u64,
    pub last_frame: u64,

    // oldest first
    #[serde(skip)]
    pub history: Vec<PositionSample>,

    // in km/h
    pub speed: Option<f32>,
    pub loitering: bool,
}

impl Track {
    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Tracked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x: f32, y: f32) -> Detection {
        Detection::new(BBox::ltrb(x, y, x + 20.0, y + 40.0), 0.9, 2)
    }

    #[test]
    fn confirmation_needs_hit_streak() {
        assert_eq!(TrackState::New.on_hit(false, 1, 1), TrackState::Tracked);
        assert_eq!(TrackState::New.on_hit(false, 1, 3), TrackState::New);
        assert_eq!(TrackState::New.on_hit(false, 3, 3), TrackState::Tracked);
    }

    #[test]
    fn lost_returns_to_previous_standing() {
        assert_eq!(TrackState::Lost.on_hit(true, 1, 3), TrackState::Tracked);
        assert_eq!(TrackState::Lost.on_hit(false, 1, 3), TrackState::New);
    }

    #[test]
    fn removal_only_through_lost() {
        assert_eq!(TrackState::Tracked.on_miss(100, 5), TrackState::Lost);
        assert_eq!(TrackState::New.on_miss(100, 5), TrackState::Lost);
        assert_eq!(TrackState::Lost.on_miss(5, 5), TrackState::Lost);
        assert_eq!(TrackState::Lost.on_miss(6, 5), TrackState::Removed);
    }

    #[test]
    fn removed_is_terminal() {
        assert_eq!(TrackState::Removed.on_hit(true, 10, 1), TrackState::Removed);
        assert_eq!(TrackState::Removed.on_miss(0, 5), TrackState::Removed);
    }

    #[test]
    fn participant_lifecycle() {
        let kf = KalmanFilter::default();
        let config = TrackerConfig::default();
        let mut p = Participant::new(1, &kf, &det(0.0, 0.0), 1, 0.0, 4);

        assert_eq!(p.state, TrackState::New);
        assert_eq!(p.history.len(), 1);

        let (mean, cov) = p.predicted(&kf, 1.0);
        p.mean = mean;
        p.covariance = cov;
        assert!(!p.hit(&kf, &det(2.0, 0.0), 2, 0.04, &config));
        assert_eq!(p.state, TrackState::Tracked);
        assert!(p.activated);

        p.miss(config.track_buffer);
        assert_eq!(p.state, TrackState::Lost);
        assert_eq!(p.hit_streak, 0);

        assert!(p.hit(&kf, &det(4.0, 0.0), 4, 0.12, &config));
        assert_eq!(p.state, TrackState::Tracked);
        assert_eq!(p.misses, 0);
        assert_eq!(p.last_frame, 4);
        assert_eq!(p.history.len(), 3);
    }

    #[test]
    fn hit_streak_saturates() {
        let kf = KalmanFilter::default();
        let config = TrackerConfig::default();
        let mut p = Participant::new(1, &kf, &det(0.0, 0.0), 1, 0.0, 4);
        p.hit_streak = u32::MAX;

        p.hit(&kf, &det(0.0, 0.0), 2, 0.04, &config);
        assert_eq!(p.hit_streak, u32::MAX);
        assert_eq!(p.state, TrackState::Tracked);
    }

    #[test]
    fn coasting_freezes_height_velocity() {
        let kf = KalmanFilter::default();
        let mut p = Participant::new(1, &kf, &det(0.0, 0.0), 1, 0.0, 4);
        p.mean[7] = 5.0;

        let (mean, _) = p.predicted(&kf, 1.0);
        assert_relative_eq!(mean[3], 40.0);

        p.state = TrackState::Tracked;
        let (mean, _) = p.predicted(&kf, 1.0);
        assert_relative_eq!(mean[3], 45.0);
    }

    #[test]
    fn snapshot_copies_history_oldest_first() {
        let kf = KalmanFilter::default();
        let config = TrackerConfig::default();
        let mut p = Participant::new(7, &kf, &det(0.0, 0.0), 1, 0.0, 2);
        p.hit(&kf, &det(0.0, 0.0), 2, 1.0, &config);
        p.hit(&kf, &det(0.0, 0.0), 3, 2.0, &config);

        let track = p.snapshot();

        assert_eq!(track.id, 7);
        assert!(track.is_confirmed());
        assert_eq!(track.history.len(), 2);
        assert_eq!(track.history[0].ts, 1.0);
        assert_eq!(track.history[1].ts, 2.0);
        assert_eq!(track.speed, None);
    }
}
