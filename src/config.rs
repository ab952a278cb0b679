use crate::error::Error;
use serde_derive::{Deserialize, Serialize};

/// Real-world metres represented by one pixel. Always finite and strictly positive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(try_from = "f32", into = "f32")]
pub struct Calibration(f32);

impl Calibration {
    pub fn new(meters_per_pixel: f32) -> Result<Self, Error> {
        if !meters_per_pixel.is_finite() || meters_per_pixel <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "calibration must be a positive distance per pixel, got {}",
                meters_per_pixel
            )));
        }

        Ok(Self(meters_per_pixel))
    }

    #[inline]
    pub fn meters_per_pixel(self) -> f32 {
        self.0
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self(0.01)
    }
}

impl TryFrom<f32> for Calibration {
    type Error = Error;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Calibration> for f32 {
    fn from(calibration: Calibration) -> Self {
        calibration.0
    }
}

/// What happens to a track's velocity when it is re-acquired after being lost.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReacquirePolicy {
    /// Drop the coasted velocity and restore its initial uncertainty.
    #[default]
    ResetVelocity,
    /// Keep whatever velocity the filter carried through the loss.
    Retain,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections at or above this score are "high": they may spawn tracks.
    pub track_thresh: f32,
    /// Detections below this score are ignored entirely.
    pub low_thresh: f32,
    /// Frames a lost track is kept before removal.
    pub track_buffer: u32,
    /// Maximum IOU distance accepted in the first association.
    pub match_thresh: f32,
    /// Maximum IOU distance accepted when recovering tracks with low-score detections.
    pub low_match_thresh: f32,
    pub aspect_ratio_thresh: f32,
    pub min_box_area: f32,
    /// Consecutive matches after creation needed to confirm a track.
    pub confirm_hits: u32,
    /// Position samples kept per track.
    pub history_len: usize,
    pub std_weight_position: f32,
    pub std_weight_velocity: f32,
    pub reacquire: ReacquirePolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_thresh: 0.5,
            low_thresh: 0.1,
            track_buffer: 30,
            match_thresh: 0.8,
            low_match_thresh: 0.5,
            aspect_ratio_thresh: 1.6,
            min_box_area: 10.0,
            confirm_hits: 1,
            history_len: 30,
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
            reacquire: ReacquirePolicy::default(),
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        ensure(unit(self.track_thresh), "track_thresh must lie in [0, 1]")?;
        ensure(unit(self.low_thresh), "low_thresh must lie in [0, 1]")?;
        ensure(
            self.low_thresh <= self.track_thresh,
            "low_thresh must not exceed track_thresh",
        )?;
        ensure(
            self.match_thresh > 0.0 && self.match_thresh <= 1.0,
            "match_thresh must lie in (0, 1]",
        )?;
        ensure(
            self.low_match_thresh > 0.0 && self.low_match_thresh <= 1.0,
            "low_match_thresh must lie in (0, 1]",
        )?;
        ensure(
            self.aspect_ratio_thresh > 0.0,
            "aspect_ratio_thresh must be positive",
        )?;
        ensure(
            self.min_box_area >= 0.0 && self.min_box_area.is_finite(),
            "min_box_area must be a finite non-negative area",
        )?;
        ensure(self.confirm_hits >= 1, "confirm_hits must be at least 1")?;
        ensure(self.history_len >= 2, "history_len must be at least 2")?;
        ensure(
            positive(self.std_weight_position) && positive(self.std_weight_velocity),
            "noise weights must be positive",
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SpeedConfig {
    pub calibration: Calibration,
    /// Raw speed samples averaged per track.
    pub smoothing_window: usize,
    /// Shortest span, in seconds, a speed may be computed over.
    pub min_elapsed: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            smoothing_window: 5,
            min_elapsed: 0.1,
        }
    }
}

impl SpeedConfig {
    pub fn validate(&self) -> Result<(), Error> {
        ensure(
            self.smoothing_window >= 1,
            "smoothing_window must be at least 1",
        )?;
        ensure(
            self.min_elapsed.is_finite() && self.min_elapsed > 0.0,
            "min_elapsed must be positive",
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoiteringConfig {
    pub enabled: bool,
    pub threshold_secs: f32,
    pub fps: f32,
    /// Class labels watched for loitering; empty means every class.
    pub classes: Vec<i32>,
}

impl Default for LoiteringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_secs: 10.0,
            fps: 30.0,
            classes: Vec::new(),
        }
    }
}

impl LoiteringConfig {
    pub fn validate(&self) -> Result<(), Error> {
        ensure(
            positive(self.threshold_secs),
            "loitering threshold_secs must be positive",
        )?;
        ensure(positive(self.fps), "loitering fps must be positive")
    }
}

/// Selects which detections reach the tracker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectionFilter {
    /// Class labels kept; empty keeps every class.
    pub classes: Vec<i32>,
    /// Highest-scoring detections kept per frame.
    pub max_detections: usize,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            classes: Vec::new(),
            max_detections: 50,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub speed: SpeedConfig,
    pub loitering: LoiteringConfig,
    pub input: DetectionFilter,
}

impl DetectionFilter {
    pub fn validate(&self) -> Result<(), Error> {
        ensure(
            self.max_detections >= 1,
            "max_detections must be at least 1",
        )
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        self.tracker.validate()?;
        self.speed.validate()?;
        self.loitering.validate()?;
        self.input.validate()
    }
}

#[inline]
fn unit(v: f32) -> bool {
    (0.0..=1.0).contains(&v)
}

#[inline]
fn positive(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

#[inline]
fn ensure(cond: bool, msg: &str) -> Result<(), Error> {
    if cond {
        Ok(())
    } else {
        Err(Error::InvalidConfig(msg.to_string()))
    }
}
