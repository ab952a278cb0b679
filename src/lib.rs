pub mod bbox;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod kalman;
pub mod loitering;
pub mod matching;
pub mod pipeline;
pub mod rolling_avg;
pub mod scene;
pub mod speed;
pub mod track;

mod circular_queue;

pub use config::{
    Calibration, Config, DetectionFilter, LoiteringConfig, ReacquirePolicy, SpeedConfig,
    TrackerConfig,
};
pub use detection::Detection;
pub use error::Error;
pub use frame::Frame;
pub use loitering::LoiteringDetector;
pub use pipeline::{frame_queue, Delivery, FrameConsumer, FrameProducer, OverflowPolicy};
pub use scene::Scene;
pub use speed::SpeedEstimator;
pub use track::{PositionSample, Track, TrackState};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

pub trait Tracking {
    /// Processes the next frame of stream `src` and returns its confirmed tracks.
    fn update(&mut self, src: &str, frame: &Frame) -> Result<Arc<[Track]>, Error>;

    /// Confirmed tracks of the last processed frame of `src`.
    fn tracks(&self, src: &str) -> Arc<[Track]>;

    fn reset(&mut self, src: &str);
}

struct Stream {
    scene: Scene,
    speed: SpeedEstimator,
    loitering: LoiteringDetector,
    snapshot: Arc<[Track]>,
}

impl Stream {
    fn new(config: &Config) -> Self {
        Self {
            scene: Scene::new(config.tracker.clone()),
            speed: SpeedEstimator::new(&config.speed),
            loitering: LoiteringDetector::new(&config.loitering),
            snapshot: Arc::new([]),
        }
    }

    fn update(&mut self, frame: &Frame, filter: &DetectionFilter) -> Result<Arc<[Track]>, Error> {
        let mut frame = frame.clone();
        frame.select(filter);

        let mut tracks = self.scene.update(&frame)?;

        let scene = &self.scene;
        self.speed.retain(|id| scene.contains(id));
        self.speed.annotate(&mut tracks);

        if self.loitering.is_enabled() {
            self.loitering.retain(|id| scene.contains(id));
            self.loitering.annotate(frame.index, &mut tracks);
        }

        self.snapshot = Arc::from(tracks);

        Ok(self.snapshot.clone())
    }

    fn reset(&mut self) {
        self.scene.reset();
        self.speed.clear();
        self.loitering.clear();
        self.snapshot = Arc::new([]);
    }
}

/// Tracks any number of independent streams, each keyed by its source name.
pub struct StreamTracker {
    config: Config,
    streams: HashMap<String, Stream>,
}

impl StreamTracker {
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            config,
            streams: HashMap::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Changes the distance per pixel of every stream, current and future.
    pub fn set_calibration(&mut self, calibration: Calibration) {
        info!(
            meters_per_pixel = calibration.meters_per_pixel(),
            "calibration updated"
        );

        self.config.speed.calibration = calibration;
        for stream in self.streams.values_mut() {
            stream.speed.set_calibration(calibration);
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    /// Forgets stream `src` entirely.
    pub fn remove(&mut self, src: &str) -> bool {
        let removed = self.streams.remove(src).is_some();
        if removed {
            info!(src, "stream removed");
        }

        removed
    }
}

impl Default for StreamTracker {
    fn default() -> Self {
        Self {
            config: Config::default(),
            streams: HashMap::new(),
        }
    }
}

impl Tracking for StreamTracker {
    fn update(&mut self, src: &str, frame: &Frame) -> Result<Arc<[Track]>, Error> {
        let config = &self.config;
        let stream = self
            .streams
            .entry(src.to_string())
            .or_insert_with(|| {
                info!(src, "new stream");
                Stream::new(config)
            });

        stream.update(frame, &config.input)
    }

    #[inline]
    fn tracks(&self, src: &str) -> Arc<[Track]> {
        if let Some(stream) = self.streams.get(src) {
            return stream.snapshot.clone();
        }

        Arc::new([])
    }

    fn reset(&mut self, src: &str) {
        if let Some(stream) = self.streams.get_mut(src) {
            info!(src, "stream reset");
            stream.reset();
        }
    }
}
