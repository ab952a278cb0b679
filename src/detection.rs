use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb, Xyah};
use crate::error::Error;

/// One detector output for a single frame: a corner box in pixels, a score and a class label.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BBox<Ltrb>,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "c")]
    pub class: i32,
}

impl Detection {
    #[inline]
    pub fn new(bbox: BBox<Ltrb>, confidence: f32, class: i32) -> Self {
        Self {
            bbox,
            confidence,
            class,
        }
    }

    /// Rejects non-finite or inverted boxes and scores outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.bbox.is_finite() {
            return Err(Error::InvalidDetection {
                reason: "non-finite coordinates",
            });
        }

        if !self.bbox.is_valid() {
            return Err(Error::InvalidDetection {
                reason: "inverted or empty box",
            });
        }

        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::InvalidDetection {
                reason: "score outside [0, 1]",
            });
        }

        Ok(())
    }

    #[inline(always)]
    pub fn area(&self) -> f32 {
        self.bbox.area()
    }

    #[inline(always)]
    pub fn xyah(&self) -> BBox<Xyah> {
        self.bbox.as_xyah()
    }
}
