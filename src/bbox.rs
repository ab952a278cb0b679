use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Smallest height and aspect ratio a box may collapse to when rebuilt from filter state.
pub const MIN_EXTENT: f32 = 1e-3;

/// Coordinate layout of a [`BBox`].
pub trait BBoxFormat: std::fmt::Debug + Copy + PartialEq {}

/// Corners: `[left, top, right, bottom]` in pixels.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// Motion-model layout: `[center x, center y, width / height, height]`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Xyah;
impl BBoxFormat for Xyah {}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(transparent)]
pub struct BBox<F: BBoxFormat>([f32; 4], #[serde(skip)] PhantomData<F>);

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        BBox([x1, y1, x2, y2], PhantomData)
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2] - self.0[0]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3] - self.0[1]
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.width() / self.height()
    }

    #[inline]
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new(
            (self.0[0] + self.0[2]) / 2.0,
            (self.0[1] + self.0[3]) / 2.0,
        )
    }

    /// Finite coordinates with strictly positive width and height.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.0[0] < self.0[2] && self.0[1] < self.0[3]
    }

    pub fn intersection_area(&self, other: &BBox<Ltrb>) -> f32 {
        let l = self.left().max(other.left());
        let r = self.right().min(other.right());
        let t = self.top().max(other.top());
        let b = self.bottom().min(other.bottom());

        (r - l).max(0.0) * (b - t).max(0.0)
    }

    pub fn iou(&self, other: &BBox<Ltrb>) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;

        if union <= 0.0 {
            return 0.0;
        }

        inter / union
    }

    #[inline]
    pub fn as_xyah(&self) -> BBox<Xyah> {
        self.into()
    }
}

impl BBox<Xyah> {
    #[inline]
    pub fn xyah(cx: f32, cy: f32, aspect_ratio: f32, height: f32) -> Self {
        BBox([cx, cy, aspect_ratio, height], PhantomData)
    }

    /// Reads the positional half of a motion state vector.
    #[inline]
    pub fn from_state(state: &na::SVector<f32, 8>) -> Self {
        Self::xyah(state[0], state[1], state[2], state[3])
    }

    #[inline(always)]
    pub fn cx(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn cy(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn aspect_ratio(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3]
    }

    #[inline]
    pub fn to_vector(&self) -> na::Vector4<f32> {
        na::Vector4::new(self.0[0], self.0[1], self.0[2], self.0[3])
    }

    /// Box with height and aspect ratio kept away from zero.
    #[inline]
    pub fn clamped(&self) -> BBox<Ltrb> {
        let height = self.height().max(MIN_EXTENT);
        let aspect_ratio = self.aspect_ratio().max(MIN_EXTENT);

        Self::xyah(self.cx(), self.cy(), aspect_ratio, height).as_ltrb()
    }

    #[inline(always)]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }
}

impl<'a> From<&'a BBox<Ltrb>> for BBox<Xyah> {
    #[inline]
    fn from(v: &'a BBox<Ltrb>) -> Self {
        let width = v.0[2] - v.0[0];
        let height = v.0[3] - v.0[1];

        Self(
            [v.0[0] + width / 2.0, v.0[1] + height / 2.0, width / height, height],
            PhantomData,
        )
    }
}

impl<'a> From<&'a BBox<Xyah>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Xyah>) -> Self {
        let half_w = v.0[2] * v.0[3] / 2.0;
        let half_h = v.0[3] / 2.0;

        Self(
            [v.0[0] - half_w, v.0[1] - half_h, v.0[0] + half_w, v.0[1] + half_h],
            PhantomData,
        )
    }
}
