//! Detection-to-track association: IOU distance, gating and minimum-cost assignment.

use crate::bbox::{BBox, Ltrb};
use crate::detection::Detection;
use crate::error::Error;

use munkres::{solve_assignment, WeightMatrix};
use nalgebra as na;

// Cost of a pair that must never be matched, also used for padding the square matrix.
const FORBIDDEN: f64 = 100_000.0;

// Prefers lower (track, detection) indices among otherwise equal assignments.
const TIE_BREAK: f64 = 1e-9;

/// Anything that occupies a box in the image.
pub trait Region {
    fn region(&self) -> BBox<Ltrb>;

    #[inline]
    fn aspect_ratio(&self) -> f32 {
        self.region().aspect_ratio()
    }
}

impl Region for BBox<Ltrb> {
    #[inline]
    fn region(&self) -> BBox<Ltrb> {
        *self
    }
}

impl Region for Detection {
    #[inline]
    fn region(&self) -> BBox<Ltrb> {
        self.bbox
    }
}

#[derive(Debug)]
enum IndexedSliceKind {
    All,
    Indexes(Vec<usize>),
}

/// A view over a subset of a slice that remembers the original positions.
pub struct IndexedSlice<'a, T> {
    pub slice: &'a [T],
    kind: IndexedSliceKind,
}

impl<'a, T> IndexedSlice<'a, T> {
    pub fn new(slice: &'a [T]) -> Self {
        Self {
            slice,
            kind: IndexedSliceKind::All,
        }
    }

    pub fn new_with_indexes(slice: &'a [T], idx: Vec<usize>) -> Self {
        Self {
            slice,
            kind: IndexedSliceKind::Indexes(idx),
        }
    }

    /// Maps a position in the view back to a position in the underlying slice.
    #[inline]
    pub fn get_index(&self, idx: usize) -> usize {
        match &self.kind {
            IndexedSliceKind::All => idx,
            IndexedSliceKind::Indexes(idxs) => idxs[idx],
        }
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&'a T> {
        match &self.kind {
            IndexedSliceKind::All => self.slice.get(idx),
            IndexedSliceKind::Indexes(idxs) => self.slice.get(*idxs.get(idx)?),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match &self.kind {
            IndexedSliceKind::All => self.slice.len(),
            IndexedSliceKind::Indexes(idxs) => idxs.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a T> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

impl<'a, T> std::ops::Index<usize> for IndexedSlice<'a, T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.slice[self.get_index(index)]
    }
}

/// Rules a candidate pair must satisfy on top of minimum-cost assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gate {
    /// Largest accepted `1 - IOU`.
    pub max_cost: f32,
    /// Largest accepted relative deviation of the detection aspect ratio from the track's.
    pub aspect_ratio_thresh: f32,
    pub min_box_area: f32,
}

impl Gate {
    pub fn admits<T: Region, D: Region>(&self, track: &T, det: &D, cost: f32) -> bool {
        if cost > self.max_cost {
            return false;
        }

        let region = det.region();
        if region.area() < self.min_box_area {
            return false;
        }

        let track_ratio = track.aspect_ratio();
        if track_ratio.is_nan() || track_ratio <= 0.0 {
            return false;
        }

        (region.aspect_ratio() - track_ratio).abs() / track_ratio <= self.aspect_ratio_thresh
    }
}

/// Result of one association round, in indices of the underlying slices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matches {
    pub pairs: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

impl Matches {
    fn unmatched(rows: usize, cols: usize) -> Self {
        Self {
            pairs: Vec::new(),
            unmatched_tracks: (0..rows).collect(),
            unmatched_detections: (0..cols).collect(),
        }
    }

    fn remap<T, D>(self, tracks: &IndexedSlice<'_, T>, dets: &IndexedSlice<'_, D>) -> Self {
        Self {
            pairs: self
                .pairs
                .into_iter()
                .map(|(r, c)| (tracks.get_index(r), dets.get_index(c)))
                .collect(),
            unmatched_tracks: self
                .unmatched_tracks
                .into_iter()
                .map(|r| tracks.get_index(r))
                .collect(),
            unmatched_detections: self
                .unmatched_detections
                .into_iter()
                .map(|c| dets.get_index(c))
                .collect(),
        }
    }
}

/// Pairwise `1 - IOU` between every track and every detection of the views.
pub fn iou_distance<T: Region, D: Region>(
    tracks: &IndexedSlice<'_, T>,
    dets: &IndexedSlice<'_, D>,
) -> na::DMatrix<f32> {
    let track_boxes: Vec<_> = tracks.iter().map(Region::region).collect();
    let det_boxes: Vec<_> = dets.iter().map(Region::region).collect();

    na::DMatrix::from_fn(track_boxes.len(), det_boxes.len(), |r, c| {
        1.0 - track_boxes[r].iou(&det_boxes[c])
    })
}

/// Minimum-cost one-to-one assignment over `cost`, restricted to admissible cells.
///
/// Indices in the result are row and column positions of `cost`.
pub fn linear_assignment<A>(cost: &na::DMatrix<f32>, admissible: A) -> Result<Matches, Error>
where
    A: Fn(usize, usize) -> bool,
{
    let (rows, cols) = cost.shape();
    if rows == 0 || cols == 0 {
        return Ok(Matches::unmatched(rows, cols));
    }

    let n = rows.max(cols);
    let mut weights = WeightMatrix::from_fn(n, |(r, c)| {
        if r < rows && c < cols && admissible(r, c) {
            cost[(r, c)] as f64 + (r + c) as f64 * TIE_BREAK
        } else {
            FORBIDDEN
        }
    });

    let positions = solve_assignment(&mut weights).map_err(|_| Error::Assignment)?;

    let mut track_used = vec![false; rows];
    let mut det_used = vec![false; cols];
    let mut pairs = Vec::new();

    for pos in positions {
        if pos.row < rows && pos.column < cols && admissible(pos.row, pos.column) {
            track_used[pos.row] = true;
            det_used[pos.column] = true;
            pairs.push((pos.row, pos.column));
        }
    }

    pairs.sort_unstable();

    Ok(Matches {
        pairs,
        unmatched_tracks: (0..rows).filter(|&r| !track_used[r]).collect(),
        unmatched_detections: (0..cols).filter(|&c| !det_used[c]).collect(),
    })
}

/// Associates the tracks of one view with the detections of another.
pub fn associate<T: Region, D: Region>(
    tracks: &IndexedSlice<'_, T>,
    dets: &IndexedSlice<'_, D>,
    gate: &Gate,
) -> Result<Matches, Error> {
    if tracks.is_empty() || dets.is_empty() {
        return Ok(Matches::unmatched(tracks.len(), dets.len()).remap(tracks, dets));
    }

    let cost = iou_distance(tracks, dets);
    let matches = linear_assignment(&cost, |r, c| {
        gate.admits(&tracks[r], &dets[c], cost[(r, c)])
    })?;

    Ok(matches.remap(tracks, dets))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GATE: Gate = Gate {
        max_cost: 0.8,
        aspect_ratio_thresh: 1.6,
        min_box_area: 10.0,
    };

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BBox<Ltrb> {
        BBox::ltrb(x, y, x + w, y + h)
    }

    #[test]
    fn empty_inputs_match_nothing() {
        let tracks = vec![bbox(0.0, 0.0, 10.0, 10.0)];
        let dets: Vec<BBox<Ltrb>> = Vec::new();

        let m = associate(&IndexedSlice::new(&tracks), &IndexedSlice::new(&dets), &GATE).unwrap();
        assert!(m.pairs.is_empty());
        assert_eq!(m.unmatched_tracks, vec![0]);
        assert!(m.unmatched_detections.is_empty());

        let m = associate(&IndexedSlice::new(&dets), &IndexedSlice::new(&tracks), &GATE).unwrap();
        assert!(m.unmatched_tracks.is_empty());
        assert_eq!(m.unmatched_detections, vec![0]);
    }

    #[test]
    fn identical_boxes_match() {
        let tracks = vec![bbox(0.0, 0.0, 20.0, 40.0), bbox(100.0, 100.0, 20.0, 40.0)];
        let dets = vec![bbox(100.0, 100.0, 20.0, 40.0), bbox(0.0, 0.0, 20.0, 40.0)];

        let m = associate(&IndexedSlice::new(&tracks), &IndexedSlice::new(&dets), &GATE).unwrap();

        assert_eq!(m.pairs, vec![(0, 1), (1, 0)]);
        assert!(m.unmatched_tracks.is_empty());
        assert!(m.unmatched_detections.is_empty());
    }

    #[test]
    fn distant_boxes_do_not_match() {
        let tracks = vec![bbox(0.0, 0.0, 20.0, 20.0)];
        let dets = vec![bbox(200.0, 200.0, 20.0, 20.0)];

        let m = associate(&IndexedSlice::new(&tracks), &IndexedSlice::new(&dets), &GATE).unwrap();

        assert!(m.pairs.is_empty());
        assert_eq!(m.unmatched_tracks, vec![0]);
        assert_eq!(m.unmatched_detections, vec![0]);
    }

    #[test]
    fn aspect_ratio_gate_rejects_overlapping_box() {
        let tracks = vec![bbox(0.0, 0.0, 10.0, 40.0)];
        // wide box covering the tall one: IOU passes, shape does not
        let dets = vec![bbox(0.0, 0.0, 40.0, 40.0)];
        let gate = Gate {
            max_cost: 0.9,
            aspect_ratio_thresh: 0.5,
            min_box_area: 0.0,
        };

        let m = associate(&IndexedSlice::new(&tracks), &IndexedSlice::new(&dets), &gate).unwrap();
        assert!(m.pairs.is_empty());
    }

    #[test]
    fn degenerate_track_shape_admits_nothing() {
        let gate = Gate {
            min_box_area: 0.0,
            ..GATE
        };
        let det = bbox(0.0, 0.0, 10.0, 20.0);

        // zero-sized: 0 / 0
        assert!(!gate.admits(&bbox(5.0, 5.0, 0.0, 0.0), &det, 0.0));
        // flat: 10 / 0
        assert!(!gate.admits(&bbox(0.0, 5.0, 10.0, 0.0), &det, 0.0));
        // thin: 0 / 20
        assert!(!gate.admits(&bbox(5.0, 0.0, 0.0, 20.0), &det, 0.0));
        assert!(gate.admits(&det, &det, 0.0));
    }

    #[test]
    fn min_area_gate_rejects_tiny_box() {
        let tracks = vec![bbox(0.0, 0.0, 3.0, 3.0)];
        let dets = vec![bbox(0.0, 0.0, 3.0, 3.0)];

        let m = associate(&IndexedSlice::new(&tracks), &IndexedSlice::new(&dets), &GATE).unwrap();
        assert!(m.pairs.is_empty());
    }

    #[test]
    fn hungarian_beats_greedy() {
        // Greedy would take (0, 0) first and leave track 1 without an admissible partner.
        let cost = na::DMatrix::from_row_slice(2, 2, &[0.1, 0.2, 0.3, 1.0]);

        let m = linear_assignment(&cost, |r, c| cost[(r, c)] <= 0.8).unwrap();

        assert_eq!(m.pairs, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn rectangular_assignment() {
        let cost = na::DMatrix::from_row_slice(1, 3, &[0.5, 0.2, 0.4]);

        let m = linear_assignment(&cost, |_, _| true).unwrap();

        assert_eq!(m.pairs, vec![(0, 1)]);
        assert_eq!(m.unmatched_detections, vec![0, 2]);
    }

    #[test]
    fn ties_prefer_matrix_order() {
        let tracks = vec![bbox(0.0, 0.0, 20.0, 20.0)];
        let dets = vec![bbox(0.0, 0.0, 20.0, 20.0), bbox(0.0, 0.0, 20.0, 20.0)];

        let m = associate(&IndexedSlice::new(&tracks), &IndexedSlice::new(&dets), &GATE).unwrap();

        assert_eq!(m.pairs, vec![(0, 0)]);
        assert_eq!(m.unmatched_detections, vec![1]);
    }

    #[test]
    fn indexes_are_mapped_back() {
        let tracks = vec![
            bbox(500.0, 500.0, 20.0, 20.0),
            bbox(0.0, 0.0, 20.0, 20.0),
            bbox(100.0, 0.0, 20.0, 20.0),
        ];
        let dets = vec![
            bbox(101.0, 0.0, 20.0, 20.0),
            bbox(900.0, 900.0, 20.0, 20.0),
            bbox(1.0, 1.0, 20.0, 20.0),
        ];

        let m = associate(
            &IndexedSlice::new_with_indexes(&tracks, vec![1, 2]),
            &IndexedSlice::new_with_indexes(&dets, vec![0, 2]),
            &GATE,
        )
        .unwrap();

        assert_eq!(m.pairs, vec![(1, 2), (2, 0)]);
        assert!(m.unmatched_tracks.is_empty());
        assert!(m.unmatched_detections.is_empty());
    }

    #[test]
    fn cost_is_one_minus_iou() {
        let tracks = vec![bbox(0.0, 0.0, 10.0, 10.0)];
        let dets = vec![bbox(5.0, 0.0, 10.0, 10.0), bbox(0.0, 0.0, 10.0, 10.0)];

        let cost = iou_distance(&IndexedSlice::new(&tracks), &IndexedSlice::new(&dets));

        assert_eq!(cost.shape(), (1, 2));
        assert!((cost[(0, 0)] - (1.0 - 50.0 / 150.0)).abs() < 1e-6);
        assert_eq!(cost[(0, 1)], 0.0);
    }
}
