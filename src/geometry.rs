//! Geometric primitives: intervals and the 4-D boxes rules occupy.
//!
//! A closed interval type specialized to the single `dim_t` width the
//! compiler works in, extended with the `cut` / `unequal_cut` /
//! `collide` operations the HiCuts builder needs.

/// 32-bit unsigned classification value: a port or an IPv4 address.
pub type DimT = u32;

/// Canonical dimension order fixed by the rule geometry.
pub const NUM_DIMS: usize = 4;

/// Closed, inclusive interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub low: DimT,
    pub high: DimT,
}

impl Interval {
    pub fn new(low: DimT, high: DimT) -> Self {
        debug_assert!(low <= high);
        Self { low, high }
    }

    pub fn exact(val: DimT) -> Self {
        Self { low: val, high: val }
    }

    pub fn full() -> Self {
        Self { low: 0, high: DimT::MAX }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.low <= other.high && other.low <= self.high
    }

    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let low = self.low.max(other.low);
        let high = self.high.min(other.high);
        if low <= high {
            Some(Interval::new(low, high))
        } else {
            None
        }
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.low <= other.low && other.high <= self.high
    }

    pub fn width(&self) -> DimT {
        self.high - self.low
    }
}

/// The hyper-rectangle formed by a rule's four ranges, in the fixed
/// order 0 = source port, 1 = destination port, 2 = source address,
/// 3 = destination address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rect {
    dims: [Interval; NUM_DIMS],
}

impl Rect {
    pub fn new(dims: [Interval; NUM_DIMS]) -> Self {
        Self { dims }
    }

    pub fn get(&self, dim: usize) -> Interval {
        self.dims[dim]
    }

    pub fn with_dim(&self, dim: usize, interval: Interval) -> Rect {
        let mut dims = self.dims;
        dims[dim] = interval;
        Rect::new(dims)
    }

    /// Two rects collide iff they overlap in every dimension.
    pub fn collide(&self, other: &Rect) -> bool {
        (0..NUM_DIMS).all(|d| self.dims[d].overlaps(&other.dims[d]))
    }

    /// Partition this rect's interval in `dim` into `num_cuts + 1` equal
    /// pieces. The first `num_cuts` pieces have length
    /// `floor((high - low) / (num_cuts + 1))`; the last piece absorbs the
    /// remainder.
    pub fn cut(&self, dim: usize, num_cuts: usize) -> Vec<Rect> {
        let Interval { low: start, high: end } = self.dims[dim];
        let piece_len = (end - start) / (num_cuts as DimT + 1);

        let mut pieces = Vec::with_capacity(num_cuts + 1);
        let mut current_start = start;
        for _ in 0..num_cuts {
            let current_end = current_start + piece_len;
            pieces.push(self.with_dim(dim, Interval::new(current_start, current_end)));
            current_start = current_end + 1;
        }
        pieces.push(self.with_dim(dim, Interval::new(current_start, end)));
        pieces
    }

    /// Partition this rect's interval in `dim` at the given strictly
    /// increasing interior cut points: `[a, p0], [p0+1, p1], ...,
    /// [p_{k-1}+1, b]`, omitting the trailing piece if `p_{k-1} == b`.
    /// Produces no pieces at all if fewer than two cut points are given.
    pub fn unequal_cut(&self, dim: usize, cut_points: &[DimT]) -> Vec<Rect> {
        if cut_points.len() < 2 {
            return Vec::new();
        }
        let Interval { low: box_start, high: box_end } = self.dims[dim];
        let mut pieces = Vec::with_capacity(cut_points.len() + 1);
        let mut start = box_start;
        let mut last_end = box_start;
        for &end in cut_points {
            pieces.push(self.with_dim(dim, Interval::new(start, end)));
            start = end + 1;
            last_end = end;
        }
        if last_end < box_end {
            pieces.push(self.with_dim(dim, Interval::new(start, box_end)));
        }
        pieces
    }
}
