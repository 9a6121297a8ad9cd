use crate::bounds::BoundingBox;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::cmp::Ordering;

/// A point in 3D space.
///
/// This is a plain value type: the trees copy points in and hand out references to
/// their stored copies.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns the coordinate along `axis`.
    #[inline]
    pub fn coord(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Returns `true` if no coordinate is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn has_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
    }

    #[inline]
    pub fn distance_sq(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, other: &Point3) -> f64 {
        self.distance_sq(other).sqrt()
    }
}

impl From<[f64; 3]> for Point3 {
    fn from(p: [f64; 3]) -> Self {
        Self { x: p[0], y: p[1], z: p[2] }
    }
}

impl From<Point3> for [f64; 3] {
    fn from(p: Point3) -> Self {
        [p.x, p.y, p.z]
    }
}

/// One of the three coordinate axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// The splitting axis of a per-point tree node at `depth`.
    pub fn from_depth(depth: usize) -> Self {
        Self::ALL[depth % 3]
    }

    /// The following axis, wrapping from z back to x.
    pub fn next(self) -> Self {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::Z,
            Axis::Z => Axis::X,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Compares a single coordinate: `true` if `a` lies strictly below `b` on `axis`.
#[inline]
pub fn less_on_axis(a: &Point3, b: &Point3, axis: Axis) -> bool {
    a.coord(axis) < b.coord(axis)
}

/// Lexicographic comparison starting at `axis` and rotating through the remaining two.
///
/// For x this compares (x, y, z), for y (y, z, x) and for z (z, x, y). Two points
/// compare equal only if all three coordinates are equal, so the order is strict on
/// distinct points even when they share the leading coordinate.
pub fn full_order(a: &Point3, b: &Point3, axis: Axis) -> Ordering {
    let mut axis = axis;
    for _ in 0..3 {
        match cmp_coord(a.coord(axis), b.coord(axis)) {
            Ordering::Equal => {}
            ord => return ord,
        }
        axis = axis.next();
    }
    Ordering::Equal
}

// NaN sorts above every number so that sorting stays a total preorder.
fn cmp_coord(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

/// Exact coordinate equality.
#[inline]
pub fn equals(a: &Point3, b: &Point3) -> bool {
    a == b
}

/// `true` if `a` and `b` are no further apart than `sqrt(dist_sq)`.
#[inline]
pub fn within_squared(a: &Point3, b: &Point3, dist_sq: f64) -> bool {
    a.distance_sq(b) <= dist_sq
}

/// The comparator stored at an internal node of the bucketed tree.
///
/// `Axis` compares a single coordinate, `Ordered` is the full lexicographic tie-break
/// starting at that axis. Both sort points so that everything strictly below the
/// median goes to the lower child.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparator {
    Axis(Axis),
    Ordered(Axis),
}

impl Comparator {
    pub fn axis(self) -> Axis {
        match self {
            Comparator::Axis(axis) | Comparator::Ordered(axis) => axis,
        }
    }

    pub fn compare(self, a: &Point3, b: &Point3) -> Ordering {
        match self {
            Comparator::Axis(axis) => cmp_coord(a.coord(axis), b.coord(axis)),
            Comparator::Ordered(axis) => full_order(a, b, axis),
        }
    }

    #[inline]
    pub fn less(self, a: &Point3, b: &Point3) -> bool {
        match self {
            Comparator::Axis(axis) => less_on_axis(a, b, axis),
            Comparator::Ordered(axis) => full_order(a, b, axis) == Ordering::Less,
        }
    }
}

/// Samples `count` points uniformly inside `bounds`.
///
/// A fixed `seed` gives a reproducible set, which the tests and benches rely on.
pub fn random_points(count: usize, bounds: &BoundingBox, seed: u64) -> Vec<Point3> {
    let mut rng = StdRng::seed_from_u64(seed);
    let w = bounds.max[0] - bounds.min[0];
    let h = bounds.max[1] - bounds.min[1];
    let d = bounds.max[2] - bounds.min[2];

    (0..count)
        .map(|_| {
            Point3::new(
                bounds.min[0] + rng.r#gen::<f64>() * w,
                bounds.min[1] + rng.r#gen::<f64>() * h,
                bounds.min[2] + rng.r#gen::<f64>() * d,
            )
        })
        .collect()
}
