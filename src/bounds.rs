use crate::point::{Axis, Point3};

/// Axis-aligned bounding box in 3D space.
///
/// An empty box has `min = +inf` and `max = -inf`, so the first `extend` snaps it
/// onto that point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Point3>,
    {
        let mut bounds = Self::empty();
        for p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    /// Grows the box so that it contains `p`.
    pub fn extend(&mut self, p: &Point3) {
        let c = [p.x, p.y, p.z];
        for i in 0..3 {
            if c[i] < self.min[i] { self.min[i] = c[i]; }
            if c[i] > self.max[i] { self.max[i] = c[i]; }
        }
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut min = self.min;
        let mut max = self.max;
        for i in 0..3 {
            min[i] = min[i].min(other.min[i]);
            max[i] = max[i].max(other.max[i]);
        }
        BoundingBox { min, max }
    }

    pub fn contains(&self, p: &Point3) -> bool {
        p.x >= self.min[0] && p.x <= self.max[0] &&
        p.y >= self.min[1] && p.y <= self.max[1] &&
        p.z >= self.min[2] && p.z <= self.max[2]
    }

    pub fn extent(&self, axis: Axis) -> f64 {
        self.max[axis.index()] - self.min[axis.index()]
    }

    /// The axis with the largest extent.
    ///
    /// Ties resolve x over y over z: x competes with y first and the winner then
    /// competes with z.
    pub fn largest_axis(&self) -> Axis {
        let xy = if self.extent(Axis::X) >= self.extent(Axis::Y) { Axis::X } else { Axis::Y };
        if self.extent(xy) >= self.extent(Axis::Z) { xy } else { Axis::Z }
    }

    /// Squared distance from `p` to the closest point of the box, zero inside.
    pub fn distance_sq(&self, p: &Point3) -> f64 {
        let dx = (self.min[0] - p.x).max(0.0).max(p.x - self.max[0]);
        let dy = (self.min[1] - p.y).max(0.0).max(p.y - self.max[1]);
        let dz = (self.min[2] - p.z).max(0.0).max(p.z - self.max[2]);
        dx * dx + dy * dy + dz * dz
    }

    /// `true` if the sphere around `center` with squared radius `radius_sq` touches the box.
    pub fn intersects_sphere(&self, center: &Point3, radius_sq: f64) -> bool {
        self.distance_sq(center) <= radius_sq
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}
