use crate::error::KdError;
use crate::point::Point3;
use rayon::prelude::*;

/// Result of a nearest-neighbor query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Nearest {
    /// The stored point closest to the query.
    pub point: Point3,
    /// Euclidean distance from the query to `point`.
    pub distance: f64,
}

/// Trait defining a dynamic 3D point index.
/// This allows swapping between the per-point `KdTree` and the `BucketedKdTree`.
///
/// Queries take `&self` and never mutate, so a filled index can be shared across threads.
/// Insertion needs `&mut self`; interleaving inserts with queries must be serialized by the caller.
pub trait SpatialIndex: Send + Sync {
    /// Add a point. Duplicates are stored again, nothing is ever removed.
    fn insert(&mut self, point: Point3);

    /// Look up a stored point with exactly the coordinates of `query`.
    fn find_exact(&self, query: &Point3) -> Option<&Point3>;

    /// Find some stored point within distance `eps` of `query`.
    ///
    /// The first match found is returned, which is not necessarily the closest.
    fn find_within(&self, query: &Point3, eps: f64) -> Option<&Point3>;

    /// Find the stored point closest to `query`.
    fn nearest(&self, query: &Point3) -> Option<Nearest>;

    /// Number of stored points, duplicates included.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `point` only if all of its coordinates are finite.
    ///
    /// The plain `insert` accepts anything; NaN or infinite coordinates break the
    /// ordering the trees rely on, so this is the entry point for untrusted input.
    fn try_insert(&mut self, point: Point3) -> Result<(), KdError> {
        if !point.is_finite() {
            return Err(KdError::NonFiniteCoordinate { point });
        }
        self.insert(point);
        Ok(())
    }

    /// Insert every point of `points` in order.
    fn extend<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = Point3>,
        Self: Sized,
    {
        for p in points {
            self.insert(p);
        }
    }

    /// Run `nearest` for every query in parallel.
    fn nearest_many(&self, queries: &[Point3]) -> Vec<Option<Nearest>>
    where
        Self: Sized,
    {
        queries.par_iter().map(|q| self.nearest(q)).collect()
    }
}
