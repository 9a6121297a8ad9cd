use crate::bounds::BoundingBox;
use crate::error::KdError;
use crate::index::{Nearest, SpatialIndex};
use crate::point::{equals, within_squared, Comparator, Point3};
use tracing::{debug, trace, warn};

/// Leaf capacity used by [`BucketedKdTree::new`].
pub const DEFAULT_LEAF_CAPACITY: usize = 128;

#[derive(Clone, Debug)]
enum Node {
    Leaf {
        points: Vec<Point3>,
        bounds: BoundingBox,
    },
    Internal {
        comparator: Comparator,
        // Also stored as the first point of the `higher` leaf created by the split.
        median: Point3,
        lower: Box<Node>,
        higher: Box<Node>,
        bounds: BoundingBox,
    },
}

impl Node {
    fn leaf(points: Vec<Point3>) -> Node {
        let bounds = BoundingBox::from_points(&points);
        Node::Leaf { points, bounds }
    }

    fn bounds(&self) -> &BoundingBox {
        match self {
            Node::Leaf { bounds, .. } | Node::Internal { bounds, .. } => bounds,
        }
    }
}

/// A KD-tree whose leaves hold batches of points.
///
/// Leaves collect up to `capacity` points together with their bounding box. When an
/// insertion pushes a leaf over capacity it is split at the median of its widest axis
/// and replaced by an internal node. Internal nodes keep the comparator and median
/// used for the split plus the union of their children's boxes, which lets queries
/// skip whole subtrees by distance.
///
/// Boxes only ever grow. There is no removal, so they never need to be recomputed.
#[derive(Clone, Debug)]
pub struct BucketedKdTree {
    root: Node,
    capacity: usize,
    len: usize,
}

impl BucketedKdTree {
    /// Creates an empty tree with [`DEFAULT_LEAF_CAPACITY`].
    pub fn new() -> Self {
        BucketedKdTree {
            root: Node::leaf(Vec::new()),
            capacity: DEFAULT_LEAF_CAPACITY,
            len: 0,
        }
    }

    /// Creates an empty tree whose leaves split once they exceed `capacity` points.
    pub fn with_capacity(capacity: usize) -> Result<Self, KdError> {
        if capacity == 0 {
            return Err(KdError::InvalidCapacity(capacity));
        }
        Ok(BucketedKdTree {
            root: Node::leaf(Vec::new()),
            capacity,
            len: 0,
        })
    }

    /// Builds a tree from a known set of points.
    ///
    /// The whole set becomes the root batch with its bounding box computed in one
    /// pass, then leaves are split until each fits `capacity`.
    pub fn from_points(points: Vec<Point3>, capacity: usize) -> Result<Self, KdError> {
        if capacity == 0 {
            return Err(KdError::InvalidCapacity(capacity));
        }
        let len = points.len();
        let mut root = Node::leaf(points);
        Self::split_to_fit(&mut root, capacity);

        Ok(BucketedKdTree { root, capacity, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The accumulated extent of all inserted points, `None` when empty.
    pub fn bounds(&self) -> Option<BoundingBox> {
        if self.is_empty() {
            None
        } else {
            Some(*self.root.bounds())
        }
    }

    /// Height of the tree; a lone root leaf has depth 1.
    pub fn depth(&self) -> usize {
        fn depth_recursive(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Internal { lower, higher, .. } => {
                    1 + depth_recursive(lower).max(depth_recursive(higher))
                }
            }
        }
        depth_recursive(&self.root)
    }

    pub fn leaf_count(&self) -> usize {
        fn count_recursive(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Internal { lower, higher, .. } => count_recursive(lower) + count_recursive(higher),
            }
        }
        count_recursive(&self.root)
    }

    /// Iterates over the stored points leaf by leaf.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stack: vec![&self.root],
            current: Default::default(),
        }
    }

    pub fn insert(&mut self, point: Point3) {
        Self::insert_recursive(&mut self.root, point, self.capacity);
        self.len += 1;
    }

    fn insert_recursive(node: &mut Node, point: Point3, capacity: usize) {
        let overflow = match node {
            Node::Internal { comparator, median, lower, higher, bounds } => {
                bounds.extend(&point);
                let child = if comparator.less(&point, median) { lower } else { higher };
                Self::insert_recursive(child, point, capacity);
                false
            }
            Node::Leaf { points, bounds } => {
                bounds.extend(&point);
                points.push(point);
                points.len() > capacity
            }
        };

        if overflow {
            if let Err(e) = Self::split(node) {
                // The leaf stays oversized and is scanned linearly.
                debug!("leaf kept over capacity {}: {}", capacity, e);
            }
        }
    }

    fn split_to_fit(node: &mut Node, capacity: usize) {
        if let Node::Leaf { points, .. } = node {
            if points.len() <= capacity {
                return;
            }
            if let Err(e) = Self::split(node) {
                warn!("bulk build kept an oversized leaf: {}", e);
                return;
            }
        }
        if let Node::Internal { lower, higher, .. } = node {
            Self::split_to_fit(lower, capacity);
            Self::split_to_fit(higher, capacity);
        }
    }

    /// Replaces a leaf by an internal node with two leaves.
    ///
    /// The batch is sorted along the axis of largest extent and cut at `len / 2`. If
    /// the point before the cut ties with the median on that axis, the batch is
    /// re-sorted with the full lexicographic order and the cut moves to the nearest
    /// position with a strict step, so that every point in the lower half compares
    /// less than the median. A batch of identical points has no such position and is
    /// left unsplit.
    fn split(node: &mut Node) -> Result<(), KdError> {
        let Node::Leaf { points, bounds } = node else {
            return Ok(());
        };
        let len = points.len();
        if len < 2 {
            return Err(KdError::DegenerateSplit { len });
        }

        // A box collapsed to one point holds copies of a single point, nothing to cut.
        if bounds.min == bounds.max {
            return Err(KdError::DegenerateSplit { len });
        }

        let axis = bounds.largest_axis();
        if bounds.extent(axis).is_nan() || points.iter().any(Point3::has_nan) {
            warn!("NaN coordinates in a leaf of {} points, split along {:?} is unreliable", len, axis);
        }

        let mut comparator = Comparator::Axis(axis);
        points.sort_by(|a, b| comparator.compare(a, b));
        let mut mid = len / 2;

        if !comparator.less(&points[mid - 1], &points[mid]) {
            comparator = Comparator::Ordered(axis);
            points.sort_by(|a, b| comparator.compare(a, b));
            mid = strict_boundary(points, comparator, mid)
                .ok_or(KdError::DegenerateSplit { len })?;
        }

        let higher = points.split_off(mid);
        let lower = std::mem::take(points);
        let median = higher[0];
        trace!("split {} points along {:?} at {:?} ({} / {})", len, axis, median, lower.len(), higher.len());

        let lower = Node::leaf(lower);
        let higher = Node::leaf(higher);
        let bounds = lower.bounds().union(higher.bounds());

        *node = Node::Internal {
            comparator,
            median,
            lower: Box::new(lower),
            higher: Box::new(higher),
            bounds,
        };
        Ok(())
    }

    /// The leaf `query` would be inserted into.
    fn natural_leaf(&self, query: &Point3) -> &[Point3] {
        let mut node = &self.root;
        loop {
            match node {
                Node::Internal { comparator, median, lower, higher, .. } => {
                    node = if comparator.less(query, median) { &**lower } else { &**higher };
                }
                Node::Leaf { points, .. } => return points,
            }
        }
    }

    pub fn find_exact(&self, query: &Point3) -> Option<&Point3> {
        self.natural_leaf(query).iter().find(|p| equals(p, query))
    }

    /// Returns the first stored point found within `eps` of `query`.
    ///
    /// The leaf on the insertion path of `query` is scanned first. Only if that misses
    /// and `eps > 0` does the search widen to every subtree whose box touches the
    /// sphere of radius `eps`.
    pub fn find_within(&self, query: &Point3, eps: f64) -> Option<&Point3> {
        if eps.is_nan() || eps < 0.0 || self.is_empty() {
            return None;
        }
        let eps_sq = eps * eps;

        let hit = self.natural_leaf(query).iter().find(|p| within_squared(query, p, eps_sq));
        if hit.is_some() {
            return hit;
        }
        if eps > 0.0 {
            Self::find_within_recursive(&self.root, query, eps_sq)
        } else {
            None
        }
    }

    fn find_within_recursive<'a>(node: &'a Node, query: &Point3, eps_sq: f64) -> Option<&'a Point3> {
        if !node.bounds().intersects_sphere(query, eps_sq) {
            return None;
        }
        match node {
            Node::Leaf { points, .. } => points.iter().find(|p| within_squared(query, p, eps_sq)),
            Node::Internal { lower, higher, .. } => Self::find_within_recursive(lower, query, eps_sq)
                .or_else(|| Self::find_within_recursive(higher, query, eps_sq)),
        }
    }

    /// Nearest neighbor search.
    ///
    /// The leaf on the insertion path of `query` provides the initial bound, then a
    /// branch-and-bound pass from the root visits the natural child first and the
    /// other one only while its box is within the current best distance.
    pub fn nearest(&self, query: &Point3) -> Option<Nearest> {
        let mut best: Option<(&Point3, f64)> = None;
        for p in self.natural_leaf(query) {
            let d2 = query.distance_sq(p);
            if best.is_none_or(|(_, b)| d2 < b) {
                best = Some((p, d2));
            }
        }

        let mut best = best?;
        Self::nearest_recursive(&self.root, query, &mut best);

        Some(Nearest {
            point: *best.0,
            distance: query.distance(best.0),
        })
    }

    fn nearest_recursive<'a>(node: &'a Node, query: &Point3, best: &mut (&'a Point3, f64)) {
        match node {
            Node::Leaf { points, .. } => {
                for p in points {
                    let d2 = query.distance_sq(p);
                    if d2 < best.1 {
                        *best = (p, d2);
                    }
                }
            }
            Node::Internal { comparator, median, lower, higher, .. } => {
                let (near, far) = if comparator.less(query, median) {
                    (lower, higher)
                } else {
                    (higher, lower)
                };
                Self::nearest_recursive(near, query, best);
                if far.bounds().intersects_sphere(query, best.1) {
                    Self::nearest_recursive(far, query, best);
                }
            }
        }
    }

    /// Verifies that every node's box contains all points beneath it.
    pub fn check_bounds(&self) -> bool {
        fn check_recursive(node: &Node) -> bool {
            match node {
                Node::Leaf { points, bounds } => points.iter().all(|p| bounds.contains(p)),
                Node::Internal { lower, higher, bounds, median, .. } => {
                    bounds.contains(median)
                        && bounds.union(lower.bounds()) == *bounds
                        && bounds.union(higher.bounds()) == *bounds
                        && check_recursive(lower)
                        && check_recursive(higher)
                }
            }
        }
        self.is_empty() || check_recursive(&self.root)
    }

    /// Logs the box and point structure of the tree at debug level.
    pub fn dump(&self) {
        fn dump_recursive(node: &Node, depth: usize) {
            let indent = depth * 2;
            match node {
                Node::Leaf { points, bounds } => {
                    debug!("{:indent$}leaf {} points, min {:?} max {:?}", "", points.len(), bounds.min, bounds.max);
                    for p in points {
                        debug!("{:indent$}  ({}, {}, {})", "", p.x, p.y, p.z);
                    }
                }
                Node::Internal { comparator, median, lower, higher, bounds } => {
                    debug!(
                        "{:indent$}split {:?} at ({}, {}, {}), min {:?} max {:?}",
                        "", comparator, median.x, median.y, median.z, bounds.min, bounds.max
                    );
                    dump_recursive(lower, depth + 1);
                    dump_recursive(higher, depth + 1);
                }
            }
        }

        debug!(
            "bucketed kdtree: {} points, capacity {}, {} leaves, depth {}",
            self.len,
            self.capacity,
            self.leaf_count(),
            self.depth()
        );
        dump_recursive(&self.root, 0);
    }
}

impl Default for BucketedKdTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex for BucketedKdTree {
    fn insert(&mut self, point: Point3) {
        BucketedKdTree::insert(self, point);
    }

    fn find_exact(&self, query: &Point3) -> Option<&Point3> {
        BucketedKdTree::find_exact(self, query)
    }

    fn find_within(&self, query: &Point3, eps: f64) -> Option<&Point3> {
        BucketedKdTree::find_within(self, query, eps)
    }

    fn nearest(&self, query: &Point3) -> Option<Nearest> {
        BucketedKdTree::nearest(self, query)
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Index of the cut closest to `mid` where the point before it is strictly less.
fn strict_boundary(points: &[Point3], comparator: Comparator, mid: usize) -> Option<usize> {
    let is_step = |i: usize| comparator.less(&points[i - 1], &points[i]);
    for offset in 0..points.len() {
        if mid + offset < points.len() && is_step(mid + offset) {
            return Some(mid + offset);
        }
        if offset < mid && is_step(mid - offset) {
            return Some(mid - offset);
        }
    }
    None
}

/// Iterator over the points of a [`BucketedKdTree`].
pub struct Iter<'a> {
    stack: Vec<&'a Node>,
    current: std::slice::Iter<'a, Point3>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Point3;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(p) = self.current.next() {
                return Some(p);
            }
            match self.stack.pop()? {
                Node::Leaf { points, .. } => self.current = points.iter(),
                Node::Internal { lower, higher, .. } => {
                    self.stack.push(higher);
                    self.stack.push(lower);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Axis;
    use std::sync::{Arc, Mutex};

    fn line(n: usize) -> Vec<Point3> {
        (0..n).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(BucketedKdTree::with_capacity(0).unwrap_err(), KdError::InvalidCapacity(0));
        assert!(BucketedKdTree::from_points(line(4), 0).is_err());
    }

    #[test]
    fn test_huge_capacity_allocates_lazily() {
        let mut tree = BucketedKdTree::with_capacity(1usize << 40).unwrap();
        assert_eq!(tree.capacity(), 1usize << 40);
        tree.insert(Point3::new(1.0, 2.0, 3.0));
        assert_eq!(tree.leaf_count(), 1);

        let tree = BucketedKdTree::with_capacity(usize::MAX).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_split_on_overflow() {
        let mut tree = BucketedKdTree::with_capacity(4).unwrap();
        for p in line(4) {
            tree.insert(p);
        }
        assert_eq!(tree.leaf_count(), 1);

        tree.insert(Point3::new(4.0, 0.0, 0.0));
        assert_eq!(tree.leaf_count(), 2);

        match &tree.root {
            Node::Internal { comparator, median, lower, higher, .. } => {
                assert_eq!(*comparator, Comparator::Axis(Axis::X));
                // 5 points, cut at index 2.
                assert_eq!(*median, Point3::new(2.0, 0.0, 0.0));
                match (lower.as_ref(), higher.as_ref()) {
                    (Node::Leaf { points: lo, .. }, Node::Leaf { points: hi, .. }) => {
                        assert_eq!(lo.len(), 2);
                        assert_eq!(hi.len(), 3);
                        assert!(hi.contains(median));
                    }
                    _ => panic!("expected two leaves"),
                }
            }
            Node::Leaf { .. } => panic!("expected root to split"),
        }
        assert!(tree.check_bounds());
    }

    #[test]
    fn test_split_picks_widest_axis() {
        let points: Vec<Point3> = (0..5).map(|i| Point3::new(0.0, 0.0, i as f64 * 2.0)).collect();
        let tree = BucketedKdTree::from_points(points, 4).unwrap();
        match &tree.root {
            Node::Internal { comparator, .. } => assert_eq!(comparator.axis(), Axis::Z),
            Node::Leaf { .. } => panic!("expected a split"),
        }
    }

    #[test]
    fn test_duplicate_median_switches_to_full_order() {
        // x has the largest extent, but the middle three share x = 1.
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 3.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
        ];
        let tree = BucketedKdTree::from_points(points.clone(), 4).unwrap();
        match &tree.root {
            Node::Internal { comparator, median, .. } => {
                assert_eq!(*comparator, Comparator::Ordered(Axis::X));
                assert_eq!(*median, Point3::new(1.0, 2.0, 0.0));
            }
            Node::Leaf { .. } => panic!("expected a split"),
        }
        for p in &points {
            assert_eq!(tree.find_exact(p), Some(p));
        }
    }

    #[test]
    fn test_identical_points_stay_in_one_leaf() {
        let p = Point3::new(3.0, 3.0, 3.0);
        let mut tree = BucketedKdTree::with_capacity(2).unwrap();
        for _ in 0..10 {
            tree.insert(p);
        }
        assert_eq!(tree.len(), 10);
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.find_exact(&p), Some(&p));

        // A distinct point makes the batch splittable again.
        tree.insert(Point3::new(4.0, 3.0, 3.0));
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.find_exact(&p), Some(&p));
        assert!(tree.check_bounds());
    }

    #[test]
    fn test_point_sized_box_is_not_sorted() {
        // Out of order on purpose: a split attempt would have sorted them.
        let points = vec![
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
        ];
        let mut node = Node::Leaf {
            points: points.clone(),
            bounds: BoundingBox::new([0.0; 3], [0.0; 3]),
        };
        assert_eq!(BucketedKdTree::split(&mut node), Err(KdError::DegenerateSplit { len: 3 }));
        match &node {
            Node::Leaf { points: kept, .. } => assert_eq!(kept, &points),
            Node::Internal { .. } => panic!("expected the leaf to stay"),
        }
    }

    #[test]
    fn test_many_copies_of_one_point() {
        let p = Point3::new(-4.0, 0.5, 12.0);
        let mut tree = BucketedKdTree::new();
        for _ in 0..50_000 {
            tree.insert(p);
        }
        assert_eq!(tree.len(), 50_000);
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.find_exact(&p), Some(&p));
        assert_eq!(tree.nearest(&p).map(|n| n.distance), Some(0.0));
        assert!(tree.check_bounds());
    }

    #[test]
    fn test_strict_boundary_moves_off_duplicates() {
        let c = Comparator::Ordered(Axis::X);
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        assert_eq!(strict_boundary(&points, c, 2), Some(1));
        assert_eq!(strict_boundary(&points[1..], c, 2), None);
    }

    #[test]
    fn test_bounds_accessor() {
        let mut tree = BucketedKdTree::new();
        assert!(tree.bounds().is_none());

        tree.insert(Point3::new(1.0, -2.0, 3.0));
        tree.insert(Point3::new(-1.0, 2.0, 0.0));
        let b = tree.bounds().unwrap();
        assert_eq!(b.min, [-1.0, -2.0, 0.0]);
        assert_eq!(b.max, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_from_points_splits_to_capacity() {
        let tree = BucketedKdTree::from_points(line(100), 8).unwrap();
        assert_eq!(tree.len(), 100);
        assert_eq!(tree.iter().count(), 100);
        assert!(tree.leaf_count() >= 100 / 8);
        assert!(tree.check_bounds());

        fn max_leaf(node: &Node) -> usize {
            match node {
                Node::Leaf { points, .. } => points.len(),
                Node::Internal { lower, higher, .. } => max_leaf(lower).max(max_leaf(higher)),
            }
        }
        assert!(max_leaf(&tree.root) <= 8);
    }

    #[test]
    fn test_zero_threshold_is_exact_match() {
        let tree = BucketedKdTree::from_points(line(50), 4).unwrap();
        let q = Point3::new(17.0, 0.0, 0.0);
        assert_eq!(tree.find_within(&q, 0.0), Some(&q));
        assert!(tree.find_within(&Point3::new(17.5, 0.0, 0.0), 0.0).is_none());
        assert_eq!(tree.find_within(&Point3::new(17.5, 0.0, 0.0), 0.5).map(|p| p.y), Some(0.0));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_nan_split_warns_and_keeps_finite_points() {
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 2.0, 0.0);
        let tree = tracing::subscriber::with_default(subscriber, || {
            let mut tree = BucketedKdTree::with_capacity(2).unwrap();
            tree.insert(a);
            tree.insert(Point3::new(f64::NAN, 1.0, 0.0));
            tree.insert(b);
            tree.insert(Point3::new(3.0, f64::NAN, 1.0));
            tree
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"), "no warning in {:?}", output);
        assert!(output.contains("NaN coordinates"), "unexpected log {:?}", output);

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.iter().count(), 4);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.find_exact(&a), Some(&a));
        assert_eq!(tree.find_exact(&b), Some(&b));
        // Boxes never absorb NaN, so the leaves holding those points fail containment.
        assert!(!tree.check_bounds());
    }
}
