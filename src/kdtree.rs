use crate::index::{Nearest, SpatialIndex};
use crate::point::{equals, less_on_axis, within_squared, Axis, Point3};
use tracing::debug;

#[derive(Clone, Debug)]
struct KdNode {
    value: Point3,
    // Points strictly below `value` on this node's axis.
    lower: Option<Box<KdNode>>,
    // Everything else, exact duplicates included.
    higher: Option<Box<KdNode>>,
}

impl KdNode {
    fn new(value: Point3) -> Self {
        KdNode {
            value,
            lower: None,
            higher: None,
        }
    }
}

/// A KD-tree storing one point per node.
///
/// The splitting axis cycles with depth (x, y, z, x, ...) and is never stored; every
/// operation recomputes it while descending from the root. Points are inserted where
/// the descent ends, so the shape depends on insertion order and there is no
/// rebalancing.
///
/// All traversals are recursive. Long runs of points that tie on the cycling axes
/// produce chains as deep as the number of points, which bounds the usable input size
/// by the stack.
#[derive(Clone, Debug, Default)]
pub struct KdTree {
    root: Option<Box<KdNode>>,
    len: usize,
}

impl KdTree {
    pub fn new() -> Self {
        KdTree { root: None, len: 0 }
    }

    /// Builds a tree by inserting `points` in order.
    pub fn from_points(points: &[Point3]) -> Self {
        let mut tree = Self::new();
        for p in points {
            tree.insert(*p);
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the tree, 0 when empty.
    pub fn depth(&self) -> usize {
        fn depth_recursive(node: &Option<Box<KdNode>>) -> usize {
            match node {
                Some(n) => 1 + depth_recursive(&n.lower).max(depth_recursive(&n.higher)),
                None => 0,
            }
        }
        depth_recursive(&self.root)
    }

    /// Iterates over the stored points in pre-order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stack: self.root.as_deref().into_iter().collect(),
        }
    }

    pub fn insert(&mut self, point: Point3) {
        Self::insert_recursive(&mut self.root, point, Axis::X);
        self.len += 1;
    }

    fn insert_recursive(slot: &mut Option<Box<KdNode>>, point: Point3, axis: Axis) {
        match slot {
            Some(node) => {
                let child = if less_on_axis(&point, &node.value, axis) {
                    &mut node.lower
                } else {
                    &mut node.higher
                };
                Self::insert_recursive(child, point, axis.next());
            }
            None => *slot = Some(Box::new(KdNode::new(point))),
        }
    }

    /// Follows the insertion path of `query` and returns the stored copy if present.
    ///
    /// Only one branch is probed per level. A duplicate is never less than the value
    /// it duplicates, so it always sits on the "higher" side of the path.
    pub fn find_exact(&self, query: &Point3) -> Option<&Point3> {
        let mut node = self.root.as_deref();
        let mut axis = Axis::X;

        while let Some(n) = node {
            if less_on_axis(query, &n.value, axis) {
                node = n.lower.as_deref();
            } else {
                if equals(query, &n.value) {
                    return Some(&n.value);
                }
                node = n.higher.as_deref();
            }
            axis = axis.next();
        }
        None
    }

    /// Returns the first stored point found within `eps` of `query`.
    ///
    /// The branch `query` would be inserted into is searched first; the other branch is
    /// only probed when the splitting plane itself lies within `eps`.
    pub fn find_within(&self, query: &Point3, eps: f64) -> Option<&Point3> {
        if eps.is_nan() || eps < 0.0 {
            return None;
        }
        let root = self.root.as_deref()?;
        Self::find_within_recursive(root, query, eps, eps * eps, Axis::X)
    }

    fn find_within_recursive<'a>(
        node: &'a KdNode,
        query: &Point3,
        eps: f64,
        eps_sq: f64,
        axis: Axis,
    ) -> Option<&'a Point3> {
        if within_squared(query, &node.value, eps_sq) {
            return Some(&node.value);
        }

        let (near, far) = if less_on_axis(query, &node.value, axis) {
            (&node.lower, &node.higher)
        } else {
            (&node.higher, &node.lower)
        };

        if let Some(child) = near {
            if let Some(hit) = Self::find_within_recursive(child, query, eps, eps_sq, axis.next()) {
                return Some(hit);
            }
        }

        let plane_dist = (query.coord(axis) - node.value.coord(axis)).abs();
        if plane_dist <= eps {
            if let Some(child) = far {
                return Self::find_within_recursive(child, query, eps, eps_sq, axis.next());
            }
        }
        None
    }

    /// Branch-and-bound nearest neighbor search.
    pub fn nearest(&self, query: &Point3) -> Option<Nearest> {
        let root = self.root.as_deref()?;
        let mut best = (&root.value, query.distance_sq(&root.value));
        Self::nearest_recursive(root, query, Axis::X, &mut best);

        Some(Nearest {
            point: *best.0,
            distance: query.distance(best.0),
        })
    }

    fn nearest_recursive<'a>(
        node: &'a KdNode,
        query: &Point3,
        axis: Axis,
        best: &mut (&'a Point3, f64),
    ) {
        let d2 = query.distance_sq(&node.value);
        if d2 < best.1 {
            *best = (&node.value, d2);
        }

        let diff = query.coord(axis) - node.value.coord(axis);
        let (near, far) = if diff < 0.0 {
            (&node.lower, &node.higher)
        } else {
            (&node.higher, &node.lower)
        };

        if let Some(child) = near {
            Self::nearest_recursive(child, query, axis.next(), best);
        }

        // The far side can only hold something closer if the splitting plane does.
        if diff * diff < best.1 {
            if let Some(child) = far {
                Self::nearest_recursive(child, query, axis.next(), best);
            }
        }
    }

    /// Logs the tree structure at debug level, one line per node.
    pub fn dump(&self) {
        fn dump_recursive(node: &KdNode, depth: usize, side: &str) {
            let indent = depth * 2;
            let p = &node.value;
            debug!(
                "{:indent$}{side} {:?} ({}, {}, {})",
                "",
                Axis::from_depth(depth),
                p.x,
                p.y,
                p.z
            );
            if let Some(child) = &node.lower {
                dump_recursive(child, depth + 1, "lower");
            }
            if let Some(child) = &node.higher {
                dump_recursive(child, depth + 1, "higher");
            }
        }

        debug!("kdtree: {} points, depth {}", self.len, self.depth());
        if let Some(root) = &self.root {
            dump_recursive(root, 0, "root");
        }
    }
}

impl SpatialIndex for KdTree {
    fn insert(&mut self, point: Point3) {
        KdTree::insert(self, point);
    }

    fn find_exact(&self, query: &Point3) -> Option<&Point3> {
        KdTree::find_exact(self, query)
    }

    fn find_within(&self, query: &Point3, eps: f64) -> Option<&Point3> {
        KdTree::find_within(self, query, eps)
    }

    fn nearest(&self, query: &Point3) -> Option<Nearest> {
        KdTree::nearest(self, query)
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Pre-order iterator over the points of a [`KdTree`].
pub struct Iter<'a> {
    stack: Vec<&'a KdNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Point3;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let Some(child) = node.higher.as_deref() {
            self.stack.push(child);
        }
        if let Some(child) = node.lower.as_deref() {
            self.stack.push(child);
        }
        Some(&node.value)
    }
}
