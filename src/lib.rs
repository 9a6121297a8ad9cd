//! # kdthree
//!
//! `kdthree` is a Rust library of dynamic 3D KD-trees, designed to be used in Rust
//! as well as compiled to WebAssembly (WASM). It indexes points for exact lookups,
//! "close enough" lookups and nearest-neighbor queries, e.g. to weld coincident
//! vertices while building a mesh.
//!
//! ## Features
//!
//! - **Two variants, one contract**: [`KdTree`] stores one point per node with the
//!   axis cycling by depth; [`BucketedKdTree`] batches points in leaves with bounding
//!   boxes and splits lazily along the widest axis. Both implement [`SpatialIndex`].
//! - **Dynamic**: points are inserted one at a time, no rebuild needed. There is no
//!   removal and no rebalancing.
//! - **Parallel batch queries**: [`SpatialIndex::nearest_many`] spreads queries over
//!   `rayon` threads.
//! - **WASM-first**: [`PointIndex`] wraps the bucketed tree for JavaScript and TypeScript.
//!
//! ## Example
//!
//! ```
//! use kdthree::{BucketedKdTree, Point3, SpatialIndex};
//!
//! let mut tree = BucketedKdTree::new();
//! tree.insert(Point3::new(0.0, 0.0, 0.0));
//! tree.insert(Point3::new(10.0, 0.0, 0.0));
//!
//! let n = tree.nearest(&Point3::new(1.0, 1.0, 1.0)).unwrap();
//! assert_eq!(n.point, Point3::new(0.0, 0.0, 0.0));
//! assert!(tree.find_within(&Point3::new(9.0, 0.0, 0.0), 2.0).is_some());
//! ```
//!
//! ## Limitations
//!
//! Coordinates must be finite; [`SpatialIndex::try_insert`] rejects anything else.
//! Traversals are recursive, so pathological inputs that degenerate a tree into a
//! chain are bounded by the stack.

mod bounds;
mod bucketed;
mod error;
mod index;
mod kdtree;
mod point;
mod wasm;

pub use bounds::BoundingBox;
pub use bucketed::BucketedKdTree;
pub use bucketed::DEFAULT_LEAF_CAPACITY;
pub use bucketed::Iter as BucketedIter;
pub use error::KdError;
pub use index::Nearest;
pub use index::SpatialIndex;
pub use kdtree::Iter as KdTreeIter;
pub use kdtree::KdTree;
pub use point::Axis;
pub use point::Comparator;
pub use point::Point3;
pub use point::equals;
pub use point::full_order;
pub use point::less_on_axis;
pub use point::random_points;
pub use point::within_squared;
pub use wasm::BoundingBox3D;
pub use wasm::PointIndex;
