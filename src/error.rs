//! Error types for index construction and validated insertion.

use crate::point::Point3;
use thiserror::Error;

/// Errors reported by the fallible entry points of the trees.
///
/// Queries never fail; they return `None` when nothing matches.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KdError {
    /// A coordinate is NaN or infinite.
    #[error("non-finite coordinate in point ({}, {}, {})", .point.x, .point.y, .point.z)]
    NonFiniteCoordinate {
        /// The rejected point.
        point: Point3,
    },

    /// Leaf capacity must hold at least one point.
    #[error("invalid leaf capacity {0}, expected at least 1")]
    InvalidCapacity(usize),

    /// Every point in a batch is identical, so no split point exists.
    #[error("cannot split a batch of {len} identical points")]
    DegenerateSplit {
        /// Number of points in the batch.
        len: usize,
    },
}
