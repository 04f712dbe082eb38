//! Spatial index: a forest of quadtrees, each over its own gnomonic tangent
//! plane.
//!
//! Every [`IndexTree`] owns a tangent point and a flat node array with the
//! root at index 0. Node rectangles are half-open in plane degrees, and a
//! spherical cap enclosing each rectangle is computed once at open time so
//! that pruning never has to project the query circle into the plane.

mod node;
mod tree;

pub use node::{IndexNode, LeafRef, NodeKind};
pub use tree::{IndexTree, PRUNE_TOLERANCE_DEG};
