use std::ops::ControlFlow;

use super::node::{IndexNode, NodeKind};
use crate::error::{XpsdError, XpsdResult};
use crate::format::{RawNodeKind, RawTree, MAX_CHILDREN};
use crate::search::SearchCriteria;
use crate::sphere::{Gnomonic, SphericalCap};

/// Slack added to the pruning test, in degrees (about 3.6 mas).
///
/// Covers rounding in the cap radius and in the tangent-plane round trip, so
/// that a record sitting exactly on a leaf boundary is never pruned away.
pub const PRUNE_TOLERANCE_DEG: f64 = 1e-6;

/// One spatial index tree: a gnomonic projection plus its node array.
#[derive(Debug, Clone)]
pub struct IndexTree {
    projection: Gnomonic,
    nodes: Vec<IndexNode>,
}

impl IndexTree {
    /// Validate a tree read from disk and precompute node bounding caps.
    ///
    /// `index` is the tree's position in the forest, used in error messages.
    pub(crate) fn from_raw(index: usize, raw: RawTree) -> XpsdResult<Self> {
        if !raw.center_ra.is_finite()
            || !raw.center_dec.is_finite()
            || !(-90.0..=90.0).contains(&raw.center_dec)
        {
            return Err(XpsdError::corrupt_index(
                index,
                0,
                format!(
                    "invalid tangent point ({}, {})",
                    raw.center_ra, raw.center_dec
                ),
            ));
        }
        if raw.nodes.is_empty() {
            return Err(XpsdError::corrupt_index(index, 0, "tree has no nodes"));
        }

        let len = raw.nodes.len();
        let mut referenced = vec![false; len];

        for (i, node) in raw.nodes.iter().enumerate() {
            let finite = [node.x0, node.y0, node.x1, node.y1]
                .iter()
                .all(|v| v.is_finite());
            if !finite || node.x0 > node.x1 || node.y0 > node.y1 {
                return Err(XpsdError::corrupt_index(
                    index,
                    i,
                    format!(
                        "invalid rectangle [{}, {}) x [{}, {})",
                        node.x0, node.x1, node.y0, node.y1
                    ),
                ));
            }

            if let RawNodeKind::Internal { children, count } = node.kind {
                let count = count as usize;
                if count == 0 || count > MAX_CHILDREN {
                    return Err(XpsdError::corrupt_index(
                        index,
                        i,
                        format!("internal node has {} children", count),
                    ));
                }
                for &child in &children[..count] {
                    let child = child as usize;
                    if child <= i || child >= len {
                        return Err(XpsdError::corrupt_index(
                            index,
                            i,
                            format!("child index {} out of range", child),
                        ));
                    }
                    if referenced[child] {
                        return Err(XpsdError::corrupt_index(
                            index,
                            i,
                            format!("node {} has more than one parent", child),
                        ));
                    }
                    referenced[child] = true;
                }
            }
        }

        if let Some(orphan) = referenced.iter().skip(1).position(|&r| !r) {
            return Err(XpsdError::corrupt_index(
                index,
                orphan + 1,
                "node is not reachable from the root",
            ));
        }

        let projection = Gnomonic::new(raw.center_ra, raw.center_dec);
        let nodes = raw
            .nodes
            .iter()
            .map(|node| {
                let cap = SphericalCap::enclosing_rect(&projection, node.x0, node.y0, node.x1, node.y1);
                IndexNode::from_raw(node, cap)
            })
            .collect();

        Ok(Self { projection, nodes })
    }

    /// Tangent point `(ra0, dec0)` in degrees.
    pub fn center(&self) -> (f64, f64) {
        self.projection.center()
    }

    pub fn projection(&self) -> &Gnomonic {
        &self.projection
    }

    pub fn root(&self) -> &IndexNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: usize) -> Option<&IndexNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[IndexNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Number of records stored under this tree, given the record width.
    pub fn record_count(&self, record_size: usize) -> u64 {
        self.nodes
            .iter()
            .filter_map(|n| n.leaf())
            .map(|leaf| leaf.uncompressed_size as u64 / record_size.max(1) as u64)
            .sum()
    }

    /// Gnomonic projection of `(ra, dec)` onto this tree's plane.
    pub fn project(&self, ra_deg: f64, dec_deg: f64) -> Option<(f64, f64)> {
        self.projection.project(ra_deg, dec_deg)
    }

    /// Inverse projection of plane coordinates to `(ra, dec)`, RA in `[0, 360)`.
    pub fn unproject(&self, x_deg: f64, y_deg: f64) -> (f64, f64) {
        self.projection.unproject(x_deg, y_deg)
    }

    /// Depth-first traversal of every leaf that may intersect the query
    /// circle, in node order.
    ///
    /// A node is descended into only if its bounding cap passes the
    /// conservative intersection test. The visitor receives the leaf's node
    /// index and may stop the traversal by returning `ControlFlow::Break`.
    pub fn search<B, F>(&self, criteria: &SearchCriteria, mut visitor: F) -> ControlFlow<B>
    where
        F: FnMut(usize, &IndexNode) -> ControlFlow<B>,
    {
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.cap.may_intersect(
                criteria.center_ra,
                criteria.center_dec,
                criteria.radius,
                PRUNE_TOLERANCE_DEG,
            ) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(_) => visitor(index, node)?,
                NodeKind::Internal { .. } => {
                    stack.extend(node.children().iter().rev().map(|&c| c as usize));
                }
            }
        }
        ControlFlow::Continue(())
    }
}
