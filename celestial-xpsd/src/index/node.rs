use crate::format::{RawNode, RawNodeKind, MAX_CHILDREN};
use crate::sphere::SphericalCap;

/// Location of a leaf's record block inside the catalog file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafRef {
    /// Absolute file offset of the block.
    pub offset: u64,
    /// Bytes stored on disk.
    pub compressed_size: u32,
    /// Bytes after decompression; a multiple of the record size.
    pub uncompressed_size: u32,
}

impl LeafRef {
    /// A leaf that holds no records. Searching it never touches the file.
    pub fn is_empty(&self) -> bool {
        self.uncompressed_size == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Internal {
        children: [u32; MAX_CHILDREN],
        count: u8,
    },
    Leaf(LeafRef),
}

/// One node of an [`IndexTree`](super::IndexTree).
///
/// Covers the half-open plane rectangle `[x0, x1) × [y0, y1)`. The lower-left
/// corner is the origin that leaf records store their offsets from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexNode {
    pub(crate) x0: f64,
    pub(crate) y0: f64,
    pub(crate) x1: f64,
    pub(crate) y1: f64,
    pub(crate) kind: NodeKind,
    pub(crate) cap: SphericalCap,
}

impl IndexNode {
    pub(crate) fn from_raw(raw: &RawNode, cap: SphericalCap) -> Self {
        let kind = match raw.kind {
            RawNodeKind::Internal { children, count } => NodeKind::Internal { children, count },
            RawNodeKind::Leaf {
                offset,
                compressed_size,
                uncompressed_size,
            } => NodeKind::Leaf(LeafRef {
                offset,
                compressed_size,
                uncompressed_size,
            }),
        };
        Self {
            x0: raw.x0,
            y0: raw.y0,
            x1: raw.x1,
            y1: raw.y1,
            kind,
            cap,
        }
    }

    /// Lower-left corner `(x0, y0)` in plane degrees.
    pub fn origin(&self) -> (f64, f64) {
        (self.x0, self.y0)
    }

    /// Upper-right corner `(x1, y1)` in plane degrees (exclusive).
    pub fn extent(&self) -> (f64, f64) {
        (self.x1, self.y1)
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Spherical cap enclosing this node's rectangle.
    pub fn cap(&self) -> &SphericalCap {
        &self.cap
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Child node indices; empty for a leaf.
    pub fn children(&self) -> &[u32] {
        match &self.kind {
            NodeKind::Internal { children, count } => &children[..(*count as usize).min(MAX_CHILDREN)],
            NodeKind::Leaf(_) => &[],
        }
    }

    pub fn leaf(&self) -> Option<&LeafRef> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Half-open containment test in plane coordinates.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}
