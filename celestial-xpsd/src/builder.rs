//! Offline catalog writer.
//!
//! Builds a brand-new catalog file from in-memory records: one quadtree per
//! tangent point, leaves capped by record count and by the widest offset a
//! record can encode, blocks compressed independently. Opened catalogs are
//! never modified; this is build tooling only.
//!
//! ```ignore
//! use celestial_xpsd::{CatalogBuilder, Compression, GaiaDr2};
//!
//! CatalogBuilder::new(GaiaDr2)
//!     .database_version("1.0.2")
//!     .compression(Compression::Zlib)
//!     .tree(0.0, 90.0, 30.0, north)
//!     .tree(0.0, -90.0, 30.0, south)
//!     .write("gaia-dr2-00-12.xpsd")?;
//! ```

use std::path::Path;

use log::debug;

use crate::block::compress;
use crate::codec::{quantize_position, RecordCodec, MAX_OFFSET_DEG};
use crate::error::{XpsdError, XpsdResult};
use crate::format::{
    self, CatalogMetadata, Compression, RawNode, RawNodeKind, MAX_CHILDREN, NODE_SIZE,
    TREE_HEADER_SIZE,
};
use crate::search::PointSource;
use crate::sphere::Gnomonic;

pub const DEFAULT_MAX_LEAF_RECORDS: usize = 1024;
pub const DEFAULT_MAX_LEAF_SPAN_DEG: f64 = 2.0;

/// Splitting stops at this depth even if a leaf is still too full.
const MAX_DEPTH: u32 = 40;

struct TreeSpec<R> {
    center_ra: f64,
    center_dec: f64,
    half_size: f64,
    records: Vec<R>,
}

/// A leaf block waiting for its final file offset.
struct PendingBlock {
    node: usize,
    data: Vec<u8>,
    uncompressed_size: u32,
}

struct BuiltTree {
    center_ra: f64,
    center_dec: f64,
    nodes: Vec<RawNode>,
    blocks: Vec<PendingBlock>,
}

/// Writes XPSD catalog files for a given codec.
pub struct CatalogBuilder<C: RecordCodec> {
    codec: C,
    database_version: Option<String>,
    compression: Compression,
    magnitude_range: Option<(f32, f32)>,
    max_leaf_records: usize,
    max_leaf_span: f64,
    trees: Vec<TreeSpec<C::Record>>,
}

impl<C: RecordCodec> CatalogBuilder<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            database_version: None,
            compression: Compression::Zlib,
            magnitude_range: None,
            max_leaf_records: DEFAULT_MAX_LEAF_RECORDS,
            max_leaf_span: DEFAULT_MAX_LEAF_SPAN_DEG,
            trees: Vec::new(),
        }
    }

    pub fn database_version(mut self, version: impl Into<String>) -> Self {
        self.database_version = Some(version.into());
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Magnitude range recorded in the header. Defaults to the range of the
    /// records written.
    pub fn magnitude_range(mut self, low: f32, high: f32) -> Self {
        self.magnitude_range = Some((low, high));
        self
    }

    pub fn max_leaf_records(mut self, n: usize) -> Self {
        self.max_leaf_records = n.max(1);
        self
    }

    /// Widest leaf side in plane degrees; capped at the codec offset range.
    pub fn max_leaf_span(mut self, degrees: f64) -> Self {
        self.max_leaf_span = degrees.min(MAX_OFFSET_DEG);
        self
    }

    /// Add a tree with tangent point `(center_ra, center_dec)` whose root
    /// covers `[-half_size, half_size)²` in plane degrees.
    pub fn tree(mut self, center_ra: f64, center_dec: f64, half_size: f64, records: Vec<C::Record>) -> Self {
        self.trees.push(TreeSpec {
            center_ra,
            center_dec,
            half_size,
            records,
        });
        self
    }

    /// Serialize the catalog into memory.
    pub fn build(&self) -> XpsdResult<Vec<u8>> {
        let metadata = self.metadata();
        let tree_count = u32::try_from(self.trees.len())
            .map_err(|_| XpsdError::build("too many trees"))?;

        let mut built = self
            .trees
            .iter()
            .enumerate()
            .map(|(i, spec)| self.build_tree(i, spec))
            .collect::<XpsdResult<Vec<_>>>()?;

        let index_len: usize = built
            .iter()
            .map(|t| TREE_HEADER_SIZE + t.nodes.len() * NODE_SIZE)
            .sum();
        let mut offset = (format::header_len(&metadata) + index_len) as u64;

        for tree in built.iter_mut() {
            for block in &tree.blocks {
                let compressed_size = u32::try_from(block.data.len())
                    .map_err(|_| XpsdError::build("compressed block exceeds 4 GiB"))?;
                tree.nodes[block.node].kind = RawNodeKind::Leaf {
                    offset,
                    compressed_size,
                    uncompressed_size: block.uncompressed_size,
                };
                offset += compressed_size as u64;
            }
        }

        let mut out = Vec::with_capacity(offset as usize);
        format::write_header(&mut out, &metadata, tree_count)?;
        for tree in &built {
            format::write_tree_header(&mut out, tree.center_ra, tree.center_dec, tree.nodes.len() as u32)?;
            for node in &tree.nodes {
                format::write_node(&mut out, node)?;
            }
        }
        for tree in &built {
            for block in &tree.blocks {
                out.extend_from_slice(&block.data);
            }
        }

        debug!(
            "Built {} catalog: {} trees, {} nodes, {} bytes",
            metadata.identifier,
            built.len(),
            built.iter().map(|t| t.nodes.len()).sum::<usize>(),
            out.len()
        );
        Ok(out)
    }

    /// Build and write the catalog to `path`.
    pub fn write(&self, path: impl AsRef<Path>) -> XpsdResult<()> {
        let path = path.as_ref();
        let bytes = self.build()?;
        std::fs::write(path, bytes).map_err(|e| XpsdError::io(path, e))
    }

    fn metadata(&self) -> CatalogMetadata {
        let (magnitude_low, magnitude_high) = self.magnitude_range.unwrap_or_else(|| {
            let mags = self
                .trees
                .iter()
                .flat_map(|t| t.records.iter())
                .map(|r| r.magnitude())
                .filter(|m| m.is_finite());
            let (low, high) = mags.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), m| {
                (lo.min(m), hi.max(m))
            });
            if low <= high {
                (low, high)
            } else {
                (-1.5, 26.0)
            }
        });
        CatalogMetadata {
            identifier: self.codec.identifier().to_string(),
            database_version: self.database_version.clone(),
            record_size: C::RECORD_SIZE,
            compression: self.compression,
            magnitude_low,
            magnitude_high,
        }
    }

    fn build_tree(&self, index: usize, spec: &TreeSpec<C::Record>) -> XpsdResult<BuiltTree> {
        if !spec.half_size.is_finite() || spec.half_size <= 0.0 {
            return Err(XpsdError::build(format!(
                "tree {}: half size {} must be positive",
                index, spec.half_size
            )));
        }
        let projection = Gnomonic::new(spec.center_ra, spec.center_dec);
        let h = spec.half_size;

        let mut points = Vec::with_capacity(spec.records.len());
        for record in &spec.records {
            let (x, y) = projection
                .project(record.ra(), record.dec())
                .filter(|&(x, y)| x >= -h && x < h && y >= -h && y < h)
                .ok_or_else(|| {
                    XpsdError::build(format!(
                        "tree {}: record at ({}, {}) lies outside the tree",
                        index,
                        record.ra(),
                        record.dec()
                    ))
                })?;
            points.push((x, y, record));
        }

        let mut tree = BuiltTree {
            center_ra: spec.center_ra,
            center_dec: spec.center_dec,
            nodes: Vec::new(),
            blocks: Vec::new(),
        };
        self.build_node(&projection, [-h, -h, h, h], points, 0, &mut tree)?;
        Ok(tree)
    }

    fn build_node(
        &self,
        projection: &Gnomonic,
        rect: [f64; 4],
        points: Vec<(f64, f64, &C::Record)>,
        depth: u32,
        tree: &mut BuiltTree,
    ) -> XpsdResult<u32> {
        let [x0, y0, x1, y1] = rect;
        let index = tree.nodes.len();
        tree.nodes.push(RawNode {
            x0,
            y0,
            x1,
            y1,
            kind: RawNodeKind::Leaf {
                offset: 0,
                compressed_size: 0,
                uncompressed_size: 0,
            },
        });

        let span = (x1 - x0).max(y1 - y0);
        let small_enough = points.len() <= self.max_leaf_records && span <= self.max_leaf_span;
        if points.is_empty() || small_enough || (depth >= MAX_DEPTH && span <= MAX_OFFSET_DEG) {
            self.encode_leaf(projection, index, (x0, y0), &points, tree)?;
            return Ok(index as u32);
        }
        if depth >= MAX_DEPTH {
            return Err(XpsdError::build("quadtree exceeded maximum depth"));
        }

        let mx = 0.5 * (x0 + x1);
        let my = 0.5 * (y0 + y1);
        let quadrants = [
            [x0, y0, mx, my],
            [mx, y0, x1, my],
            [x0, my, mx, y1],
            [mx, my, x1, y1],
        ];
        let mut buckets: [Vec<(f64, f64, &C::Record)>; MAX_CHILDREN] = Default::default();
        for p in points {
            let q = usize::from(p.0 >= mx) + 2 * usize::from(p.1 >= my);
            buckets[q].push(p);
        }

        let mut children = [u32::MAX; MAX_CHILDREN];
        let mut count = 0u8;
        for (quadrant, bucket) in quadrants.into_iter().zip(buckets) {
            if bucket.is_empty() {
                continue;
            }
            children[count as usize] = self.build_node(projection, quadrant, bucket, depth + 1, tree)?;
            count += 1;
        }
        tree.nodes[index].kind = RawNodeKind::Internal { children, count };
        Ok(index as u32)
    }

    fn encode_leaf(
        &self,
        projection: &Gnomonic,
        index: usize,
        origin: (f64, f64),
        points: &[(f64, f64, &C::Record)],
        tree: &mut BuiltTree,
    ) -> XpsdResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let mut raw = Vec::with_capacity(points.len() * C::RECORD_SIZE);
        for &(_, _, record) in points {
            let position = quantize_position(projection, origin, record.ra(), record.dec())
                .ok_or_else(|| {
                    XpsdError::build(format!(
                        "record at ({}, {}) does not fit its leaf",
                        record.ra(),
                        record.dec()
                    ))
                })?;
            self.codec.encode(record, &position, &mut raw);
        }
        let uncompressed_size = u32::try_from(raw.len())
            .map_err(|_| XpsdError::build("leaf block exceeds 4 GiB"))?;
        let data = compress(&raw, self.compression)?;
        tree.blocks.push(PendingBlock {
            node: index,
            data,
            uncompressed_size,
        });
        Ok(())
    }
}
