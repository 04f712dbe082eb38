//! Memory-mapped, read-only catalog file.
//!
//! [`CatalogFile::open`] maps the file, validates the header against the
//! codec, and deserializes the whole index forest. Leaf blocks are only read
//! when a search reaches them. A `CatalogFile` value exists only once open
//! succeeded, and [`CatalogFile::close`] consumes it, so a search can never
//! run against a half-opened or closed catalog.

use std::fmt;
use std::fs::File;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, trace, warn};
use memmap2::Mmap;

use crate::block::{BlockLoader, BlockSource, CachedBlockSource};
use crate::codec::{decode_block, RecordCodec};
use crate::error::{BlockError, XpsdError, XpsdResult};
use crate::format::{self, CatalogMetadata};
use crate::index::{IndexNode, IndexTree};
use crate::search::{CancelToken, SearchContext, SearchCriteria, SearchResult};

/// Open-time options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogOptions {
    /// Abort a search on the first unreadable block instead of skipping it.
    pub strict: bool,
    /// Number of decompressed blocks kept across searches; 0 disables caching.
    pub block_cache_capacity: usize,
}

impl CatalogOptions {
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_block_cache(mut self, capacity: usize) -> Self {
        self.block_cache_capacity = capacity;
        self
    }
}

/// An open catalog file bound to a record codec.
///
/// `CatalogFile` is `Send + Sync`: share it by reference across threads and
/// run searches concurrently. Each search owns its own result.
pub struct CatalogFile<C: RecordCodec> {
    path: PathBuf,
    metadata: CatalogMetadata,
    codec: C,
    trees: Vec<IndexTree>,
    blocks: Box<dyn BlockSource>,
    options: CatalogOptions,
    file_len: u64,
}

impl<C: RecordCodec> CatalogFile<C> {
    /// Open a catalog with default options.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped, its header is invalid
    /// or belongs to another catalog, or its index is corrupt.
    pub fn open(path: impl AsRef<Path>) -> XpsdResult<Self> {
        Self::open_with(path, CatalogOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: CatalogOptions) -> XpsdResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| XpsdError::io(path, e))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| XpsdError::io(path, e))?;

        let header = format::parse_header(&mmap)?;
        let metadata = header.metadata;

        if !C::IDENTIFIERS.contains(&metadata.identifier.as_str()) {
            return Err(XpsdError::IdentifierMismatch {
                expected: C::IDENTIFIERS.join(" or "),
                actual: metadata.identifier,
            });
        }
        if metadata.record_size != C::RECORD_SIZE {
            return Err(XpsdError::RecordSizeMismatch {
                expected: C::RECORD_SIZE,
                actual: metadata.record_size,
            });
        }
        let codec = C::from_metadata(&metadata)?;

        let trees = format::parse_forest(&mmap, header.header_len, header.tree_count)?
            .into_iter()
            .enumerate()
            .map(|(i, raw)| IndexTree::from_raw(i, raw))
            .collect::<XpsdResult<Vec<_>>>()?;

        let file_len = mmap.len() as u64;
        let loader = BlockLoader::new(mmap, metadata.compression);
        let blocks: Box<dyn BlockSource> = match NonZeroUsize::new(options.block_cache_capacity) {
            Some(capacity) => Box::new(CachedBlockSource::new(loader, capacity)),
            None => Box::new(loader),
        };

        debug!(
            "Opened {} catalog {:?}: {} trees, {} nodes, {} bytes",
            metadata.identifier,
            path,
            trees.len(),
            trees.iter().map(IndexTree::node_count).sum::<usize>(),
            file_len
        );

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            codec,
            trees,
            blocks,
            options,
            file_len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &CatalogMetadata {
        &self.metadata
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn options(&self) -> &CatalogOptions {
        &self.options
    }

    pub fn trees(&self) -> &[IndexTree] {
        &self.trees
    }

    pub fn node_count(&self) -> usize {
        self.trees.iter().map(IndexTree::node_count).sum()
    }

    pub fn leaf_count(&self) -> usize {
        self.trees.iter().map(IndexTree::leaf_count).sum()
    }

    /// Total number of records, from leaf sizes; reads no blocks.
    pub fn record_count(&self) -> u64 {
        self.trees
            .iter()
            .map(|t| t.record_count(C::RECORD_SIZE))
            .sum()
    }

    pub fn file_size(&self) -> u64 {
        self.file_len
    }

    /// Run a search to completion.
    pub fn search(&self, criteria: &SearchCriteria) -> XpsdResult<SearchResult<C::Record>> {
        self.run(criteria, None)
    }

    /// Run a search that stops with [`XpsdError::Cancelled`] once `cancel`
    /// fires. The token is checked before each leaf visit.
    pub fn search_with(
        &self,
        criteria: &SearchCriteria,
        cancel: &CancelToken,
    ) -> XpsdResult<SearchResult<C::Record>> {
        self.run(criteria, Some(cancel))
    }

    /// Release the map and the index.
    pub fn close(self) {
        debug!("Closing catalog {:?}", self.path);
    }

    fn run(
        &self,
        criteria: &SearchCriteria,
        cancel: Option<&CancelToken>,
    ) -> XpsdResult<SearchResult<C::Record>> {
        criteria.validate()?;
        let start = Instant::now();
        let mut ctx = SearchContext::new(criteria, cancel);

        for tree in &self.trees {
            let flow = tree.search(criteria, |_, node| self.visit_leaf(tree, node, &mut ctx));
            if let ControlFlow::Break(err) = flow {
                return Err(err);
            }
        }

        let mut result = ctx.into_result();
        result.stats.total_time = start.elapsed();
        debug!(
            "Search ({:.6}, {:+.6}) r={}: {} sources, {} excess, {} rejected, {} blocks, {} errors in {:?}",
            criteria.center_ra,
            criteria.center_dec,
            criteria.radius,
            result.stars.len(),
            result.excess_count,
            result.reject_count,
            result.stats.blocks_visited,
            result.block_errors.len(),
            result.stats.total_time
        );
        Ok(result)
    }

    fn visit_leaf(
        &self,
        tree: &IndexTree,
        node: &IndexNode,
        ctx: &mut SearchContext<'_, C::Record>,
    ) -> ControlFlow<XpsdError> {
        if ctx.is_cancelled() {
            return ControlFlow::Break(XpsdError::Cancelled);
        }
        let Some(leaf) = node.leaf() else {
            return ControlFlow::Continue(());
        };
        ctx.result.stats.blocks_visited += 1;
        if leaf.is_empty() {
            return ControlFlow::Continue(());
        }
        trace!(
            "Loading block at offset {} ({} -> {} bytes)",
            leaf.offset,
            leaf.compressed_size,
            leaf.uncompressed_size
        );

        let block = match self.blocks.fetch(leaf, &mut ctx.result.stats) {
            Ok(block) => block,
            Err(err) => return self.block_failed(err, ctx),
        };

        let start = Instant::now();
        let mut decoder =
            match decode_block(&self.codec, block.as_slice(), tree, node, ctx.criteria, leaf.offset) {
                Ok(decoder) => decoder,
                Err(err) => return self.block_failed(err, ctx),
            };
        while let Some(m) = decoder.next() {
            if ctx.is_full() {
                ctx.result.excess_count += 1;
            } else {
                ctx.result.stars.push(decoder.decode(&m));
            }
        }
        ctx.result.reject_count += decoder.rejected();
        ctx.result.stats.decode_time += start.elapsed();
        ControlFlow::Continue(())
    }

    fn block_failed(
        &self,
        err: BlockError,
        ctx: &mut SearchContext<'_, C::Record>,
    ) -> ControlFlow<XpsdError> {
        if self.options.strict {
            return ControlFlow::Break(err.into());
        }
        warn!("Skipping unreadable block in {:?}: {}", self.path, err);
        ctx.result.block_errors.push(err);
        ControlFlow::Continue(())
    }
}

impl<C: RecordCodec> fmt::Display for CatalogFile<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Path: {}", self.path.display())?;
        writeln!(f, "{}", self.metadata)?;
        writeln!(f, "Trees: {}", self.trees.len())?;
        writeln!(f, "Index nodes: {}", self.node_count())?;
        writeln!(f, "Leaf blocks: {}", self.leaf_count())?;
        writeln!(f, "Records: {}", self.record_count())?;
        write!(
            f,
            "File size: {} bytes ({:.2} MB)",
            self.file_len,
            self.file_len as f64 / 1_048_576.0
        )
    }
}

impl<C: RecordCodec> fmt::Debug for CatalogFile<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogFile")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .field("trees", &self.trees.len())
            .field("options", &self.options)
            .finish()
    }
}
