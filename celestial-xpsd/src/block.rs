//! Leaf block access: positioned reads from the memory map and decompression.
//!
//! [`BlockLoader`] reads blocks straight out of a read-only map, so any
//! number of threads can load different blocks at once with no shared file
//! cursor. [`CachedBlockSource`] wraps any [`BlockSource`] with an LRU of
//! decompressed blocks keyed by file offset.

use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use lru::LruCache;
use memmap2::Mmap;
use parking_lot::Mutex;

use crate::error::BlockError;
use crate::format::Compression;
use crate::index::LeafRef;
use crate::search::SearchStats;

/// A decompressed leaf block.
pub type Block = Arc<Vec<u8>>;

/// Upper bound on how far deflate can expand its input.
const MAX_DEFLATE_RATIO: usize = 1032;

/// Anything that can produce the decompressed bytes of a leaf.
pub trait BlockSource: Send + Sync {
    /// Read and decompress the block for `leaf`, adding timings to `stats`.
    fn fetch(&self, leaf: &LeafRef, stats: &mut SearchStats) -> Result<Block, BlockError>;
}

/// Reads leaf blocks from a memory-mapped catalog file.
pub struct BlockLoader {
    mmap: Mmap,
    compression: Compression,
}

impl BlockLoader {
    pub fn new(mmap: Mmap, compression: Compression) -> Self {
        Self { mmap, compression }
    }

    /// Size of the underlying file in bytes.
    pub fn file_len(&self) -> u64 {
        self.mmap.len() as u64
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Copy the stored bytes of `leaf` out of the map.
    ///
    /// Counts as one I/O operation; page faults on the mapped range are
    /// paid here, which is what the I/O timer measures.
    pub fn load(&self, leaf: &LeafRef, stats: &mut SearchStats) -> Result<Vec<u8>, BlockError> {
        let start = Instant::now();
        let file_len = self.file_len();
        let end = leaf
            .offset
            .checked_add(leaf.compressed_size as u64)
            .filter(|&end| end <= file_len)
            .ok_or(BlockError::OutOfBounds {
                offset: leaf.offset,
                size: leaf.compressed_size,
                file_len,
            })?;

        let bytes = self.mmap[leaf.offset as usize..end as usize].to_vec();
        stats.io_time += start.elapsed();
        stats.io_count += 1;
        Ok(bytes)
    }

    /// Expand a stored block to its `uncompressed_size`.
    pub fn decompress(
        &self,
        bytes: Vec<u8>,
        leaf: &LeafRef,
        stats: &mut SearchStats,
    ) -> Result<Vec<u8>, BlockError> {
        let start = Instant::now();
        let out = decompress(bytes, self.compression, leaf);
        stats.decompress_time += start.elapsed();
        out
    }
}

impl BlockSource for BlockLoader {
    fn fetch(&self, leaf: &LeafRef, stats: &mut SearchStats) -> Result<Block, BlockError> {
        let raw = self.load(leaf, stats)?;
        let block = self.decompress(raw, leaf, stats)?;
        Ok(Arc::new(block))
    }
}

/// Decompress `bytes` and check the result against the leaf's declared size.
pub fn decompress(bytes: Vec<u8>, compression: Compression, leaf: &LeafRef) -> Result<Vec<u8>, BlockError> {
    let expected = leaf.uncompressed_size;
    let out = match compression {
        Compression::None => bytes,
        Compression::Zlib => {
            // The declared size is untrusted until checked below.
            let capacity = (expected as usize).min(bytes.len().saturating_mul(MAX_DEFLATE_RATIO));
            let mut out = Vec::with_capacity(capacity);
            // One extra byte is enough to detect an oversized stream.
            ZlibDecoder::new(&bytes[..])
                .take(expected as u64 + 1)
                .read_to_end(&mut out)
                .map_err(|e| BlockError::Decompress {
                    offset: leaf.offset,
                    message: e.to_string(),
                })?;
            out
        }
    };

    if out.len() != expected as usize {
        return Err(BlockError::SizeMismatch {
            offset: leaf.offset,
            expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// Compress a block for writing.
pub fn compress(data: &[u8], compression: Compression) -> std::io::Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
    }
}

/// LRU cache of decompressed blocks in front of another [`BlockSource`].
///
/// The lock is never held while the inner source reads, so concurrent misses
/// on the same block may both load it; the last one wins.
pub struct CachedBlockSource<S> {
    inner: S,
    cache: Mutex<LruCache<u64, Block>>,
}

impl<S: BlockSource> CachedBlockSource<S> {
    pub fn new(inner: S, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of blocks currently cached.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl<S: BlockSource> BlockSource for CachedBlockSource<S> {
    fn fetch(&self, leaf: &LeafRef, stats: &mut SearchStats) -> Result<Block, BlockError> {
        if let Some(block) = self.cache.lock().get(&leaf.offset) {
            stats.cache_hits += 1;
            return Ok(Arc::clone(block));
        }

        let block = self.inner.fetch(leaf, stats)?;
        self.cache.lock().put(leaf.offset, Arc::clone(&block));
        Ok(block)
    }
}
