//! Error types for catalog access.
//!
//! Two levels of failure exist:
//!
//! | Type | Scope | Effect |
//! |------|-------|--------|
//! | [`XpsdError`] | whole catalog or whole query | returned to the caller |
//! | [`BlockError`] | one leaf block | block skipped, logged, collected in the result |
//!
//! Records that fail magnitude, flag or radius tests are not errors at all;
//! they are counted in [`SearchResult::reject_count`](crate::SearchResult::reject_count).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type XpsdResult<T> = Result<T, XpsdError>;

/// Failure affecting a single leaf block.
///
/// A damaged block never aborts a search unless strict mode is enabled in
/// [`CatalogOptions`](crate::CatalogOptions).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("Block at offset {offset} ({size} bytes) extends past end of file ({file_len} bytes)")]
    OutOfBounds { offset: u64, size: u32, file_len: u64 },

    #[error("Failed to decompress block at offset {offset}: {message}")]
    Decompress { offset: u64, message: String },

    #[error("Block at offset {offset} decompressed to {actual} bytes, expected {expected}")]
    SizeMismatch {
        offset: u64,
        expected: u32,
        actual: usize,
    },

    #[error("Block at offset {offset} has {len} bytes, not a multiple of the {record_size}-byte record")]
    MalformedLength {
        offset: u64,
        len: usize,
        record_size: usize,
    },
}

impl BlockError {
    /// File offset of the block that failed.
    pub fn offset(&self) -> u64 {
        match self {
            Self::OutOfBounds { offset, .. }
            | Self::Decompress { offset, .. }
            | Self::SizeMismatch { offset, .. }
            | Self::MalformedLength { offset, .. } => *offset,
        }
    }
}

/// Catalog-level error.
///
/// Every open-time variant is fatal for the handle being opened: no partially
/// constructed catalog is ever returned.
#[derive(Debug, Error)]
pub enum XpsdError {
    #[error("Failed to open catalog file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Catalog file too small: {actual} bytes, expected at least {expected} ({context})")]
    TooSmall {
        expected: u64,
        actual: u64,
        context: String,
    },

    #[error("Catalog file truncated while reading {0}")]
    Truncated(String),

    #[error("Invalid catalog magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    #[error("Unsupported catalog format version: expected {expected}, got {actual}")]
    UnsupportedVersion { expected: u16, actual: u16 },

    #[error("Not a valid {expected} database file: identifier is '{actual}'")]
    IdentifierMismatch { expected: String, actual: String },

    #[error("Unsupported {identifier} database version '{version}'")]
    UnsupportedDatabaseVersion { identifier: String, version: String },

    #[error("Record size mismatch: codec uses {expected} bytes, file declares {actual}")]
    RecordSizeMismatch { expected: usize, actual: usize },

    #[error("Unknown compression method: {0}")]
    UnknownCompression(u8),

    #[error("Corrupt index in tree {tree}, node {node}: {message}")]
    CorruptIndex {
        tree: usize,
        node: usize,
        message: String,
    },

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid search criteria: {0}")]
    InvalidCriteria(String),

    #[error("Block error: {0}")]
    Block(#[from] BlockError),

    #[error("Search cancelled")]
    Cancelled,

    #[error("Catalog build error: {0}")]
    Build(String),

    #[error("I/O error: {0}")]
    Write(#[from] io::Error),
}

impl XpsdError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn too_small(expected: u64, actual: u64, context: impl Into<String>) -> Self {
        Self::TooSmall {
            expected,
            actual,
            context: context.into(),
        }
    }

    pub fn truncated(context: impl Into<String>) -> Self {
        Self::Truncated(context.into())
    }

    pub fn corrupt_index(tree: usize, node: usize, message: impl Into<String>) -> Self {
        Self::CorruptIndex {
            tree,
            node,
            message: message.into(),
        }
    }

    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader(message.into())
    }

    pub fn invalid_criteria(message: impl Into<String>) -> Self {
        Self::InvalidCriteria(message.into())
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build(message.into())
    }
}
