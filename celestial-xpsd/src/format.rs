//! Binary layout of XPSD catalog files.
//!
//! A catalog file has three contiguous sections, all little-endian:
//!
//! 1. **Header**: magic, format version, compression, record size, database
//!    magnitude range, tree count, identifier and database version strings
//! 2. **Index forest**: per tree: tangent point, node count, then
//!    `node_count × 52` byte node entries (see [`NODE_SIZE`])
//! 3. **Leaf payloads**: blocks of fixed-width encoded records, optionally
//!    zlib-compressed, referenced by absolute file offset from leaf nodes
//!
//! Only sections 1 and 2 are read on open; payloads are read on demand.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Cursor, Read};

use crate::error::{XpsdError, XpsdResult};

pub const CATALOG_MAGIC: &[u8; 4] = b"XPSD";
pub const FORMAT_VERSION: u16 = 1;

/// Size of the fixed part of the header, before the two strings.
pub const FIXED_HEADER_SIZE: usize = 24;
/// Size of a per-tree header: center RA, center Dec, node count.
pub const TREE_HEADER_SIZE: usize = 20;
/// Size of one serialized index node.
pub const NODE_SIZE: usize = 52;
/// Maximum number of children of an internal node.
pub const MAX_CHILDREN: usize = 4;

const NODE_KIND_INTERNAL: u8 = 0;
const NODE_KIND_LEAF: u8 = 1;
const NO_CHILD: u32 = u32::MAX;

/// Block compression method, stored as one byte in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Zlib,
}

impl Compression {
    pub fn from_u8(value: u8) -> XpsdResult<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Zlib),
            other => Err(XpsdError::UnknownCompression(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Zlib => 1,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Zlib => write!(f, "zlib"),
        }
    }
}

/// Catalog identification and layout, parsed from the file header.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMetadata {
    /// Database identifier, e.g. `"GaiaDR2"`.
    pub identifier: String,
    /// Database version string, e.g. `"1.0.2"`. `None` if the file stores none.
    pub database_version: Option<String>,
    /// Width of one encoded record in bytes.
    pub record_size: usize,
    /// Compression applied to leaf blocks.
    pub compression: Compression,
    /// Brightest magnitude stored in this file.
    pub magnitude_low: f32,
    /// Faintest magnitude stored in this file.
    pub magnitude_high: f32,
}

impl fmt::Display for CatalogMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Identifier: {}", self.identifier)?;
        writeln!(
            f,
            "Database version: {}",
            self.database_version.as_deref().unwrap_or("unspecified")
        )?;
        writeln!(f, "Record size: {} bytes", self.record_size)?;
        writeln!(f, "Compression: {}", self.compression)?;
        write!(
            f,
            "Magnitude range: [{:.2}, {:.2}]",
            self.magnitude_low, self.magnitude_high
        )
    }
}

/// Parsed header: metadata, number of trees, and where the forest begins.
#[derive(Debug, Clone)]
pub(crate) struct FileHeader {
    pub metadata: CatalogMetadata,
    pub tree_count: u32,
    pub header_len: usize,
}

/// One index node exactly as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RawNodeKind {
    Internal { children: [u32; MAX_CHILDREN], count: u8 },
    Leaf { offset: u64, compressed_size: u32, uncompressed_size: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RawNode {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub kind: RawNodeKind,
}

/// One tree exactly as stored on disk.
#[derive(Debug, Clone)]
pub(crate) struct RawTree {
    pub center_ra: f64,
    pub center_dec: f64,
    pub nodes: Vec<RawNode>,
}

fn truncated(context: &'static str) -> impl Fn(io::Error) -> XpsdError {
    move |_| XpsdError::truncated(context)
}

fn read_string(cursor: &mut Cursor<&[u8]>, context: &'static str) -> XpsdResult<String> {
    let len = cursor
        .read_u16::<LittleEndian>()
        .map_err(truncated(context))? as usize;
    let mut buf = vec![0u8; len];
    cursor
        .read_exact(&mut buf)
        .map_err(truncated(context))?;
    String::from_utf8(buf).map_err(|_| XpsdError::invalid_header(format!("{} is not valid UTF-8", context)))
}

pub(crate) fn parse_header(bytes: &[u8]) -> XpsdResult<FileHeader> {
    if bytes.len() < FIXED_HEADER_SIZE {
        return Err(XpsdError::too_small(
            FIXED_HEADER_SIZE as u64,
            bytes.len() as u64,
            "header",
        ));
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&bytes[0..4]);
    if &magic != CATALOG_MAGIC {
        return Err(XpsdError::InvalidMagic {
            expected: *CATALOG_MAGIC,
            actual: magic,
        });
    }

    let mut cursor = Cursor::new(bytes);
    cursor.set_position(4);

    let version = cursor
        .read_u16::<LittleEndian>()
        .map_err(truncated("header"))?;
    if version != FORMAT_VERSION {
        return Err(XpsdError::UnsupportedVersion {
            expected: FORMAT_VERSION,
            actual: version,
        });
    }

    let compression = Compression::from_u8(cursor.read_u8().map_err(truncated("header"))?)?;
    let _reserved = cursor.read_u8().map_err(truncated("header"))?;
    let record_size = cursor
        .read_u32::<LittleEndian>()
        .map_err(truncated("header"))? as usize;
    let magnitude_low = cursor
        .read_f32::<LittleEndian>()
        .map_err(truncated("header"))?;
    let magnitude_high = cursor
        .read_f32::<LittleEndian>()
        .map_err(truncated("header"))?;
    let tree_count = cursor
        .read_u32::<LittleEndian>()
        .map_err(truncated("header"))?;

    let identifier = read_string(&mut cursor, "identifier")?;
    let database_version = read_string(&mut cursor, "database version")?;

    if record_size == 0 {
        return Err(XpsdError::invalid_header("record size is zero"));
    }
    if identifier.is_empty() {
        return Err(XpsdError::invalid_header("empty database identifier"));
    }

    Ok(FileHeader {
        metadata: CatalogMetadata {
            identifier,
            database_version: if database_version.is_empty() {
                None
            } else {
                Some(database_version)
            },
            record_size,
            compression,
            magnitude_low,
            magnitude_high,
        },
        tree_count,
        header_len: cursor.position() as usize,
    })
}

/// Parse `tree_count` trees starting at `offset`.
pub(crate) fn parse_forest(bytes: &[u8], offset: usize, tree_count: u32) -> XpsdResult<Vec<RawTree>> {
    let total = bytes.len();
    let mut cursor = Cursor::new(bytes);
    cursor.set_position(offset as u64);

    let mut trees = Vec::with_capacity(tree_count.min(4096) as usize);
    for _ in 0..tree_count {
        let center_ra = cursor
            .read_f64::<LittleEndian>()
            .map_err(truncated("tree header"))?;
        let center_dec = cursor
            .read_f64::<LittleEndian>()
            .map_err(truncated("tree header"))?;
        let node_count = cursor
            .read_u32::<LittleEndian>()
            .map_err(truncated("tree header"))? as usize;

        let needed = node_count
            .checked_mul(NODE_SIZE)
            .and_then(|n| n.checked_add(cursor.position() as usize))
            .unwrap_or(usize::MAX);
        if needed > total {
            return Err(XpsdError::too_small(
                needed as u64,
                total as u64,
                "index nodes",
            ));
        }

        let mut nodes = Vec::with_capacity(node_count);
        for node_index in 0..node_count {
            nodes.push(read_node(&mut cursor, trees.len(), node_index)?);
        }
        trees.push(RawTree {
            center_ra,
            center_dec,
            nodes,
        });
    }
    Ok(trees)
}

fn read_node(cursor: &mut Cursor<&[u8]>, tree: usize, node: usize) -> XpsdResult<RawNode> {
    let eof = truncated("index node");
    let x0 = cursor.read_f64::<LittleEndian>().map_err(&eof)?;
    let y0 = cursor.read_f64::<LittleEndian>().map_err(&eof)?;
    let x1 = cursor.read_f64::<LittleEndian>().map_err(&eof)?;
    let y1 = cursor.read_f64::<LittleEndian>().map_err(&eof)?;
    let kind = cursor.read_u8().map_err(&eof)?;
    let count = cursor.read_u8().map_err(&eof)?;
    let _reserved = cursor.read_u16::<LittleEndian>().map_err(&eof)?;

    let kind = match kind {
        NODE_KIND_LEAF => RawNodeKind::Leaf {
            offset: cursor.read_u64::<LittleEndian>().map_err(&eof)?,
            compressed_size: cursor.read_u32::<LittleEndian>().map_err(&eof)?,
            uncompressed_size: cursor.read_u32::<LittleEndian>().map_err(&eof)?,
        },
        NODE_KIND_INTERNAL => {
            let mut children = [NO_CHILD; MAX_CHILDREN];
            for child in children.iter_mut() {
                *child = cursor.read_u32::<LittleEndian>().map_err(&eof)?;
            }
            RawNodeKind::Internal { children, count }
        }
        other => {
            return Err(XpsdError::corrupt_index(
                tree,
                node,
                format!("unknown node kind {}", other),
            ))
        }
    };

    Ok(RawNode { x0, y0, x1, y1, kind })
}

pub(crate) fn write_header(
    out: &mut Vec<u8>,
    metadata: &CatalogMetadata,
    tree_count: u32,
) -> io::Result<()> {
    out.extend_from_slice(CATALOG_MAGIC);
    out.write_u16::<LittleEndian>(FORMAT_VERSION)?;
    out.write_u8(metadata.compression.as_u8())?;
    out.write_u8(0)?;
    out.write_u32::<LittleEndian>(metadata.record_size as u32)?;
    out.write_f32::<LittleEndian>(metadata.magnitude_low)?;
    out.write_f32::<LittleEndian>(metadata.magnitude_high)?;
    out.write_u32::<LittleEndian>(tree_count)?;
    write_string(out, &metadata.identifier)?;
    write_string(out, metadata.database_version.as_deref().unwrap_or(""))?;
    Ok(())
}

fn write_string(out: &mut Vec<u8>, s: &str) -> io::Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "header string too long"))?;
    out.write_u16::<LittleEndian>(len)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

pub(crate) fn write_tree_header(out: &mut Vec<u8>, center_ra: f64, center_dec: f64, node_count: u32) -> io::Result<()> {
    out.write_f64::<LittleEndian>(center_ra)?;
    out.write_f64::<LittleEndian>(center_dec)?;
    out.write_u32::<LittleEndian>(node_count)
}

pub(crate) fn write_node(out: &mut Vec<u8>, node: &RawNode) -> io::Result<()> {
    out.write_f64::<LittleEndian>(node.x0)?;
    out.write_f64::<LittleEndian>(node.y0)?;
    out.write_f64::<LittleEndian>(node.x1)?;
    out.write_f64::<LittleEndian>(node.y1)?;
    match node.kind {
        RawNodeKind::Internal { children, count } => {
            out.write_u8(NODE_KIND_INTERNAL)?;
            out.write_u8(count)?;
            out.write_u16::<LittleEndian>(0)?;
            for child in children {
                out.write_u32::<LittleEndian>(child)?;
            }
        }
        RawNodeKind::Leaf {
            offset,
            compressed_size,
            uncompressed_size,
        } => {
            out.write_u8(NODE_KIND_LEAF)?;
            out.write_u8(0)?;
            out.write_u16::<LittleEndian>(0)?;
            out.write_u64::<LittleEndian>(offset)?;
            out.write_u32::<LittleEndian>(compressed_size)?;
            out.write_u32::<LittleEndian>(uncompressed_size)?;
        }
    }
    Ok(())
}

/// Byte length of a serialized header with the given strings.
pub(crate) fn header_len(metadata: &CatalogMetadata) -> usize {
    FIXED_HEADER_SIZE
        + 2
        + metadata.identifier.len()
        + 2
        + metadata.database_version.as_deref().map_or(0, str::len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> CatalogMetadata {
        CatalogMetadata {
            identifier: "GaiaDR2".to_string(),
            database_version: Some("1.0.2".to_string()),
            record_size: 30,
            compression: Compression::Zlib,
            magnitude_low: -1.5,
            magnitude_high: 21.0,
        }
    }

    #[test]
    fn test_header_layout_size() {
        let meta = sample_metadata();
        let mut buf = Vec::new();
        write_header(&mut buf, &meta, 3).unwrap();
        assert_eq!(buf.len(), header_len(&meta));
        assert_eq!(&buf[0..4], CATALOG_MAGIC);
    }

    #[test]
    fn test_parse_header_fields() {
        let meta = sample_metadata();
        let mut buf = Vec::new();
        write_header(&mut buf, &meta, 3).unwrap();

        let header = parse_header(&buf).unwrap();
        assert_eq!(header.metadata, meta);
        assert_eq!(header.tree_count, 3);
        assert_eq!(header.header_len, buf.len());
    }

    #[test]
    fn test_empty_version_parses_as_none() {
        let mut meta = sample_metadata();
        meta.database_version = None;
        let mut buf = Vec::new();
        write_header(&mut buf, &meta, 1).unwrap();
        assert_eq!(parse_header(&buf).unwrap().metadata.database_version, None);
    }

    #[test]
    fn test_parse_header_bad_magic() {
        let mut buf = Vec::new();
        write_header(&mut buf, &sample_metadata(), 1).unwrap();
        buf[0..4].copy_from_slice(b"XXXX");
        let msg = parse_header(&buf).unwrap_err().to_string();
        assert!(msg.contains("Invalid catalog magic"), "unexpected error: {}", msg);
    }

    #[test]
    fn test_parse_header_bad_version() {
        let mut buf = Vec::new();
        write_header(&mut buf, &sample_metadata(), 1).unwrap();
        buf[4..6].copy_from_slice(&99u16.to_le_bytes());
        let msg = parse_header(&buf).unwrap_err().to_string();
        assert!(msg.contains("Unsupported catalog format version"), "unexpected error: {}", msg);
    }

    #[test]
    fn test_parse_header_unknown_compression() {
        let mut buf = Vec::new();
        write_header(&mut buf, &sample_metadata(), 1).unwrap();
        buf[6] = 7;
        assert!(matches!(
            parse_header(&buf),
            Err(XpsdError::UnknownCompression(7))
        ));
    }

    #[test]
    fn test_parse_header_truncated_strings() {
        let mut buf = Vec::new();
        write_header(&mut buf, &sample_metadata(), 1).unwrap();
        buf.truncate(FIXED_HEADER_SIZE + 4);
        let msg = parse_header(&buf).unwrap_err().to_string();
        assert!(msg.contains("truncated"), "unexpected error: {}", msg);
    }

    #[test]
    fn test_node_serialization() {
        let leaf = RawNode {
            x0: -1.0,
            y0: -0.5,
            x1: 1.0,
            y1: 0.5,
            kind: RawNodeKind::Leaf {
                offset: 1234,
                compressed_size: 99,
                uncompressed_size: 300,
            },
        };
        let internal = RawNode {
            x0: -2.0,
            y0: -2.0,
            x1: 2.0,
            y1: 2.0,
            kind: RawNodeKind::Internal {
                children: [1, 2, NO_CHILD, NO_CHILD],
                count: 2,
            },
        };

        let mut buf = Vec::new();
        write_tree_header(&mut buf, 10.0, -5.0, 2).unwrap();
        write_node(&mut buf, &internal).unwrap();
        write_node(&mut buf, &leaf).unwrap();
        assert_eq!(buf.len(), TREE_HEADER_SIZE + 2 * NODE_SIZE);

        let trees = parse_forest(&buf, 0, 1).unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].center_ra, 10.0);
        assert_eq!(trees[0].center_dec, -5.0);
        assert_eq!(trees[0].nodes, vec![internal, leaf]);
    }

    #[test]
    fn test_parse_forest_unknown_node_kind() {
        let mut buf = Vec::new();
        write_tree_header(&mut buf, 0.0, 0.0, 1).unwrap();
        let mut node = vec![0u8; NODE_SIZE];
        node[32] = 9;
        buf.extend_from_slice(&node);
        let msg = parse_forest(&buf, 0, 1).unwrap_err().to_string();
        assert!(msg.contains("unknown node kind 9"), "unexpected error: {}", msg);
    }

    #[test]
    fn test_parse_forest_truncated_nodes() {
        let mut buf = Vec::new();
        write_tree_header(&mut buf, 0.0, 0.0, 5).unwrap();
        buf.extend_from_slice(&[0u8; NODE_SIZE]);
        let msg = parse_forest(&buf, 0, 1).unwrap_err().to_string();
        assert!(msg.contains("index nodes"), "unexpected error: {}", msg);
    }
}
