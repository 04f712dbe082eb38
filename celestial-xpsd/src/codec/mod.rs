//! Fixed-width record codecs and the per-block decode pipeline.
//!
//! Every catalog flavour implements [`RecordCodec`]: it knows its record
//! width, which identifiers it accepts, and how to pull flags, magnitude and
//! quantized plane offsets out of a raw record. [`decode_block`] turns one
//! decompressed leaf block into an iterator of records that pass the search
//! filters, checking the cheap fields first and unprojecting only survivors.
//!
//! Positions are stored as offsets from the leaf's lower-left corner in units
//! of 0.002 mas, plus an optional right ascension correction (0.01 mas) that
//! absorbs the quantization error amplified near the poles.

pub mod gaia;
pub mod gaia_dr2;
pub mod gaia_dr3;

use std::fmt;
use std::slice::ChunksExact;

use crate::error::{BlockError, XpsdResult};
use crate::format::CatalogMetadata;
use crate::index::{IndexNode, IndexTree};
use crate::search::{PointSource, SearchCriteria};
use crate::sphere::{angular_separation_deg, normalize_ra, Gnomonic};

pub use gaia::GaiaStar;
pub use gaia_dr2::GaiaDr2;
pub use gaia_dr3::GaiaDr3;

/// Plane offset units per degree (0.002 mas).
pub const OFFSET_UNITS_PER_DEG: f64 = 1_800_000_000.0;
/// Right ascension correction units per degree (0.01 mas).
pub const RA_CORRECTION_UNITS_PER_DEG: f64 = 360_000_000.0;
/// Widest leaf side a record offset can span, in degrees (about 2.386°).
pub const MAX_OFFSET_DEG: f64 = u32::MAX as f64 / OFFSET_UNITS_PER_DEG;

const MAGNITUDE_SCALE: f64 = 1000.0;
const MAGNITUDE_ZERO: f64 = 1.5;

/// Decode a `(mag + 1.5) * 1000` magnitude.
#[inline]
pub fn decode_magnitude(raw: u16) -> f32 {
    0.001 * raw as f32 - 1.5
}

/// Inverse of [`decode_magnitude`]. Non-finite input encodes as 0; values
/// outside `[-1.5, 64.035]` saturate.
pub fn encode_magnitude(magnitude: f32) -> u16 {
    if !magnitude.is_finite() {
        return 0;
    }
    ((magnitude as f64 + MAGNITUDE_ZERO) * MAGNITUDE_SCALE)
        .round()
        .clamp(0.0, u16::MAX as f64) as u16
}

/// Quantize a non-negative plane offset in degrees. `None` if it does not fit.
pub fn quantize_offset(delta_deg: f64) -> Option<u32> {
    let q = (delta_deg * OFFSET_UNITS_PER_DEG).round();
    if q.is_finite() && (0.0..=u32::MAX as f64).contains(&q) {
        Some(q as u32)
    } else {
        None
    }
}

#[inline]
pub fn dequantize_offset(origin_deg: f64, units: u32) -> f64 {
    origin_deg + units as f64 / OFFSET_UNITS_PER_DEG
}

/// Quantize a right ascension correction to 0.01 mas, clamped to `[min, max]`.
pub fn quantize_ra_correction(correction_deg: f64, min: i32, max: i32) -> i32 {
    let q = (correction_deg * RA_CORRECTION_UNITS_PER_DEG).round();
    if !q.is_finite() {
        return 0;
    }
    q.clamp(min as f64, max as f64) as i32
}

/// A record position as stored: offsets from a leaf origin plus the
/// right ascension residual left after unprojecting the quantized offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizedPosition {
    pub dx: u32,
    pub dy: u32,
    /// `ra - ra(quantized)`, in degrees, folded into `[-180, 180)`.
    pub ra_correction: f64,
}

/// Quantize `(ra, dec)` relative to the plane point `origin`.
///
/// Returns `None` if the point cannot be projected or lies outside the
/// offset range of a leaf anchored at `origin`.
pub fn quantize_position(
    projection: &Gnomonic,
    origin: (f64, f64),
    ra_deg: f64,
    dec_deg: f64,
) -> Option<QuantizedPosition> {
    let (x, y) = projection.project(ra_deg, dec_deg)?;
    let dx = quantize_offset(x - origin.0)?;
    let dy = quantize_offset(y - origin.1)?;

    let (ra_q, _) = projection.unproject(
        dequantize_offset(origin.0, dx),
        dequantize_offset(origin.1, dy),
    );
    let mut ra_correction = normalize_ra(ra_deg) - ra_q;
    if ra_correction >= 180.0 {
        ra_correction -= 360.0;
    } else if ra_correction < -180.0 {
        ra_correction += 360.0;
    }

    Some(QuantizedPosition {
        dx,
        dy,
        ra_correction,
    })
}

/// Layout and semantics of one catalog's fixed-width records.
///
/// A codec is created once per opened file from its metadata and is then
/// shared read-only by every search on that file.
pub trait RecordCodec: Send + Sync + Sized {
    type Record: PointSource + Clone + Send + Sync + fmt::Debug;

    /// File identifiers this codec accepts.
    const IDENTIFIERS: &'static [&'static str];
    /// Width of one encoded record, in bytes.
    const RECORD_SIZE: usize;

    /// Apply codec-specific metadata rules (identifier already matched).
    fn from_metadata(metadata: &CatalogMetadata) -> XpsdResult<Self>;

    /// Identifier written by the builder.
    fn identifier(&self) -> &str;

    fn flags(&self, raw: &[u8]) -> u32;

    /// Magnitude the search filter applies to.
    fn magnitude(&self, raw: &[u8]) -> f32;

    /// Quantized `(dx, dy)` plane offsets from the leaf origin.
    fn offsets(&self, raw: &[u8]) -> (u32, u32);

    /// Right ascension correction in degrees; 0 when absent.
    fn ra_correction(&self, raw: &[u8]) -> f64;

    /// Build the full record once its position is known.
    fn decode(&self, raw: &[u8], ra: f64, dec: f64) -> Self::Record;

    /// Append exactly `RECORD_SIZE` bytes for `record` to `out`.
    fn encode(&self, record: &Self::Record, position: &QuantizedPosition, out: &mut Vec<u8>);
}

/// A record that passed every filter, with its final position.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub raw: &'a [u8],
    pub ra: f64,
    pub dec: f64,
}

/// Iterator over the records of one block that satisfy a search.
pub struct BlockDecoder<'a, C> {
    codec: &'a C,
    records: ChunksExact<'a, u8>,
    projection: &'a Gnomonic,
    origin: (f64, f64),
    criteria: &'a SearchCriteria,
    examined: u64,
    matched: u64,
}

impl<'a, C: RecordCodec> BlockDecoder<'a, C> {
    /// Records looked at so far.
    pub fn examined(&self) -> u64 {
        self.examined
    }

    pub fn matched(&self) -> u64 {
        self.matched
    }

    /// Records looked at and rejected so far.
    pub fn rejected(&self) -> u64 {
        self.examined - self.matched
    }

    pub fn decode(&self, m: &Match<'_>) -> C::Record {
        self.codec.decode(m.raw, m.ra, m.dec)
    }
}

impl<'a, C: RecordCodec> Iterator for BlockDecoder<'a, C> {
    type Item = Match<'a>;

    fn next(&mut self) -> Option<Match<'a>> {
        for raw in self.records.by_ref() {
            self.examined += 1;

            if !self.criteria.accepts_flags(self.codec.flags(raw)) {
                continue;
            }
            if !self.criteria.accepts_magnitude(self.codec.magnitude(raw)) {
                continue;
            }

            let (dx, dy) = self.codec.offsets(raw);
            let (mut ra, dec) = self.projection.unproject(
                dequantize_offset(self.origin.0, dx),
                dequantize_offset(self.origin.1, dy),
            );
            let correction = self.codec.ra_correction(raw);
            if correction != 0.0 {
                ra = normalize_ra(ra + correction);
            }

            let distance =
                angular_separation_deg(self.criteria.center_ra, self.criteria.center_dec, ra, dec);
            if distance >= self.criteria.radius {
                continue;
            }

            self.matched += 1;
            return Some(Match { raw, ra, dec });
        }
        None
    }
}

/// Start decoding one decompressed leaf block.
///
/// `offset` is the block's file offset, reported if the block length is not
/// a whole number of records.
pub fn decode_block<'a, C: RecordCodec>(
    codec: &'a C,
    block: &'a [u8],
    tree: &'a IndexTree,
    node: &IndexNode,
    criteria: &'a SearchCriteria,
    offset: u64,
) -> Result<BlockDecoder<'a, C>, BlockError> {
    if block.len() % C::RECORD_SIZE != 0 {
        return Err(BlockError::MalformedLength {
            offset,
            len: block.len(),
            record_size: C::RECORD_SIZE,
        });
    }
    Ok(BlockDecoder {
        codec,
        records: block.chunks_exact(C::RECORD_SIZE),
        projection: tree.projection(),
        origin: node.origin(),
        criteria,
        examined: 0,
        matched: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_quantization() {
        assert_eq!(encode_magnitude(-1.5), 0);
        assert_eq!(encode_magnitude(0.0), 1500);
        assert_eq!(encode_magnitude(12.345), 13845);
        assert_eq!(encode_magnitude(f32::NAN), 0);
        assert_eq!(encode_magnitude(-10.0), 0);
        assert_eq!(encode_magnitude(100.0), u16::MAX);

        for &mag in &[-1.5f32, 3.2, 11.111, 20.999, 25.5] {
            let back = decode_magnitude(encode_magnitude(mag));
            assert!((back - mag).abs() < 0.0006, "{} -> {}", mag, back);
        }
    }

    #[test]
    fn test_offset_quantization() {
        assert_eq!(quantize_offset(0.0), Some(0));
        assert_eq!(quantize_offset(1.0), Some(1_800_000_000));
        assert_eq!(quantize_offset(-0.001), None);
        assert_eq!(quantize_offset(MAX_OFFSET_DEG + 0.001), None);
        assert_eq!(quantize_offset(f64::NAN), None);
        let x = dequantize_offset(-1.0, 900_000_000);
        assert!((x + 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_ra_correction_clamps() {
        assert_eq!(quantize_ra_correction(0.0, -2048, 2047), 0);
        assert_eq!(quantize_ra_correction(1.0 / RA_CORRECTION_UNITS_PER_DEG * 5.0, -2048, 2047), 5);
        assert_eq!(quantize_ra_correction(1.0, -2048, 2047), 2047);
        assert_eq!(quantize_ra_correction(-1.0, -2048, 2047), -2048);
        assert_eq!(quantize_ra_correction(f64::NAN, -2048, 2047), 0);
    }

    #[test]
    fn test_quantize_position_roundtrip() {
        let proj = Gnomonic::new(80.0, 30.0);
        let origin = (-1.0, -1.0);
        let qp = quantize_position(&proj, origin, 80.4, 30.3).unwrap();
        let (ra, dec) = proj.unproject(
            dequantize_offset(origin.0, qp.dx),
            dequantize_offset(origin.1, qp.dy),
        );
        let ra = normalize_ra(ra + qp.ra_correction);
        // 0.002 mas quantization is about 5.6e-10 degrees.
        assert!(angular_separation_deg(ra, dec, 80.4, 30.3) < 1e-9);
    }

    #[test]
    fn test_quantize_position_outside_leaf() {
        let proj = Gnomonic::new(0.0, 0.0);
        // Below and left of the origin.
        assert!(quantize_position(&proj, (0.0, 0.0), 359.0, -1.0).is_none());
        // Beyond the widest representable offset.
        assert!(quantize_position(&proj, (0.0, 0.0), 3.0, 0.5).is_none());
        // Other hemisphere.
        assert!(quantize_position(&proj, (0.0, 0.0), 180.0, 0.0).is_none());
    }

    fn single_leaf_tree(len: u32) -> IndexTree {
        use crate::format::{RawNode, RawNodeKind, RawTree};
        let raw = RawTree {
            center_ra: 0.0,
            center_dec: 0.0,
            nodes: vec![RawNode {
                x0: -1.0,
                y0: -1.0,
                x1: 1.0,
                y1: 1.0,
                kind: RawNodeKind::Leaf {
                    offset: 107,
                    compressed_size: len,
                    uncompressed_size: len,
                },
            }],
        };
        IndexTree::from_raw(0, raw).unwrap()
    }

    #[test]
    fn test_decode_block_rejects_partial_record() {
        let tree = single_leaf_tree(31);
        let criteria = SearchCriteria::new(0.0, 0.0, 1.0);
        let block = [0u8; 31];
        let err = decode_block(&GaiaDr2, &block, &tree, tree.root(), &criteria, 107)
            .err()
            .unwrap();
        assert_eq!(
            err,
            BlockError::MalformedLength {
                offset: 107,
                len: 31,
                record_size: 30,
            }
        );
    }

    #[test]
    fn test_decode_block_whole_records() {
        let tree = single_leaf_tree(60);
        let criteria = SearchCriteria::new(0.0, 0.0, 1.0).with_magnitude_range(-2.0, 30.0);
        let star = GaiaStar::new(0.1, 0.2, 9.0);
        let origin = tree.root().origin();
        let position = quantize_position(tree.projection(), origin, star.ra, star.dec).unwrap();
        let mut block = Vec::new();
        GaiaDr2.encode(&star, &position, &mut block);
        GaiaDr2.encode(&star, &position, &mut block);

        let mut decoder = decode_block(&GaiaDr2, &block, &tree, tree.root(), &criteria, 107).unwrap();
        assert_eq!(decoder.by_ref().count(), 2);
        assert_eq!(decoder.examined(), 2);
        assert_eq!(decoder.rejected(), 0);
    }

    #[test]
    fn test_quantize_position_wraps_correction() {
        let proj = Gnomonic::new(0.0, 0.0);
        let qp = quantize_position(&proj, (-1.0, -1.0), 359.9999, 0.0).unwrap();
        assert!(qp.ra_correction.abs() < 1e-6);
    }
}
