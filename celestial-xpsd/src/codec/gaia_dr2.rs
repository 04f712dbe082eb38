//! Gaia DR2 records: 30 bytes, flags and RA correction packed in one word.
//!
//! Bytes 26..30 hold a little-endian `u32`:
//!
//! ```text
//!  31          20 19                  0
//! +--------------+---------------------+
//! |  dra (i12)   |     flags (20)      |
//! +--------------+---------------------+
//! ```
//!
//! `dra` is two's complement in 0.01 mas units.

use byteorder::{ByteOrder, LittleEndian};

use super::gaia::{self, GaiaStar, COMMON_SIZE};
use super::{quantize_ra_correction, QuantizedPosition, RecordCodec, RA_CORRECTION_UNITS_PER_DEG};
use crate::error::{XpsdError, XpsdResult};
use crate::format::CatalogMetadata;

pub const IDENTIFIER: &str = "GaiaDR2";
pub const RECORD_SIZE: usize = 30;

/// Oldest database version this codec can read.
pub const MIN_DATABASE_VERSION: [u32; 3] = [1, 0, 2];

const FLAGS_MASK: u32 = 0x000F_FFFF;
const DRA_SHIFT: u32 = 20;
const DRA_MIN: i32 = -(1 << 11);
const DRA_MAX: i32 = (1 << 11) - 1;

/// Gaia DR2 data availability and quality flags.
pub mod flags {
    pub use crate::codec::gaia::flags::{LACKING_DATA, NO_GBP_MAG, NO_GRP_MAG, NO_PM};

    /// Standard error of right ascension < 1 mas.
    pub const GOOD_RA: u32 = 0x0000_0010;
    pub const GOOD_DEC: u32 = 0x0000_0020;
    pub const GOOD_PMRA: u32 = 0x0000_0040;
    pub const GOOD_PMDEC: u32 = 0x0000_0080;

    pub const BAD_RA: u32 = 0x0000_0100;
    pub const BAD_DEC: u32 = 0x0000_0200;
    pub const BAD_PMRA: u32 = 0x0000_0400;
    pub const BAD_PMDEC: u32 = 0x0000_0800;

    pub const GOOD_G_MAG: u32 = 0x0000_1000;
    pub const GOOD_GBP_MAG: u32 = 0x0000_2000;
    pub const GOOD_GRP_MAG: u32 = 0x0000_4000;
    pub const GOOD_PARX: u32 = 0x0000_8000;

    pub const BAD_G_MAG: u32 = 0x0001_0000;
    pub const BAD_GBP_MAG: u32 = 0x0002_0000;
    pub const BAD_GRP_MAG: u32 = 0x0004_0000;
    pub const BAD_PARX: u32 = 0x0008_0000;

    /// `GOOD_RA | GOOD_DEC | GOOD_PMRA | GOOD_PMDEC | GOOD_PARX`.
    pub const GOOD_ASTROMETRY: u32 = 0x0000_80F0;
    pub const BAD_ASTROMETRY: u32 = 0x0008_0F00;
    pub const GOOD_PHOTOMETRY: u32 = 0x0000_7000;
    pub const BAD_PHOTOMETRY: u32 = 0x0007_0000;
}

/// Codec for `GaiaDR2` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaiaDr2;

#[inline]
fn packed_word(raw: &[u8]) -> u32 {
    LittleEndian::read_u32(&raw[COMMON_SIZE..RECORD_SIZE])
}

/// Parse a dotted version such as `"1.0.2"` into three components.
fn parse_version(version: &str) -> Option<[u32; 3]> {
    let mut out = [0u32; 3];
    let mut parts = version.trim().split('.');
    for slot in out.iter_mut() {
        match parts.next() {
            Some(p) => *slot = p.parse().ok()?,
            None => break,
        }
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

impl RecordCodec for GaiaDr2 {
    type Record = GaiaStar;

    const IDENTIFIERS: &'static [&'static str] = &[IDENTIFIER];
    const RECORD_SIZE: usize = RECORD_SIZE;

    fn from_metadata(metadata: &CatalogMetadata) -> XpsdResult<Self> {
        if let Some(version) = metadata.database_version.as_deref() {
            match parse_version(version) {
                Some(v) if v >= MIN_DATABASE_VERSION => {}
                _ => {
                    return Err(XpsdError::UnsupportedDatabaseVersion {
                        identifier: metadata.identifier.clone(),
                        version: version.to_string(),
                    })
                }
            }
        }
        Ok(Self)
    }

    fn identifier(&self) -> &str {
        IDENTIFIER
    }

    #[inline]
    fn flags(&self, raw: &[u8]) -> u32 {
        packed_word(raw) & FLAGS_MASK
    }

    #[inline]
    fn magnitude(&self, raw: &[u8]) -> f32 {
        gaia::mag_g(raw)
    }

    #[inline]
    fn offsets(&self, raw: &[u8]) -> (u32, u32) {
        gaia::offsets(raw)
    }

    #[inline]
    fn ra_correction(&self, raw: &[u8]) -> f64 {
        // Arithmetic shift sign-extends the top 12 bits.
        let dra = (packed_word(raw) as i32) >> DRA_SHIFT;
        dra as f64 / RA_CORRECTION_UNITS_PER_DEG
    }

    fn decode(&self, raw: &[u8], ra: f64, dec: f64) -> GaiaStar {
        gaia::decode_common(raw, ra, dec, self.flags(raw))
    }

    fn encode(&self, record: &GaiaStar, position: &QuantizedPosition, out: &mut Vec<u8>) {
        let mut buf = [0u8; RECORD_SIZE];
        gaia::encode_common(record, position, &mut buf);
        let dra = quantize_ra_correction(position.ra_correction, DRA_MIN, DRA_MAX);
        let word = ((dra as u32) << DRA_SHIFT) | (record.flags & FLAGS_MASK);
        LittleEndian::write_u32(&mut buf[COMMON_SIZE..RECORD_SIZE], word);
        out.extend_from_slice(&buf);
    }
}
