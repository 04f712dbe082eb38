//! Gaia EDR3 / DR3 records: 32 bytes with a separate `i16` RA correction
//! (bytes 26..28, 0.01 mas) and a full 32-bit flag word (bytes 28..32).

use byteorder::{ByteOrder, LittleEndian};

use super::gaia::{self, GaiaStar, COMMON_SIZE};
use super::{quantize_ra_correction, QuantizedPosition, RecordCodec, RA_CORRECTION_UNITS_PER_DEG};
use crate::error::XpsdResult;
use crate::format::CatalogMetadata;

pub const IDENTIFIER_DR3: &str = "GaiaDR3";
pub const IDENTIFIER_EDR3: &str = "GaiaEDR3";
/// Point-source records only. Files carrying BP/RP mean spectra use a wider
/// record and fail the record size check on open.
pub const RECORD_SIZE: usize = 32;

/// Gaia EDR3 / DR3 data availability and quality flags.
pub mod flags {
    pub use crate::codec::gaia::flags::{LACKING_DATA, NO_GBP_MAG, NO_GRP_MAG, NO_PM};

    /// Standard error of right ascension < 0.13 mas.
    pub const GOLD_RA: u32 = 0x0000_0010;
    pub const GOLD_DEC: u32 = 0x0000_0020;
    pub const GOLD_PMRA: u32 = 0x0000_0040;
    pub const GOLD_PMDEC: u32 = 0x0000_0080;

    pub const SILVER_RA: u32 = 0x0000_0100;
    pub const SILVER_DEC: u32 = 0x0000_0200;
    pub const SILVER_PMRA: u32 = 0x0000_0400;
    pub const SILVER_PMDEC: u32 = 0x0000_0800;

    pub const BRONZE_RA: u32 = 0x0000_1000;
    pub const BRONZE_DEC: u32 = 0x0000_2000;
    pub const BRONZE_PMRA: u32 = 0x0000_4000;
    pub const BRONZE_PMDEC: u32 = 0x0000_8000;

    pub const GOLD_G_MAG: u32 = 0x0001_0000;
    pub const GOLD_GBP_MAG: u32 = 0x0002_0000;
    pub const GOLD_GRP_MAG: u32 = 0x0004_0000;
    pub const GOLD_PARX: u32 = 0x0008_0000;

    pub const SILVER_G_MAG: u32 = 0x0010_0000;
    pub const SILVER_GBP_MAG: u32 = 0x0020_0000;
    pub const SILVER_GRP_MAG: u32 = 0x0040_0000;
    pub const SILVER_PARX: u32 = 0x0080_0000;

    pub const BRONZE_G_MAG: u32 = 0x0100_0000;
    pub const BRONZE_GBP_MAG: u32 = 0x0200_0000;
    pub const BRONZE_GRP_MAG: u32 = 0x0400_0000;
    pub const BRONZE_PARX: u32 = 0x0800_0000;

    /// BP-RP excess factor >= 2.0. The stored mask also carries bit 3.
    pub const BP_RP_EXCESS: u32 = 0x1000_0008;
    /// BP-RP excess factor >= 5.0.
    pub const BP_RP_EXCESS_HIGH: u32 = 0x2000_0000;

    pub const GOLD_ASTROMETRY: u32 = 0x0008_00F0;
    pub const SILVER_ASTROMETRY: u32 = 0x0080_0F00;
    pub const BRONZE_ASTROMETRY: u32 = 0x0800_F000;

    pub const GOLD_PHOTOMETRY: u32 = 0x0007_0000;
    pub const SILVER_PHOTOMETRY: u32 = 0x0070_0000;
    pub const BRONZE_PHOTOMETRY: u32 = 0x0700_0000;
}

/// Codec for `GaiaDR3` and `GaiaEDR3` files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaiaDr3 {
    early: bool,
}

impl GaiaDr3 {
    pub fn dr3() -> Self {
        Self { early: false }
    }

    pub fn edr3() -> Self {
        Self { early: true }
    }

    pub fn is_early_release(&self) -> bool {
        self.early
    }
}

impl Default for GaiaDr3 {
    fn default() -> Self {
        Self::dr3()
    }
}

impl RecordCodec for GaiaDr3 {
    type Record = GaiaStar;

    const IDENTIFIERS: &'static [&'static str] = &[IDENTIFIER_DR3, IDENTIFIER_EDR3];
    const RECORD_SIZE: usize = RECORD_SIZE;

    fn from_metadata(metadata: &CatalogMetadata) -> XpsdResult<Self> {
        Ok(Self {
            early: metadata.identifier == IDENTIFIER_EDR3,
        })
    }

    fn identifier(&self) -> &str {
        if self.early {
            IDENTIFIER_EDR3
        } else {
            IDENTIFIER_DR3
        }
    }

    #[inline]
    fn flags(&self, raw: &[u8]) -> u32 {
        LittleEndian::read_u32(&raw[28..32])
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
        LittleEndian::read_i16(&raw[COMMON_SIZE..28]) as f64 / RA_CORRECTION_UNITS_PER_DEG
    }

    fn decode(&self, raw: &[u8], ra: f64, dec: f64) -> GaiaStar {
        gaia::decode_common(raw, ra, dec, self.flags(raw))
    }

    fn encode(&self, record: &GaiaStar, position: &QuantizedPosition, out: &mut Vec<u8>) {
        let mut buf = [0u8; RECORD_SIZE];
        gaia::encode_common(record, position, &mut buf);
        let dra = quantize_ra_correction(
            position.ra_correction,
            i16::MIN as i32,
            i16::MAX as i32,
        );
        LittleEndian::write_i16(&mut buf[COMMON_SIZE..28], dra as i16);
        LittleEndian::write_u32(&mut buf[28..32], record.flags);
        out.extend_from_slice(&buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Compression;

    fn metadata(identifier: &str) -> CatalogMetadata {
        CatalogMetadata {
            identifier: identifier.to_string(),
            database_version: Some("1.0.0".to_string()),
            record_size: RECORD_SIZE,
            compression: Compression::None,
            magnitude_low: 10.0,
            magnitude_high: 15.0,
        }
    }

    #[test]
    fn test_release_from_identifier() {
        let dr3 = GaiaDr3::from_metadata(&metadata(IDENTIFIER_DR3)).unwrap();
        assert!(!dr3.is_early_release());
        assert_eq!(dr3.identifier(), "GaiaDR3");

        let edr3 = GaiaDr3::from_metadata(&metadata(IDENTIFIER_EDR3)).unwrap();
        assert!(edr3.is_early_release());
        assert_eq!(edr3.identifier(), "GaiaEDR3");
    }

    #[test]
    fn test_encode_decode_record() {
        let codec = GaiaDr3::dr3();
        let star = GaiaStar {
            ra: 0.0,
            dec: 0.0,
            parallax: 0.75,
            pmra: -1.0,
            pmdec: 2.0,
            mag_g: 18.25,
            mag_bp: 18.9,
            mag_rp: 17.6,
            flags: flags::BRONZE_ASTROMETRY | flags::BP_RP_EXCESS_HIGH,
        };
        let pos = QuantizedPosition {
            dx: 42,
            dy: 4_000_000_000,
            ra_correction: -12_345.0 / RA_CORRECTION_UNITS_PER_DEG,
        };
        let mut out = Vec::new();
        codec.encode(&star, &pos, &mut out);
        assert_eq!(out.len(), RECORD_SIZE);

        assert_eq!(codec.offsets(&out), (42, 4_000_000_000));
        assert_eq!(codec.flags(&out), star.flags);
        assert!((codec.ra_correction(&out) * RA_CORRECTION_UNITS_PER_DEG + 12_345.0).abs() < 1e-6);
        assert_eq!(LittleEndian::read_i16(&out[26..28]), -12_345);

        let back = codec.decode(&out, 1.0, 2.0);
        assert_eq!(back.pmra, -1.0);
        assert!((back.mag_g - 18.25).abs() < 6e-4);
        assert_eq!(back.flags, star.flags);
    }

    #[test]
    fn test_high_flag_bits_survive() {
        let codec = GaiaDr3::edr3();
        let mut star = GaiaStar::new(0.0, 0.0, 12.0);
        star.flags = 0xF000_0000 | flags::NO_PM;
        let pos = QuantizedPosition {
            dx: 0,
            dy: 0,
            ra_correction: 0.0,
        };
        let mut out = Vec::new();
        codec.encode(&star, &pos, &mut out);
        assert_eq!(codec.flags(&out), 0xF000_0001);
        assert_eq!(codec.ra_correction(&out), 0.0);
    }
}
