//! Record type and field layout shared by the Gaia codecs.
//!
//! DR2, EDR3 and DR3 records agree on their first 26 bytes:
//!
//! | bytes | field | encoding |
//! |-------|-------|----------|
//! | 0..4 | dx | u32, 0.002 mas from the leaf origin |
//! | 4..8 | dy | u32, 0.002 mas from the leaf origin |
//! | 8..12 | parallax | f32, mas |
//! | 12..16 | pmra | f32, mas/yr (μα·cosδ) |
//! | 16..20 | pmdec | f32, mas/yr |
//! | 20..22 | G | u16, `(mag + 1.5) * 1000` |
//! | 22..24 | G_BP | u16, same |
//! | 24..26 | G_RP | u16, same |
//!
//! They differ only in how the right ascension correction and the flags are
//! packed after that.

use byteorder::{ByteOrder, LittleEndian};

use super::{decode_magnitude, encode_magnitude, QuantizedPosition};
use crate::search::{PointSource, SortBy};

/// Bytes shared by every Gaia record layout.
pub const COMMON_SIZE: usize = 26;

/// Data availability flags with the same meaning in every Gaia release.
pub mod flags {
    /// No proper motions and parallax available.
    pub const NO_PM: u32 = 0x0000_0001;
    /// No G_BP magnitude available.
    pub const NO_GBP_MAG: u32 = 0x0000_0002;
    /// No G_RP magnitude available.
    pub const NO_GRP_MAG: u32 = 0x0000_0004;
    /// `NO_PM | NO_GBP_MAG | NO_GRP_MAG`.
    pub const LACKING_DATA: u32 = 0x0000_0007;
}

/// A decoded Gaia point source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaiaStar {
    /// Right ascension in degrees, `[0, 360)`.
    pub ra: f64,
    /// Declination in degrees.
    pub dec: f64,
    /// Parallax, mas.
    pub parallax: f32,
    /// Proper motion in right ascension (μα·cosδ), mas/yr.
    pub pmra: f32,
    /// Proper motion in declination, mas/yr.
    pub pmdec: f32,
    pub mag_g: f32,
    pub mag_bp: f32,
    pub mag_rp: f32,
    pub flags: u32,
}

impl GaiaStar {
    /// A star with only a position and G magnitude; everything else is
    /// flagged as unavailable.
    pub fn new(ra: f64, dec: f64, mag_g: f32) -> Self {
        Self {
            ra,
            dec,
            parallax: 0.0,
            pmra: 0.0,
            pmdec: 0.0,
            mag_g,
            mag_bp: 0.0,
            mag_rp: 0.0,
            flags: flags::LACKING_DATA,
        }
    }

    pub fn has_proper_motion(&self) -> bool {
        self.flags & flags::NO_PM == 0
    }

    pub fn has_bp(&self) -> bool {
        self.flags & flags::NO_GBP_MAG == 0
    }

    pub fn has_rp(&self) -> bool {
        self.flags & flags::NO_GRP_MAG == 0
    }
}

impl PointSource for GaiaStar {
    fn ra(&self) -> f64 {
        self.ra
    }

    fn dec(&self) -> f64 {
        self.dec
    }

    fn magnitude(&self) -> f32 {
        self.mag_g
    }

    fn sort_key(&self, by: SortBy) -> Option<f64> {
        match by {
            SortBy::None => None,
            SortBy::Ra => Some(self.ra),
            SortBy::Dec => Some(self.dec),
            SortBy::G => Some(self.mag_g as f64),
            SortBy::Bp => Some(self.mag_bp as f64),
            SortBy::Rp => Some(self.mag_rp as f64),
            SortBy::Parallax => Some(self.parallax as f64),
        }
    }
}

#[inline]
pub(crate) fn offsets(raw: &[u8]) -> (u32, u32) {
    (
        LittleEndian::read_u32(&raw[0..4]),
        LittleEndian::read_u32(&raw[4..8]),
    )
}

#[inline]
pub(crate) fn mag_g(raw: &[u8]) -> f32 {
    decode_magnitude(LittleEndian::read_u16(&raw[20..22]))
}

/// Decode the shared fields once the final position is known.
pub(crate) fn decode_common(raw: &[u8], ra: f64, dec: f64, flags: u32) -> GaiaStar {
    GaiaStar {
        ra,
        dec,
        parallax: LittleEndian::read_f32(&raw[8..12]),
        pmra: LittleEndian::read_f32(&raw[12..16]),
        pmdec: LittleEndian::read_f32(&raw[16..20]),
        mag_g: decode_magnitude(LittleEndian::read_u16(&raw[20..22])),
        mag_bp: decode_magnitude(LittleEndian::read_u16(&raw[22..24])),
        mag_rp: decode_magnitude(LittleEndian::read_u16(&raw[24..26])),
        flags,
    }
}

/// Fill the shared fields of `buf`.
pub(crate) fn encode_common(star: &GaiaStar, position: &QuantizedPosition, buf: &mut [u8]) {
    LittleEndian::write_u32(&mut buf[0..4], position.dx);
    LittleEndian::write_u32(&mut buf[4..8], position.dy);
    LittleEndian::write_f32(&mut buf[8..12], star.parallax);
    LittleEndian::write_f32(&mut buf[12..16], star.pmra);
    LittleEndian::write_f32(&mut buf[16..20], star.pmdec);
    LittleEndian::write_u16(&mut buf[20..22], encode_magnitude(star.mag_g));
    LittleEndian::write_u16(&mut buf[22..24], encode_magnitude(star.mag_bp));
    LittleEndian::write_u16(&mut buf[24..26], encode_magnitude(star.mag_rp));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_field_layout() {
        let star = GaiaStar {
            ra: 10.0,
            dec: 20.0,
            parallax: 1.25,
            pmra: -3.5,
            pmdec: 7.75,
            mag_g: 12.0,
            mag_bp: 12.5,
            mag_rp: 11.5,
            flags: 0,
        };
        let pos = QuantizedPosition {
            dx: 0x0102_0304,
            dy: 7,
            ra_correction: 0.0,
        };
        let mut buf = [0u8; COMMON_SIZE];
        encode_common(&star, &pos, &mut buf);

        assert_eq!(&buf[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(offsets(&buf), (0x0102_0304, 7));
        assert_eq!(LittleEndian::read_u16(&buf[20..22]), 13500);
        assert_eq!(mag_g(&buf), decode_magnitude(13500));

        let back = decode_common(&buf, 10.0, 20.0, 0);
        assert_eq!(back.parallax, 1.25);
        assert_eq!(back.pmra, -3.5);
        assert_eq!(back.pmdec, 7.75);
        assert!((back.mag_bp - 12.5).abs() < 1e-3);
        assert!((back.mag_rp - 11.5).abs() < 1e-3);
    }

    #[test]
    fn test_availability_flags() {
        let mut star = GaiaStar::new(1.0, 2.0, 10.0);
        assert!(!star.has_proper_motion());
        assert!(!star.has_bp());
        assert!(!star.has_rp());
        star.flags = flags::NO_GRP_MAG;
        assert!(star.has_proper_motion());
        assert!(star.has_bp());
        assert!(!star.has_rp());
    }

    #[test]
    fn test_sort_keys() {
        let mut star = GaiaStar::new(1.0, 2.0, 10.0);
        star.parallax = 4.0;
        star.mag_bp = 10.5;
        assert_eq!(star.sort_key(SortBy::Parallax), Some(4.0));
        assert_eq!(star.sort_key(SortBy::Bp), Some(10.5));
        assert_eq!(star.sort_key(SortBy::None), None);
    }
}
