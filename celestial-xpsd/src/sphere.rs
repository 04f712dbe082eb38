//! Spherical geometry used by the index: angular separation, right ascension
//! normalization, the gnomonic (TAN) tangent-plane projection and bounding caps.
//!
//! Tangent-plane coordinates are standard coordinates (ξ, η) expressed in
//! degrees, i.e. `ξ_deg = ξ_rad * 180/π`. All angles at the API boundary are
//! degrees.

use std::f64::consts::PI;

pub const DEG_TO_RAD: f64 = PI / 180.0;
pub const RAD_TO_DEG: f64 = 180.0 / PI;

/// Angular distance between two points on the sphere using the Vincenty
/// formula. Accurate at all separations, including antipodes and tiny angles.
///
/// Returns the separation in degrees.
pub fn angular_separation_deg(ra1_deg: f64, dec1_deg: f64, ra2_deg: f64, dec2_deg: f64) -> f64 {
    let (d1_sin, d1_cos) = libm::sincos(dec1_deg * DEG_TO_RAD);
    let (d2_sin, d2_cos) = libm::sincos(dec2_deg * DEG_TO_RAD);
    let (dl_sin, dl_cos) = libm::sincos((ra2_deg - ra1_deg) * DEG_TO_RAD);

    let num = libm::sqrt(
        (d2_cos * dl_sin).powi(2) + (d1_cos * d2_sin - d1_sin * d2_cos * dl_cos).powi(2),
    );
    let den = d1_sin * d2_sin + d1_cos * d2_cos * dl_cos;

    libm::atan2(num, den) * RAD_TO_DEG
}

/// Fold a right ascension into `[0, 360)`.
#[inline]
pub fn normalize_ra(ra_deg: f64) -> f64 {
    let ra = ra_deg % 360.0;
    let ra = if ra < 0.0 { ra + 360.0 } else { ra };
    // -1e-17 % 360 + 360 rounds to exactly 360.0
    if ra >= 360.0 {
        0.0
    } else {
        ra
    }
}

/// Gnomonic projection about a fixed tangent point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gnomonic {
    ra0: f64,
    dec0: f64,
    sin_dec0: f64,
    cos_dec0: f64,
}

impl Gnomonic {
    pub fn new(ra0_deg: f64, dec0_deg: f64) -> Self {
        let (sin_dec0, cos_dec0) = libm::sincos(dec0_deg * DEG_TO_RAD);
        Self {
            ra0: normalize_ra(ra0_deg),
            dec0: dec0_deg,
            sin_dec0,
            cos_dec0,
        }
    }

    /// Tangent point as `(ra, dec)` in degrees.
    pub fn center(&self) -> (f64, f64) {
        (self.ra0, self.dec0)
    }

    /// Project `(ra, dec)` onto the tangent plane.
    ///
    /// Returns `None` for points 90° or more away from the tangent point,
    /// where the gnomonic projection is undefined.
    pub fn project(&self, ra_deg: f64, dec_deg: f64) -> Option<(f64, f64)> {
        let (sin_dec, cos_dec) = libm::sincos(dec_deg * DEG_TO_RAD);
        let (sin_dra, cos_dra) = libm::sincos((ra_deg - self.ra0) * DEG_TO_RAD);

        let cos_c = self.sin_dec0 * sin_dec + self.cos_dec0 * cos_dec * cos_dra;
        if cos_c <= 0.0 {
            return None;
        }

        let xi = cos_dec * sin_dra / cos_c;
        let eta = (self.cos_dec0 * sin_dec - self.sin_dec0 * cos_dec * cos_dra) / cos_c;
        Some((xi * RAD_TO_DEG, eta * RAD_TO_DEG))
    }

    /// Inverse projection from plane coordinates to `(ra, dec)` in degrees.
    ///
    /// Uses the two-argument arctangent form, which is exact at the tangent
    /// point and well defined at the poles, where RA collapses to a single
    /// value instead of wrapping.
    pub fn unproject(&self, x_deg: f64, y_deg: f64) -> (f64, f64) {
        let xi = x_deg * DEG_TO_RAD;
        let eta = y_deg * DEG_TO_RAD;

        let denom = self.cos_dec0 - eta * self.sin_dec0;
        let ra = self.ra0 + libm::atan2(xi, denom) * RAD_TO_DEG;
        let dec = libm::atan2(
            self.sin_dec0 + eta * self.cos_dec0,
            libm::sqrt(xi * xi + denom * denom),
        ) * RAD_TO_DEG;

        (normalize_ra(ra), dec)
    }
}

/// A circular region of the sphere: every point within `radius` degrees of
/// `(ra, dec)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalCap {
    pub ra: f64,
    pub dec: f64,
    pub radius: f64,
}

impl SphericalCap {
    /// Covers the whole sphere; used where no tighter bound is meaningful.
    pub const ALL_SKY: SphericalCap = SphericalCap {
        ra: 0.0,
        dec: 0.0,
        radius: 180.0,
    };

    /// Smallest cap around the rectangle's center that contains the
    /// tangent-plane rectangle `[x0, x1] × [y0, y1]`.
    ///
    /// Rectangle edges map to great-circle arcs, so a cap narrower than a
    /// hemisphere that holds the four corners holds the whole rectangle.
    pub fn enclosing_rect(proj: &Gnomonic, x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        let (ra, dec) = proj.unproject(0.5 * (x0 + x1), 0.5 * (y0 + y1));
        let radius = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)]
            .iter()
            .map(|&(x, y)| {
                let (cra, cdec) = proj.unproject(x, y);
                angular_separation_deg(ra, dec, cra, cdec)
            })
            .fold(0.0_f64, f64::max);

        if !radius.is_finite() || radius >= 90.0 {
            return Self::ALL_SKY;
        }
        Self { ra, dec, radius }
    }

    /// Conservative test: true if a query circle of `radius_deg` around
    /// `(ra, dec)` may intersect this cap.
    #[inline]
    pub fn may_intersect(&self, ra_deg: f64, dec_deg: f64, radius_deg: f64, tolerance: f64) -> bool {
        if self.radius >= 180.0 {
            return true;
        }
        angular_separation_deg(self.ra, self.dec, ra_deg, dec_deg)
            <= self.radius + radius_deg + tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angular_distance_same_point() {
        let dist = angular_separation_deg(0.0, 0.0, 0.0, 0.0);
        assert!(dist.abs() < 1e-12);
    }

    #[test]
    fn test_angular_distance_90_degrees() {
        let dist = angular_separation_deg(0.0, 0.0, 90.0, 0.0);
        assert!((dist - 90.0).abs() < 1e-10);
    }

    #[test]
    fn test_angular_distance_pole_to_equator() {
        let dist = angular_separation_deg(0.0, 90.0, 0.0, 0.0);
        assert!((dist - 90.0).abs() < 1e-10);
    }

    #[test]
    fn test_angular_distance_antipodes() {
        let dist = angular_separation_deg(0.0, 0.0, 180.0, 0.0);
        assert!((dist - 180.0).abs() < 1e-10);
    }

    #[test]
    fn test_angular_distance_across_ra_zero() {
        let dist = angular_separation_deg(359.5, 0.0, 0.5, 0.0);
        assert!((dist - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_normalize_ra() {
        assert_eq!(normalize_ra(0.0), 0.0);
        assert_eq!(normalize_ra(360.0), 0.0);
        assert!((normalize_ra(-0.5) - 359.5).abs() < 1e-12);
        assert!((normalize_ra(725.0) - 5.0).abs() < 1e-12);
        assert_eq!(normalize_ra(-1e-17), 0.0);
        let ra = normalize_ra(-1e-17);
        assert!((0.0..360.0).contains(&ra));
    }

    #[test]
    fn test_gnomonic_tangent_point() {
        let proj = Gnomonic::new(120.0, 35.0);
        let (x, y) = proj.project(120.0, 35.0).unwrap();
        assert!(x.abs() < 1e-12 && y.abs() < 1e-12);

        let (ra, dec) = proj.unproject(0.0, 0.0);
        assert!((ra - 120.0).abs() < 1e-12);
        assert!((dec - 35.0).abs() < 1e-12);
    }

    #[test]
    fn test_gnomonic_roundtrip() {
        let proj = Gnomonic::new(45.0, -20.0);
        for &(ra, dec) in &[(44.0, -21.0), (47.5, -18.25), (45.0, -19.0), (40.0, -25.0)] {
            let (x, y) = proj.project(ra, dec).unwrap();
            let (ra2, dec2) = proj.unproject(x, y);
            assert!(angular_separation_deg(ra, dec, ra2, dec2) < 1e-10);
        }
    }

    #[test]
    fn test_gnomonic_roundtrip_across_ra_zero() {
        let proj = Gnomonic::new(0.0, 0.0);
        let (x, y) = proj.project(359.0, 0.5).unwrap();
        assert!(x < 0.0);
        let (ra, dec) = proj.unproject(x, y);
        assert!((ra - 359.0).abs() < 1e-10);
        assert!((dec - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_gnomonic_near_pole() {
        let proj = Gnomonic::new(10.0, 89.9);
        let (x, y) = proj.project(190.0, 89.95).unwrap();
        let (ra, dec) = proj.unproject(x, y);
        assert!((dec - 89.95).abs() < 1e-9);
        assert!((ra - 190.0).abs() < 1e-6);

        // The pole itself unprojects to dec = 90 with a finite RA.
        let (px, py) = proj.project(0.0, 90.0).unwrap();
        let (pra, pdec) = proj.unproject(px, py);
        assert!((pdec - 90.0).abs() < 1e-9);
        assert!((0.0..360.0).contains(&pra));
    }

    #[test]
    fn test_gnomonic_opposite_hemisphere_is_undefined() {
        let proj = Gnomonic::new(0.0, 0.0);
        assert!(proj.project(180.0, 0.0).is_none());
        assert!(proj.project(90.0, 0.0).is_none());
    }

    #[test]
    fn test_cap_encloses_rect_corners() {
        let proj = Gnomonic::new(200.0, 60.0);
        let cap = SphericalCap::enclosing_rect(&proj, -1.0, -1.0, 1.0, 1.0);
        assert!(cap.radius > 1.0 && cap.radius < 1.5);
        let (ra, dec) = proj.unproject(1.0, -1.0);
        assert!(angular_separation_deg(cap.ra, cap.dec, ra, dec) <= cap.radius + 1e-12);
    }

    #[test]
    fn test_cap_intersection() {
        let cap = SphericalCap {
            ra: 10.0,
            dec: 0.0,
            radius: 1.0,
        };
        assert!(cap.may_intersect(11.5, 0.0, 0.6, 0.0));
        assert!(!cap.may_intersect(12.0, 0.0, 0.5, 1e-9));
        assert!(SphericalCap::ALL_SKY.may_intersect(123.0, -45.0, 0.001, 0.0));
    }
}
