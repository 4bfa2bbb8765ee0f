//! Lambert conformal conic projection on the GRS80 ellipsoid.
//!
//! Forward and inverse equations follow Snyder, *Map Projections: A
//! Working Manual* (USGS PP 1395), equations 15-1 to 15-11. Output is in
//! metres.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use landwatch_geography_models::{BoundingBox, ProjectionKind};

use crate::SpatialError;

/// GRS80 semi-major axis in metres.
pub const GRS80_A: f64 = 6_378_137.0;

/// GRS80 inverse flattening.
pub const GRS80_INV_F: f64 = 298.257_222_101;

/// Closest a regional standard parallel may sit to the equator (degrees).
pub const MIN_CONE_LATITUDE: f64 = 1.0;

const INVERSE_TOLERANCE: f64 = 1e-12;
const INVERSE_MAX_ITERATIONS: usize = 15;

/// Defining parameters of a two-standard-parallel Lambert conic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertParams {
    /// First standard parallel (degrees).
    pub lat_1: f64,
    /// Second standard parallel (degrees).
    pub lat_2: f64,
    /// Latitude of origin (degrees).
    pub lat_0: f64,
    /// Central meridian (degrees).
    pub lon_0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl LambertParams {
    /// Statistics Canada Lambert, EPSG:3347.
    pub const STATCAN: Self = Self {
        lat_1: 49.0,
        lat_2: 77.0,
        lat_0: 63.390_675,
        lon_0: -91.866_666_666_666_66,
        false_easting: 6_200_000.0,
        false_northing: 3_000_000.0,
    };

    /// Conic fitted to a region: standard parallels at one sixth and five
    /// sixths of the latitude span, origin at the box centre.
    ///
    /// Two parallels on opposite sides of the equator (or both within
    /// [`MIN_CONE_LATITUDE`] of it) give a flat cone. Such boxes get a
    /// tangent cone on the parallel farthest from the equator, moved out
    /// to at least [`MIN_CONE_LATITUDE`].
    #[must_use]
    pub fn regional(bbox: &BoundingBox) -> Self {
        let sixth = bbox.height() / 6.0;
        let (mut lat_1, mut lat_2) = (bbox.south() + sixth, bbox.north() - sixth);

        let straddles = lat_1 < 0.0 && lat_2 > 0.0;
        if straddles || lat_1.abs().max(lat_2.abs()) < MIN_CONE_LATITUDE {
            let far = if lat_2.abs() >= lat_1.abs() { lat_2 } else { lat_1 };
            let tangent = if far.abs() < MIN_CONE_LATITUDE {
                MIN_CONE_LATITUDE.copysign(far)
            } else {
                far
            };
            lat_1 = tangent;
            lat_2 = tangent;
        }

        Self {
            lat_1,
            lat_2,
            lat_0: bbox.mid_latitude(),
            lon_0: f64::midpoint(bbox.west(), bbox.east()),
            false_easting: 0.0,
            false_northing: 0.0,
        }
    }
}

/// A ready-to-use projection with precomputed constants.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    params: LambertParams,
    e: f64,
    n: f64,
    a_f: f64,
    rho_0: f64,
}

impl Projection {
    /// Projection selected by `kind` for `region`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidProjection`] if the parameters do not
    /// define a usable cone.
    pub fn for_region(kind: ProjectionKind, region: &BoundingBox) -> Result<Self, SpatialError> {
        match kind {
            ProjectionKind::StatcanLambert => Self::new(LambertParams::STATCAN),
            ProjectionKind::Regional => Self::new(LambertParams::regional(region)),
        }
    }

    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidProjection`] if a parameter is
    /// non-finite, a standard parallel sits at a pole, or the parallels
    /// are symmetric about the equator (a cone of zero angle).
    pub fn new(params: LambertParams) -> Result<Self, SpatialError> {
        let LambertParams {
            lat_1,
            lat_2,
            lat_0,
            lon_0,
            false_easting,
            false_northing,
        } = params;

        if ![lat_1, lat_2, lat_0, lon_0, false_easting, false_northing]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(SpatialError::InvalidProjection {
                message: "non-finite parameter".to_string(),
            });
        }
        if lat_1.abs() >= 90.0 || lat_2.abs() >= 90.0 || lat_0.abs() >= 90.0 {
            return Err(SpatialError::InvalidProjection {
                message: "standard parallels and origin must lie strictly between the poles"
                    .to_string(),
            });
        }

        let f = 1.0 / GRS80_INV_F;
        let e = f.mul_add(-f, 2.0 * f).sqrt();

        let phi_1 = lat_1.to_radians();
        let phi_2 = lat_2.to_radians();
        let m_1 = m(phi_1, e);
        let m_2 = m(phi_2, e);
        let t_1 = t(phi_1, e);
        let t_2 = t(phi_2, e);

        let n = if (phi_1 - phi_2).abs() < 1e-10 {
            phi_1.sin()
        } else {
            (m_1.ln() - m_2.ln()) / (t_1.ln() - t_2.ln())
        };

        if !n.is_finite() || n.abs() < 1e-9 {
            return Err(SpatialError::InvalidProjection {
                message: format!("standard parallels {lat_1} and {lat_2} do not define a cone"),
            });
        }

        let a_f = GRS80_A * m_1 / (n * t_1.powf(n));
        let rho_0 = a_f * t(lat_0.to_radians(), e).powf(n);

        Ok(Self {
            params,
            e,
            n,
            a_f,
            rho_0,
        })
    }

    #[must_use]
    pub const fn params(&self) -> &LambertParams {
        &self.params
    }

    /// Projects `(longitude, latitude)` degrees to `(x, y)` metres.
    ///
    /// Results are non-finite for points the cone cannot represent (the
    /// pole opposite the apex).
    #[must_use]
    pub fn forward(&self, longitude: f64, latitude: f64) -> (f64, f64) {
        let rho = self.a_f * t(latitude.to_radians(), self.e).powf(self.n);
        let theta = self.n * normalize_lon(longitude - self.params.lon_0).to_radians();
        let x = rho.mul_add(theta.sin(), self.params.false_easting);
        let y = rho.mul_add(-theta.cos(), self.params.false_northing + self.rho_0);
        (x, y)
    }

    /// Converts `(x, y)` metres back to `(longitude, latitude)` degrees.
    #[must_use]
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.params.false_easting;
        let dy = self.rho_0 - (y - self.params.false_northing);
        let sign = self.n.signum();

        let rho = sign * dx.hypot(dy);
        let theta = (sign * dx).atan2(sign * dy);

        let lon = normalize_lon((theta / self.n).to_degrees() + self.params.lon_0);

        if rho == 0.0 {
            return (lon, 90.0 * sign);
        }

        let t_prime = (rho / self.a_f).powf(1.0 / self.n);
        let half_e = self.e / 2.0;
        let mut phi = 2.0f64.mul_add(-t_prime.atan(), FRAC_PI_2);

        for _ in 0..INVERSE_MAX_ITERATIONS {
            let es = self.e * phi.sin();
            let next = 2.0f64.mul_add(
                -(t_prime * ((1.0 - es) / (1.0 + es)).powf(half_e)).atan(),
                FRAC_PI_2,
            );
            let done = (next - phi).abs() < INVERSE_TOLERANCE;
            phi = next;
            if done {
                break;
            }
        }

        (lon, phi.to_degrees())
    }

    /// Point scale factor at a latitude.
    #[must_use]
    pub fn scale_factor(&self, latitude: f64) -> f64 {
        let phi = latitude.to_radians();
        let rho = self.a_f * t(phi, self.e).powf(self.n);
        rho * self.n / (GRS80_A * m(phi, self.e))
    }
}

fn m(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    phi.cos() / es.mul_add(-es, 1.0).sqrt()
}

fn t(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

/// Wraps a longitude difference into `[-180, 180)`.
fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statcan() -> Projection {
        Projection::new(LambertParams::STATCAN).unwrap()
    }

    #[test]
    fn statcan_forward_matches_reference() {
        let (x, y) = statcan().forward(-98.5, 52.0);
        assert!((x - 5_750_056.4006).abs() < 1.0, "x = {x}");
        assert!((y - 1_784_367.3118).abs() < 1.0, "y = {y}");
    }

    #[test]
    fn origin_projects_to_false_origin() {
        let p = statcan();
        let params = LambertParams::STATCAN;
        let (x, y) = p.forward(params.lon_0, params.lat_0);
        assert!((x - params.false_easting).abs() < 1e-6);
        assert!((y - params.false_northing).abs() < 1e-6);
    }

    #[test]
    fn scale_is_true_on_standard_parallels() {
        let p = statcan();
        assert!((p.scale_factor(49.0) - 1.0).abs() < 1e-9);
        assert!((p.scale_factor(77.0) - 1.0).abs() < 1e-9);
        assert!((p.scale_factor(52.0) - 0.98945).abs() < 1e-4);
    }

    #[test]
    fn inverse_round_trips() {
        let p = statcan();
        for &(lon, lat) in &[(-98.5, 52.0), (-102.0, 49.0), (-95.0, 55.0), (-60.0, 47.0), (-135.0, 68.0)] {
            let (x, y) = p.forward(lon, lat);
            let (lon2, lat2) = p.inverse(x, y);
            assert!((lon - lon2).abs() < 1e-9, "{lon} -> {lon2}");
            assert!((lat - lat2).abs() < 1e-9, "{lat} -> {lat2}");
        }
    }

    #[test]
    fn regional_fits_parallels_inside_box() {
        let bbox = BoundingBox::new(-124.0, 32.0, -114.0, 42.0).unwrap();
        let params = LambertParams::regional(&bbox);
        assert!((params.lat_1 - (32.0 + 10.0 / 6.0)).abs() < 1e-12);
        assert!((params.lat_2 - (42.0 - 10.0 / 6.0)).abs() < 1e-12);

        let p = Projection::for_region(ProjectionKind::Regional, &bbox).unwrap();
        let (x, y) = p.forward(-119.0, 37.0);
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);

        let (lon, lat) = p.inverse(p.forward(-121.3, 40.2).0, p.forward(-121.3, 40.2).1);
        assert!((lon - -121.3).abs() < 1e-9);
        assert!((lat - 40.2).abs() < 1e-9);
    }

    #[test]
    fn southern_hemisphere_cone_round_trips() {
        let bbox = BoundingBox::new(140.0, -40.0, 150.0, -30.0).unwrap();
        let p = Projection::for_region(ProjectionKind::Regional, &bbox).unwrap();
        let (x, y) = p.forward(146.0, -35.5);
        let (lon, lat) = p.inverse(x, y);
        assert!((lon - 146.0).abs() < 1e-9);
        assert!((lat - -35.5).abs() < 1e-9);
    }

    #[test]
    fn equatorial_box_gets_tangent_cone() {
        let bbox = BoundingBox::new(-10.0, -5.0, 10.0, 5.0).unwrap();
        let params = LambertParams::regional(&bbox);
        assert!((params.lat_1 - 10.0 / 3.0).abs() < 1e-12);
        assert!((params.lat_1 - params.lat_2).abs() < f64::EPSILON);

        let p = Projection::for_region(ProjectionKind::Regional, &bbox).unwrap();
        for &(lon, lat) in &[(0.0, 0.0), (-9.5, -4.8), (7.25, 3.1)] {
            let (x, y) = p.forward(lon, lat);
            let (lon2, lat2) = p.inverse(x, y);
            assert!((lon - lon2).abs() < 1e-9, "{lon} -> {lon2}");
            assert!((lat - lat2).abs() < 1e-9, "{lat} -> {lat2}");
        }
    }

    #[test]
    fn asymmetric_equator_crossing_uses_far_parallel() {
        let bbox = BoundingBox::new(20.0, -10.0, 40.0, 40.0).unwrap();
        let params = LambertParams::regional(&bbox);
        let far = 40.0 - 50.0 / 6.0;
        assert!((params.lat_1 - far).abs() < 1e-12);
        assert!((params.lat_2 - far).abs() < 1e-12);
        assert!(Projection::new(params).is_ok());
    }

    #[test]
    fn thin_equatorial_box_still_projects() {
        let bbox = BoundingBox::new(30.0, -1e-9, 31.0, 1e-9).unwrap();
        let params = LambertParams::regional(&bbox);
        assert!((params.lat_1 - MIN_CONE_LATITUDE).abs() < f64::EPSILON);

        let p = Projection::for_region(ProjectionKind::Regional, &bbox).unwrap();
        let (x, y) = p.forward(30.5, 0.0);
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-3);
    }

    #[test]
    fn rejects_degenerate_cones() {
        let symmetric = LambertParams {
            lat_1: -10.0,
            lat_2: 10.0,
            lat_0: 0.0,
            lon_0: 0.0,
            false_easting: 0.0,
            false_northing: 0.0,
        };
        assert!(Projection::new(symmetric).is_err());

        let polar = LambertParams {
            lat_1: 90.0,
            ..symmetric
        };
        assert!(Projection::new(polar).is_err());

        let nan = LambertParams {
            lon_0: f64::NAN,
            ..LambertParams::STATCAN
        };
        assert!(Projection::new(nan).is_err());
    }
}
