use glam::DVec3;
use std::f64::consts::PI;

/// Radius of the globe sphere in scene units.
pub const GLOBE_RADIUS: f64 = 100.0;

/// Geographic position relative to the globe surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCoords {
    /// Latitude in degrees (-90 to 90)
    pub lat: f64,
    /// Longitude in degrees (-180 to 180)
    pub lng: f64,
    /// Altitude in units of globe radius (0 = on the surface)
    pub altitude: f64,
}

/// Map (lat, lng, relative altitude) onto the globe frame.
///
/// The frame is Y-up: the north pole sits on +Y and the prime meridian on +Z.
#[inline]
pub fn to_cartesian(lat: f64, lng: f64, relative_altitude: f64) -> DVec3 {
    let phi = (90.0 - lat).to_radians();
    let theta = (90.0 - lng).to_radians();
    let r = GLOBE_RADIUS * (1.0 + relative_altitude);
    DVec3::new(
        r * phi.sin() * theta.cos(),
        r * phi.cos(),
        r * phi.sin() * theta.sin(),
    )
}

/// Inverse of [`to_cartesian`].
pub fn to_geographic(point: DVec3) -> GeoCoords {
    let r = point.length();
    if r == 0.0 {
        return GeoCoords { lat: 0.0, lng: 0.0, altitude: -1.0 };
    }

    let phi = (point.y / r).clamp(-1.0, 1.0).acos();
    let theta = point.z.atan2(point.x);

    // theta below -90° would land past 180°, wrap it back
    let wrap = if theta < -PI / 2.0 { 360.0 } else { 0.0 };

    GeoCoords {
        lat: 90.0 - phi.to_degrees(),
        lng: 90.0 - theta.to_degrees() - wrap,
        altitude: r / GLOBE_RADIUS - 1.0,
    }
}

/// Scene units covered by one degree of arc on the globe surface.
#[inline(always)]
pub fn units_per_degree() -> f64 {
    2.0 * PI * GLOBE_RADIUS / 360.0
}
