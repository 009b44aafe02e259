//! Sun direction and position.
//!
//! The solar position uses the low-precision astronomical model built on
//! the mean anomaly and local sidereal time. It is accurate to a fraction
//! of a degree.

use std::f64::consts::PI;

use glam::DVec3;
use web_time::{SystemTime, UNIX_EPOCH};

/// Sun altitude above the horizon and azimuth clockwise from north, both in
/// degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunPosition {
    pub altitude: f64,
    pub azimuth: f64,
}

/// Light direction in map convention for a sun at `altitude` and `azimuth`
/// radians: `(-sin(az)·cos(alt), cos(az)·cos(alt), sin(alt))`.
///
/// The horizontal part is the direction the light travels across tile
/// space (y grows southward); the vertical part points up at the sun.
#[must_use]
pub fn sun_direction(altitude: f64, azimuth: f64) -> DVec3 {
    DVec3::new(
        -azimuth.sin() * altitude.cos(),
        azimuth.cos() * altitude.cos(),
        altitude.sin(),
    )
    .normalize()
}

const DAY_SECONDS: f64 = 86_400.0;
const J1970: f64 = 2_440_588.0;
const J2000: f64 = 2_451_545.0;
const OBLIQUITY: f64 = 23.4397 * PI / 180.0;

fn days_since_j2000(unix_seconds: f64) -> f64 {
    unix_seconds / DAY_SECONDS - 0.5 + J1970 - J2000
}

fn solar_mean_anomaly(days: f64) -> f64 {
    (357.5291 + 0.985_600_28 * days).to_radians()
}

fn ecliptic_longitude(mean_anomaly: f64) -> f64 {
    let m = mean_anomaly;
    let center = (1.9148 * m.sin() + 0.02 * (2.0 * m).sin() + 0.0003 * (3.0 * m).sin()).to_radians();
    let perihelion = 102.9372f64.to_radians();
    m + center + perihelion + PI
}

/// Solar position at `latitude`/`longitude` degrees and `unix_seconds`.
#[must_use]
pub fn sun_position_at(latitude: f64, longitude: f64, unix_seconds: f64) -> SunPosition {
    let days = days_since_j2000(unix_seconds);
    let phi = latitude.to_radians();
    let west = -longitude.to_radians();

    let lambda = ecliptic_longitude(solar_mean_anomaly(days));
    let declination = (lambda.sin() * OBLIQUITY.sin()).asin();
    let right_ascension = (lambda.sin() * OBLIQUITY.cos()).atan2(lambda.cos());

    let sidereal = (280.16 + 360.985_623_5 * days).to_radians() - west;
    let hour_angle = sidereal - right_ascension;

    // Azimuth measured from south, turning west.
    let azimuth_south = hour_angle
        .sin()
        .atan2(hour_angle.cos() * phi.sin() - declination.tan() * phi.cos());
    let altitude = (phi.sin() * declination.sin()
        + phi.cos() * declination.cos() * hour_angle.cos())
    .asin();

    SunPosition {
        altitude: altitude.to_degrees(),
        azimuth: azimuth_south.to_degrees() + 180.0,
    }
}

/// Solar position at `latitude`/`longitude` degrees right now.
#[must_use]
pub fn sun_position_now(latitude: f64, longitude: f64) -> SunPosition {
    let unix_seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64());
    sun_position_at(latitude, longitude, unix_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_components() {
        let d = sun_direction(0.0, 0.0);
        assert!((d - DVec3::Y).length() < 1e-12);

        let overhead = sun_direction(PI / 2.0, 1.0);
        assert!((overhead - DVec3::Z).length() < 1e-12);

        let east = sun_direction(0.0, PI / 2.0);
        assert!((east - DVec3::NEG_X).length() < 1e-12);
    }

    #[test]
    fn test_direction_is_unit() {
        for (alt, az) in [(0.3, 0.1), (1.2, 4.0), (0.01, 2.5)] {
            assert!((sun_direction(alt, az).length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_position_reference_value() {
        // 2013-03-05T00:00:00Z at 50.5N 30.5E.
        let position = sun_position_at(50.5, 30.5, 1_362_441_600.0);
        assert!((position.altitude - (-0.700_040_683_878_161_1f64).to_degrees()).abs() < 1e-6);
        assert!(
            (position.azimuth - ((-2.500_317_590_716_838_5f64).to_degrees() + 180.0)).abs() < 1e-6
        );
    }

    #[test]
    fn test_noon_sun_is_south_in_northern_hemisphere() {
        // 2024-06-21T12:00:00Z at 51.5N 0E.
        let position = sun_position_at(51.5, 0.0, 1_718_971_200.0);
        assert!(position.altitude > 55.0 && position.altitude < 65.0);
        assert!((position.azimuth - 180.0).abs() < 5.0);
    }
}
