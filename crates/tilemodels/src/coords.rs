//! Coordinate conversion between tile-local, geographic and world space.
//!
//! Tile-local coordinates address a point inside a Web Mercator tile using
//! the fixed [`EXTENT`] grid, with y growing southward. World space is the
//! host's Mercator pixel space, `world_size` pixels across at the current
//! zoom.

use std::f64::consts::PI;

use glam::{DMat4, DVec2, DVec3};

use crate::types::TileId;

pub use tilemodels_decode::EXTENT;

/// WGS84 equatorial radius in meters.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Equatorial circumference in meters.
pub const EARTH_CIRCUMFERENCE: f64 = 2.0 * PI * EARTH_RADIUS;

/// Latitude limit of the Web Mercator projection, in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Deepest zoom the engine addresses.
pub const MAX_ZOOM: u8 = 24;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

fn tiles_at(z: u8) -> f64 {
    f64::from(z).exp2()
}

/// Convert a tile-local position to latitude and longitude.
#[must_use]
pub fn tile_local_to_lat_lon(tile: TileId, local: DVec2) -> LatLon {
    let n = tiles_at(tile.z);
    let gx = (f64::from(tile.x) + local.x / EXTENT) / n;
    let gy = (f64::from(tile.y) + local.y / EXTENT) / n;

    let lon = gx * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * gy)).sinh().atan().to_degrees();
    LatLon { lat, lon }
}

/// Convert latitude and longitude to the containing tile at `z` and the
/// tile-local position inside it.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn lat_lon_to_tile_local(z: u8, position: LatLon) -> (TileId, DVec2) {
    let n = tiles_at(z);
    let lat = position.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();

    let gx = (position.lon + 180.0) / 360.0 * n;
    let gy = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * n;

    let tx = gx.floor().clamp(0.0, n - 1.0);
    let ty = gy.floor().clamp(0.0, n - 1.0);
    let tile = TileId::new(z, tx as u32, ty as u32);
    (tile, DVec2::new((gx - tx) * EXTENT, (gy - ty) * EXTENT))
}

/// Ground distance in meters covered by one extent unit at `lat` and `z`.
///
/// Strictly decreasing in `z` and proportional to `cos(lat)`.
#[must_use]
pub fn meters_per_extent_unit(lat: f64, z: u8) -> f64 {
    EARTH_CIRCUMFERENCE * lat.to_radians().cos() / (tiles_at(z) * EXTENT)
}

/// Extent units covering one meter at `lat` and `z`.
///
/// This is the scale-correction factor applied to models authored in
/// meters so that their footprint is metrically correct in tile space.
#[must_use]
pub fn extent_units_per_meter(lat: f64, z: u8) -> f64 {
    1.0 / meters_per_extent_unit(lat, z)
}

/// Round a fractional render zoom and clamp it into `[min, max]`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_zoom(min: u8, max: u8, zoom: f64) -> u8 {
    let rounded = zoom.round().clamp(0.0, f64::from(u8::MAX));
    (rounded as u8).clamp(min, max)
}

/// Matrix taking a tile's extent coordinates to host world pixels.
///
/// `T(x·s, y·s, 0) × S(s/EXTENT, s/EXTENT, 1)` where `s = world_size / 2^z`.
/// The z axis is left in meters.
#[must_use]
pub fn tile_world_matrix(tile: TileId, world_size: f64) -> DMat4 {
    let scale = world_size / tiles_at(tile.z);
    DMat4::from_translation(DVec3::new(
        f64::from(tile.x) * scale,
        f64::from(tile.y) * scale,
        0.0,
    )) * DMat4::from_scale(DVec3::new(scale / EXTENT, scale / EXTENT, 1.0))
}

/// Project a geographic position to host world pixels.
#[must_use]
pub fn project_to_world(world_size: f64, position: LatLon) -> DVec2 {
    let lat = position.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (position.lon + 180.0) / 360.0;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0;
    DVec2::new(x * world_size, y * world_size)
}

/// Host pixels per meter at `lat` for a world of `world_size` pixels.
#[must_use]
pub fn pixels_per_meter(lat: f64, world_size: f64) -> f64 {
    world_size / (EARTH_CIRCUMFERENCE * lat.to_radians().cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tile_origin_is_north_west_corner() {
        let position = tile_local_to_lat_lon(TileId::new(0, 0, 0), DVec2::ZERO);
        assert!((position.lon + 180.0).abs() < 1e-9);
        assert!((position.lat - MAX_LATITUDE).abs() < 1e-6);
    }

    #[test]
    fn test_tile_center_at_zoom_one() {
        let position = tile_local_to_lat_lon(TileId::new(1, 1, 1), DVec2::ZERO);
        assert!(position.lat.abs() < 1e-9);
        assert!(position.lon.abs() < 1e-9);
    }

    #[test]
    fn test_meters_per_extent_unit_decreases_with_zoom() {
        for z in 0..22 {
            assert!(meters_per_extent_unit(21.0, z) > meters_per_extent_unit(21.0, z + 1));
        }
        let ratio = meters_per_extent_unit(16.0, 16) / meters_per_extent_unit(16.0, 17);
        assert!((ratio - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_meters_per_extent_unit_scales_with_cos_lat() {
        let equator = meters_per_extent_unit(0.0, 17);
        let sixty = meters_per_extent_unit(60.0, 17);
        assert!((sixty / equator - 0.5).abs() < 1e-12);
        assert!((extent_units_per_meter(60.0, 17) * sixty - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_zoom() {
        assert_eq!(clamp_zoom(16, 19, 14.2), 16);
        assert_eq!(clamp_zoom(16, 19, 17.4), 17);
        assert_eq!(clamp_zoom(16, 19, 17.6), 18);
        assert_eq!(clamp_zoom(16, 19, 22.0), 19);
        assert_eq!(clamp_zoom(16, 19, -3.0), 16);
    }

    #[test]
    fn test_tile_world_matrix_maps_corners() {
        let tile = TileId::new(2, 1, 3);
        let world_size = 1024.0;
        let m = tile_world_matrix(tile, world_size);
        let origin = m.transform_point3(DVec3::ZERO);
        let corner = m.transform_point3(DVec3::new(EXTENT, EXTENT, 5.0));
        assert!((origin - DVec3::new(256.0, 768.0, 0.0)).length() < 1e-9);
        assert!((corner - DVec3::new(512.0, 1024.0, 5.0)).length() < 1e-9);
    }

    #[test]
    fn test_project_to_world_matches_tile_matrix() {
        let tile = TileId::new(17, 104_000, 57_000);
        let local = DVec2::new(1000.0, 7000.0);
        let world_size = 512.0 * f64::from(1u32 << 17);
        let position = tile_local_to_lat_lon(tile, local);
        let projected = project_to_world(world_size, position);
        let expected = tile_world_matrix(tile, world_size).transform_point3(local.extend(0.0));
        assert!((projected - expected.truncate()).length() < 1e-4);
    }

    #[test]
    fn test_deep_zoom_does_not_overflow() {
        let (tile, local) = lat_lon_to_tile_local(32, LatLon::new(48.85, 2.29));
        assert_eq!(tile.z, 32);
        assert!((0.0..EXTENT).contains(&local.x));
        assert!((0.0..EXTENT).contains(&local.y));
        assert!(meters_per_extent_unit(48.85, 40) > 0.0);
    }

    proptest! {
        #[test]
        fn local_round_trip(
            z in 10u8..20,
            fx in 0.0f64..1.0,
            fy in 0.0f64..1.0,
            lx in 0.5f64..8191.5,
            ly in 0.5f64..8191.5,
        ) {
            let n = f64::from(1u32 << z);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let tile = TileId::new(z, (fx * (n - 1.0)) as u32, (fy * (n - 1.0)) as u32);
            let local = DVec2::new(lx, ly);

            let position = tile_local_to_lat_lon(tile, local);
            let (back_tile, back_local) = lat_lon_to_tile_local(z, position);

            prop_assert_eq!(back_tile, tile);
            prop_assert!((back_local - local).length() < 1e-3);
        }
    }
}
