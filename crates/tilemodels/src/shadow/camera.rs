//! The host map's camera model and the shadow camera derived from it.
//!
//! The host builds its view-projection from a perspective frustum placed
//! `camera_to_center_distance` pixels from the map center, tilted by pitch
//! and turned by bearing. The shadow camera reuses that model with the sun
//! standing in for the viewer: the sun altitude replaces the pitch and the
//! sun azimuth replaces the bearing.

use glam::{DMat4, DVec2, DVec3};

/// Parameters of the host camera, all angles in radians and distances in
/// world pixels unless noted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    /// Vertical field of view.
    pub fov: f64,
    /// Viewport width in pixels.
    pub width: f64,
    /// Viewport height in pixels.
    pub height: f64,
    pub near: f64,
    pub far: f64,
    pub camera_to_center_distance: f64,
    pub roll: f64,
    pub pitch: f64,
    pub bearing: f64,
    /// Map center in world pixels.
    pub center: DVec2,
    /// World pixels per meter at the center latitude.
    pub pixels_per_meter: f64,
    /// Center elevation in meters.
    pub elevation: f64,
    /// Center-of-perspective offset in pixels.
    pub center_offset: DVec2,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            fov: 0.6435,
            width: 512.0,
            height: 512.0,
            near: 1.0,
            far: 1000.0,
            camera_to_center_distance: 512.0,
            roll: 0.0,
            pitch: 0.0,
            bearing: 0.0,
            center: DVec2::ZERO,
            pixels_per_meter: 1.0,
            elevation: 0.0,
            center_offset: DVec2::ZERO,
        }
    }
}

/// Build the host view-projection for `params`.
#[must_use]
pub fn host_camera_matrix(params: &CameraParams) -> DMat4 {
    let aspect = params.width / params.height;
    let mut projection = DMat4::perspective_rh_gl(params.fov, aspect, params.near, params.far);
    projection.z_axis.x = -params.center_offset.x * 2.0 / params.width;
    projection.z_axis.y = params.center_offset.y * 2.0 / params.height;

    projection
        * DMat4::from_scale(DVec3::new(1.0, -1.0, 1.0))
        * DMat4::from_translation(DVec3::new(0.0, 0.0, -params.camera_to_center_distance))
        * DMat4::from_rotation_z(-params.roll)
        * DMat4::from_rotation_x(params.pitch)
        * DMat4::from_rotation_z(-params.bearing)
        * DMat4::from_translation(DVec3::new(-params.center.x, -params.center.y, 0.0))
        * DMat4::from_scale(DVec3::new(1.0, 1.0, params.pixels_per_meter))
        * DMat4::from_translation(DVec3::new(0.0, 0.0, -params.elevation))
}

/// View-projection of the shadow camera for a sun at `altitude` and
/// `azimuth` degrees.
#[must_use]
pub fn shadow_view_projection(camera: &CameraParams, altitude: f64, azimuth: f64) -> DMat4 {
    let params = CameraParams {
        pitch: altitude.to_radians(),
        bearing: azimuth.to_radians(),
        ..*camera
    };
    host_camera_matrix(&params)
}
