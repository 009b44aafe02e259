//! Planar projected shadows.
//!
//! Every mesh of a placed model has a caster node in its tile's shadow
//! group. Each frame the caster's matrix becomes the planar projection of
//! its source mesh onto the ground plane along the sun light. Casters are
//! drawn with a stencil test so that overlapping shadows darken once.

use glam::{DMat4, DVec3, DVec4};

use crate::scene::{NodeKind, TileScene};

/// Stencil comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilFunc {
    Always,
    Equal,
}

/// Stencil operation applied when the stencil and depth tests pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOp {
    Keep,
    IncrementClamp,
}

/// Stencil state of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilState {
    pub func: StencilFunc,
    pub reference: u8,
    pub pass: StencilOp,
}

/// Material used to draw planar shadow casters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarShadowMaterial {
    pub opacity: f32,
    pub depth_write: bool,
    pub double_sided: bool,
    pub stencil: StencilState,
}

impl PlanarShadowMaterial {
    /// Black at `opacity`, depth write off, drawn only where the stencil
    /// buffer still holds zero and incremented on pass.
    #[must_use]
    pub fn new(opacity: f32) -> Self {
        Self {
            opacity,
            depth_write: false,
            double_sided: true,
            stencil: StencilState {
                func: StencilFunc::Equal,
                reference: 0,
                pass: StencilOp::IncrementClamp,
            },
        }
    }
}

impl Default for PlanarShadowMaterial {
    fn default() -> Self {
        Self::new(0.15)
    }
}

/// Projection of any point onto `plane` along the homogeneous light
/// position `light`.
///
/// For a directional light `light.w` is zero and `light.xyz` points toward
/// the light. The plane is `(n, d)` with `n · p + d = 0`.
#[must_use]
pub fn shadow_projection(light: DVec4, plane: DVec4) -> DMat4 {
    let dot = plane.dot(light);
    DMat4::from_cols(
        DVec4::X * dot - light * plane.x,
        DVec4::Y * dot - light * plane.y,
        DVec4::Z * dot - light * plane.z,
        DVec4::W * dot - light * plane.w,
    )
}

/// Light vector for a caster composed with scale-correction factor
/// `scale_unit`: `(L.x, L.y, -L.z / scale_unit)`.
///
/// `sun_direction` uses the map convention of [`crate::sun::sun_direction`].
#[must_use]
pub fn caster_light(sun_direction: DVec3, scale_unit: f64) -> DVec3 {
    DVec3::new(sun_direction.x, sun_direction.y, -sun_direction.z / scale_unit)
}

/// Matrix flattening geometry onto the plane `z = plane_z` along
/// `light`, a caster light from [`caster_light`].
#[must_use]
pub fn planar_shadow_matrix(light: DVec3, plane_z: f64) -> DMat4 {
    let toward_light = (-light).extend(0.0);
    shadow_projection(toward_light, DVec4::new(0.0, 0.0, 1.0, -plane_z))
}

/// Recompute every caster of `tile` for the current sun.
///
/// Source world matrices must be current.
pub fn update_casters(tile: &mut TileScene, sun_direction: DVec3) {
    let casters = tile.casters().to_vec();
    for id in casters {
        let NodeKind::ShadowCaster {
            source, scale_unit, ..
        } = tile.scene.node(id).kind
        else {
            continue;
        };
        let source_world = tile.scene.node(source).world_matrix();
        let visible = tile.scene.is_visible(source);
        let matrix = planar_shadow_matrix(caster_light(sun_direction, scale_unit), 0.0) * source_world;

        let node = tile.scene.node_mut(id);
        node.set_matrix(matrix);
        node.visible = visible;
    }
    tile.scene.update_world_matrices();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sun::sun_direction;

    #[test]
    fn test_points_land_on_plane() {
        let sun = sun_direction(35f64.to_radians(), 120f64.to_radians());
        let m = planar_shadow_matrix(caster_light(sun, 1.0), 0.0);
        for p in [DVec3::new(3.0, -2.0, 10.0), DVec3::new(0.0, 0.0, 0.0), DVec3::new(5.0, 5.0, 1.0)] {
            let shadow = m.project_point3(p);
            assert!(shadow.z.abs() < 1e-9);
        }
    }

    #[test]
    fn test_offset_is_height_times_light_slope() {
        let sun = sun_direction(40f64.to_radians(), 200f64.to_radians());
        let k = 3.0;
        let light = caster_light(sun, k);
        let toward = -light;
        let m = planar_shadow_matrix(light, 0.0);

        let h = 12.0;
        let source = DVec3::new(100.0, 50.0, h);
        let shadow = m.project_point3(source);

        let expected = h * toward.truncate() / toward.z;
        assert!(((source.truncate() - shadow.truncate()) - expected).length() < 1e-9);
    }

    #[test]
    fn test_shadow_falls_away_from_sun() {
        // Sun due north at 45 degrees. Tile y grows southward.
        let sun = sun_direction(45f64.to_radians(), 0.0);
        let m = planar_shadow_matrix(caster_light(sun, 1.0), 0.0);
        let shadow = m.project_point3(DVec3::new(0.0, 0.0, 10.0));
        assert!(shadow.x.abs() < 1e-9);
        assert!((shadow.y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_unit_stretches_offset() {
        let sun = sun_direction(45f64.to_radians(), 0.0);
        let m = planar_shadow_matrix(caster_light(sun, 4.0), 0.0);
        let shadow = m.project_point3(DVec3::new(0.0, 0.0, 10.0));
        assert!((shadow.y - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_ground_points_are_fixed() {
        let sun = sun_direction(20f64.to_radians(), 75f64.to_radians());
        let m = planar_shadow_matrix(caster_light(sun, 2.0), 0.0);
        let p = DVec3::new(7.0, -3.0, 0.0);
        assert!((m.project_point3(p) - p).length() < 1e-9);
    }

    #[test]
    fn test_default_material() {
        let material = PlanarShadowMaterial::default();
        assert!((material.opacity - 0.15).abs() < f32::EPSILON);
        assert!(!material.depth_write);
        assert_eq!(material.stencil.func, StencilFunc::Equal);
        assert_eq!(material.stencil.reference, 0);
        assert_eq!(material.stencil.pass, StencilOp::IncrementClamp);
    }
}
