//! Ray picking of placed models.
//!
//! A click is turned into a ray per tile by inverting the tile's host
//! projection matrix and unprojecting the pointer at the near and far clip
//! planes. The ray therefore lives in tile-local space and distances are
//! measured in tile-local units from the near-plane point.

use glam::{DMat4, DVec2, DVec3, DVec4};

use crate::{
    scene::{NodeId, NodeKind, TileScene},
    types::TileId,
};

const DETERMINANT_EPSILON: f64 = 1e-12;

/// A ray with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    /// Unproject `ndc` through `inverse_mvp` at clip depths -1 and 1.
    ///
    /// Returns `None` if either point lands at infinity or both coincide.
    #[must_use]
    pub fn from_ndc(inverse_mvp: &DMat4, ndc: DVec2) -> Option<Self> {
        let unproject = |z: f64| {
            let p = *inverse_mvp * DVec4::new(ndc.x, ndc.y, z, 1.0);
            (p.w.abs() > f64::EPSILON).then(|| p.truncate() / p.w)
        };
        let near = unproject(-1.0)?;
        let far = unproject(1.0)?;
        let direction = (far - near).try_normalize()?;
        Some(Self {
            origin: near,
            direction,
        })
    }

    #[must_use]
    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }
}

/// Double-sided ray/triangle intersection. Returns the ray parameter of the
/// hit.
#[must_use]
pub fn intersect_triangle(ray: &Ray, [a, b, c]: [DVec3; 3]) -> Option<f64> {
    let e1 = b - a;
    let e2 = c - a;
    let p = ray.direction.cross(e2);
    let det = e1.dot(p);
    if det.abs() < DETERMINANT_EPSILON {
        return None;
    }
    let inv = 1.0 / det;
    let s = ray.origin - a;
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = ray.direction.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv;
    (t >= 0.0).then_some(t)
}

/// Nearest hit of a ray against a scene's meshes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshHit {
    pub distance: f64,
    pub node: NodeId,
    pub point: DVec3,
}

/// Cast `ray` against every visible model mesh of `tile`.
///
/// Shadow casters, outlines and lights are not pickable. World matrices
/// must be current.
#[must_use]
pub fn raycast_scene(tile: &TileScene, ray: &Ray) -> Option<MeshHit> {
    let mut best: Option<MeshHit> = None;
    for id in tile.model_meshes() {
        if !tile.scene.is_visible(id) {
            continue;
        }
        let node = tile.scene.node(id);
        let NodeKind::Mesh { geometry, .. } = &node.kind else {
            continue;
        };
        let world = node.world_matrix();
        let Some(entry) = geometry.bounds().transformed(&world).ray_hit(ray.origin, ray.direction)
        else {
            continue;
        };
        if best.is_some_and(|hit| entry > hit.distance) {
            continue;
        }
        for triangle in geometry.triangles() {
            let corners = triangle.map(|p| world.transform_point3(p));
            let Some(t) = intersect_triangle(ray, corners) else {
                continue;
            };
            if best.is_none_or(|hit| t < hit.distance) {
                best = Some(MeshHit {
                    distance: t,
                    node: id,
                    point: ray.at(t),
                });
            }
        }
    }
    best
}

/// A picked placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PickHit {
    /// Distance from the near-plane point in tile-local units.
    pub distance: f64,
    pub tile: TileId,
    /// The placement root containing the hit mesh.
    pub root: NodeId,
    pub placement_id: String,
    /// Hit position in tile-local space.
    pub point: DVec3,
}

/// Result of a click.
#[derive(Debug, Clone, PartialEq)]
pub enum PickOutcome {
    Hit(PickHit),
    Miss,
}

impl PickOutcome {
    #[must_use]
    pub fn hit(&self) -> Option<&PickHit> {
        match self {
            Self::Hit(hit) => Some(hit),
            Self::Miss => None,
        }
    }
}

/// Pick within one tile drawn with projection `mvp`.
#[must_use]
pub fn pick_tile(tile: TileId, scene: &TileScene, mvp: &DMat4, ndc: DVec2) -> Option<PickHit> {
    if mvp.determinant().abs() < f64::MIN_POSITIVE {
        return None;
    }
    let ray = Ray::from_ndc(&mvp.inverse(), ndc)?;
    let hit = raycast_scene(scene, &ray)?;
    let root = scene
        .scene
        .find_ancestor(hit.node, |node| matches!(node.kind, NodeKind::PlacementRoot { .. }))?;
    let NodeKind::PlacementRoot { placement_id, .. } = &scene.scene.node(root).kind else {
        return None;
    };
    Some(PickHit {
        distance: hit.distance,
        tile,
        root,
        placement_id: placement_id.clone(),
        point: hit.point,
    })
}

/// Pick the nearest placement over several tiles.
pub fn pick<'a>(
    tiles: impl IntoIterator<Item = (TileId, &'a TileScene, DMat4)>,
    ndc: DVec2,
) -> PickOutcome {
    tiles
        .into_iter()
        .filter_map(|(tile, scene, mvp)| pick_tile(tile, scene, &mvp, ndc))
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
        .map_or(PickOutcome::Miss, PickOutcome::Hit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{
        place,
        tests::{cube_asset, placement},
    };

    /// Camera 1000 units above the tile center looking straight down.
    fn top_down() -> DMat4 {
        let view = DMat4::look_at_rh(
            DVec3::new(4096.0, 4096.0, 1000.0),
            DVec3::new(4096.0, 4096.0, 0.0),
            DVec3::NEG_Y,
        );
        DMat4::perspective_rh_gl(60f64.to_radians(), 1.0, 1.0, 10_000.0) * view
    }

    fn scene_with_cube(id: &str, scale: f64) -> TileScene {
        let mut scene = TileScene::new(DVec3::Z);
        let mut p = placement(id, "cube", 4096.0, 4096.0);
        p.scale = scale;
        place(&mut scene, &p, &cube_asset("cube"), 10.0);
        scene.scene.update_world_matrices();
        scene
    }

    #[test]
    fn test_triangle_hit_both_sides() {
        let tri = [DVec3::ZERO, DVec3::X, DVec3::Y];
        let down = Ray {
            origin: DVec3::new(0.2, 0.2, 5.0),
            direction: DVec3::NEG_Z,
        };
        let up = Ray {
            origin: DVec3::new(0.2, 0.2, -5.0),
            direction: DVec3::Z,
        };
        assert!((intersect_triangle(&down, tri).unwrap() - 5.0).abs() < 1e-12);
        assert!((intersect_triangle(&up, tri).unwrap() - 5.0).abs() < 1e-12);

        let outside = Ray {
            origin: DVec3::new(0.8, 0.8, 5.0),
            direction: DVec3::NEG_Z,
        };
        assert!(intersect_triangle(&outside, tri).is_none());
        let away = Ray {
            origin: DVec3::new(0.2, 0.2, 5.0),
            direction: DVec3::Z,
        };
        assert!(intersect_triangle(&away, tri).is_none());
    }

    #[test]
    fn test_ray_from_ndc_starts_on_near_plane() {
        let ray = Ray::from_ndc(&top_down().inverse(), DVec2::ZERO).unwrap();
        assert!((ray.origin - DVec3::new(4096.0, 4096.0, 999.0)).length() < 1e-6);
        assert!((ray.direction - DVec3::NEG_Z).length() < 1e-9);
    }

    #[test]
    fn test_pick_hits_cube_top() {
        let scene = scene_with_cube("p1", 20.0);
        let tile = TileId::new(16, 0, 0);
        let hit = pick_tile(tile, &scene, &top_down(), DVec2::ZERO).unwrap();

        // Cube top at z = 10, near point at z = 999.
        assert!((hit.distance - 989.0).abs() < 1e-6);
        assert_eq!(hit.placement_id, "p1");
        assert_eq!(hit.tile, tile);
        assert_eq!(Some(hit.root), scene.placement_root("p1"));
        assert!((hit.point.z - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_pick_misses_empty_area() {
        let scene = scene_with_cube("p1", 20.0);
        let outcome = pick([(TileId::new(16, 0, 0), &scene, top_down())], DVec2::new(0.9, 0.9));
        assert_eq!(outcome, PickOutcome::Miss);
    }

    #[test]
    fn test_hidden_models_and_casters_are_not_pickable() {
        let mut scene = scene_with_cube("p1", 20.0);
        let root = scene.placement_root("p1").unwrap();
        scene.scene.node_mut(root).visible = false;
        assert_eq!(scene.casters().len(), 1);
        assert!(pick_tile(TileId::new(16, 0, 0), &scene, &top_down(), DVec2::ZERO).is_none());
    }

    #[test]
    fn test_pick_keeps_nearest_tile() {
        let low = scene_with_cube("low", 20.0);
        let tall = scene_with_cube("tall", 100.0);
        let outcome = pick(
            [
                (TileId::new(16, 0, 0), &low, top_down()),
                (TileId::new(16, 1, 0), &tall, top_down()),
            ],
            DVec2::ZERO,
        );
        let hit = outcome.hit().unwrap();
        assert_eq!(hit.placement_id, "tall");
        assert_eq!(hit.tile, TileId::new(16, 1, 0));
        // Top at z = 50.
        assert!((hit.distance - 949.0).abs() < 1e-6);
    }

    #[test]
    fn test_singular_projection_misses() {
        let scene = scene_with_cube("p1", 20.0);
        assert!(pick_tile(TileId::new(16, 0, 0), &scene, &DMat4::ZERO, DVec2::ZERO).is_none());
    }
}
