//! Populating tile scenes with placed model instances.
//!
//! A placement becomes a deep copy of its model's node hierarchy under the
//! tile's building group, with geometry shared and a frozen placement
//! transform on the copy's root. Every mesh of the copy gets a planar shadow
//! caster in the tile's shadow group.
//!
//! Models are authored in meters with Y up. Tile space is the tile's
//! extent grid with y growing southward and z up in meters, so the
//! placement transform is
//!
//! ```text
//! T(x, y, 0) · Rx(-π/2) · Ry(bearing) · S(k·s, -s, k·s)
//! ```
//!
//! where `k` is [`extent_units_per_meter`] at the placement and `s` the
//! object scale. The mirrored axis flips handedness, which is why model
//! preparation reverses face winding.

use std::{f64::consts::FRAC_PI_2, sync::Arc};

use glam::{DMat4, DQuat, DVec2, DVec3};
use tilemodels_decode::Placement;

use crate::{
    asset::{Aabb, ModelAsset},
    coords::{LatLon, extent_units_per_meter, tile_local_to_lat_lon},
    registry::{ModelRegistry, TileEntry},
    scene::{Node, NodeId, NodeKind, TileScene},
    types::{TileId, TileState},
};

/// Scale-correction factor of a placement in `tile`.
#[must_use]
pub fn placement_scale_unit(tile: TileId, placement: &Placement) -> f64 {
    let position = tile_local_to_lat_lon(tile, DVec2::new(placement.x, placement.y));
    extent_units_per_meter(position.lat, tile.z)
}

/// Transform taking model space to tile space for `placement`.
#[must_use]
pub fn placement_transform(placement: &Placement, scale_unit: f64) -> DMat4 {
    let s = placement.scale;
    let k = scale_unit;
    DMat4::from_translation(DVec3::new(placement.x, placement.y, 0.0))
        * DMat4::from_quat(
            DQuat::from_rotation_x(-FRAC_PI_2) * DQuat::from_rotation_y(placement.bearing.to_radians()),
        )
        * DMat4::from_scale(DVec3::new(k * s, -s, k * s))
}

/// Add one placed copy of `asset` to `tile`, returning the copy's root.
///
/// The caller is responsible for not placing the same id twice.
pub fn place(
    tile: &mut TileScene,
    placement: &Placement,
    asset: &ModelAsset,
    scale_unit: f64,
) -> NodeId {
    let buildings = tile.buildings();
    let root = tile.scene.graft(buildings, &asset.scene, asset.scene.root());
    {
        let node = tile.scene.node_mut(root);
        node.name.clone_from(&placement.id);
        node.kind = NodeKind::PlacementRoot {
            placement_id: placement.id.clone(),
            model_name: placement.model_name.clone(),
            scale_unit,
        };
        node.set_matrix(placement_transform(placement, scale_unit));
    }

    let shadows = tile.shadows();
    let meshes: Vec<(NodeId, Arc<_>)> = tile
        .scene
        .descendants(root)
        .into_iter()
        .filter_map(|id| match &tile.scene.node(id).kind {
            NodeKind::Mesh { geometry, .. } => Some((id, Arc::clone(geometry))),
            _ => None,
        })
        .collect();
    for (source, geometry) in meshes {
        let mut caster = Node::new(
            format!("{}_shadow", placement.id),
            NodeKind::ShadowCaster {
                source,
                scale_unit,
                geometry,
            },
        );
        caster.set_matrix(DMat4::IDENTITY);
        let id = tile.scene.add(shadows, caster);
        tile.register_caster(id);
    }

    tile.register_placement(placement.id.clone(), root);
    root
}

/// Place every placement of a loaded tile whose model is ready and which
/// has no root yet. Returns the number of placements added.
///
/// Returns immediately once the tile is fully populated.
pub fn populate(entry: &mut TileEntry, models: &mut ModelRegistry) -> usize {
    if entry.state != TileState::Loaded || entry.is_fully_populated() {
        return 0;
    }
    let tile = entry.tile;
    let Some(scene) = entry.scene.as_mut() else {
        return 0;
    };

    let mut added = 0;
    for placement in &entry.placements {
        if placement.id.is_empty() || scene.placement_root(&placement.id).is_some() {
            continue;
        }
        let Some(asset) = models
            .get(&placement.model_name)
            .and_then(|model| model.ready_asset())
        else {
            continue;
        };
        let scale_unit = placement_scale_unit(tile, placement);
        place(scene, placement, asset, scale_unit);
        added += 1;
    }

    if added > 0 {
        scene.scene.update_world_matrices();
        tracing::debug!(
            %tile,
            added,
            placed = scene.placed_count(),
            total = entry.placements.len(),
            "populated tile"
        );
    }
    added
}

/// Geographic pose of a placed model, recovered from its root transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementPose {
    pub position: LatLon,
    /// Tile-local position.
    pub local: DVec2,
    /// Height of the root origin above the ground in meters.
    pub elevation: f64,
    /// Placement bearing in degrees, in `0..360`.
    pub bearing: f64,
    /// Object scale along the model's x, up and z axes.
    pub scale: DVec3,
    /// Vertical extent of the placed meshes in meters.
    pub height: f64,
}

/// Recover the pose of the placement rooted at `root` in `tile`.
///
/// Returns `None` if `root` is not a placement root. World matrices must be
/// current.
#[must_use]
pub fn decompose(tile: TileId, scene: &TileScene, root: NodeId) -> Option<PlacementPose> {
    let node = scene.scene.node(root);
    let NodeKind::PlacementRoot { scale_unit, .. } = node.kind else {
        return None;
    };
    let m = node.local_matrix();
    let local = m.w_axis.truncate();

    let bearing = (-m.x_axis.y).atan2(m.x_axis.x).to_degrees().rem_euclid(360.0);
    let scale = DVec3::new(
        m.x_axis.truncate().length() / scale_unit,
        m.y_axis.z,
        m.z_axis.truncate().length() / scale_unit,
    );

    let height = scene
        .scene
        .descendants(root)
        .into_iter()
        .filter_map(|id| {
            let node = scene.scene.node(id);
            match &node.kind {
                NodeKind::Mesh { geometry, .. } => {
                    Some(geometry.bounds().transformed(&node.world_matrix()))
                }
                _ => None,
            }
        })
        .reduce(|a: Aabb, b| a.union(&b))
        .map_or(0.0, |bounds| bounds.max.z - bounds.min.z);

    Some(PlacementPose {
        position: tile_local_to_lat_lon(tile, local.truncate()),
        local: local.truncate(),
        elevation: local.z,
        bearing,
        scale,
        height,
    })
}
