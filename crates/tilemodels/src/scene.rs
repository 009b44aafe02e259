//! Arena scene graph for per-tile model scenes.
//!
//! Nodes live in a flat arena and refer to each other by [`NodeId`]. Every
//! node carries a [`NodeKind`] tag set at construction, which traversals
//! dispatch on instead of inspecting names or ad hoc metadata.

use std::{collections::HashMap, sync::Arc};

use glam::{DMat4, DQuat, DVec3};

use crate::{
    animation::Playback,
    asset::{Color, LineGeometry, MeshGeometry, MeshMaterial},
    instancing::InstanceBatch,
};

/// Index of a node inside its [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A light in a tile's light rig.
#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    /// Sun light, travelling along `direction`.
    Directional {
        color: Color,
        intensity: f32,
        direction: DVec3,
    },
    /// Sky/ground gradient light.
    Hemisphere {
        sky: Color,
        ground: Color,
        intensity: f32,
    },
    /// Uniform fill light.
    Ambient { color: Color, intensity: f32 },
}

/// The role of a node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Plain transform node.
    Group,
    /// Root of one placed model instance.
    PlacementRoot {
        placement_id: String,
        model_name: String,
        /// Scale-correction factor the placement was composed with.
        scale_unit: f64,
    },
    /// Renderable triangle mesh.
    Mesh {
        geometry: Arc<MeshGeometry>,
        material: MeshMaterial,
    },
    /// Edge outline drawn when a model's texture is unavailable.
    Outline {
        geometry: Arc<LineGeometry>,
        color: Color,
    },
    /// Planar shadow of a mesh node. Its matrix is recomputed every frame.
    ShadowCaster {
        source: NodeId,
        scale_unit: f64,
        geometry: Arc<MeshGeometry>,
    },
    Light(Light),
}

/// Decomposed local transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: DVec3,
    pub rotation: DQuat,
    pub scale: DVec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
            scale: DVec3::ONE,
        }
    }
}

impl Transform {
    #[must_use]
    pub fn matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// A scene graph node.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub visible: bool,
    /// Recompose `local` from `transform` on every world update when set.
    /// Cleared by [`Node::set_matrix`].
    pub auto_update: bool,
    pub transform: Transform,
    local: DMat4,
    world: DMat4,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    /// Create a detached node with an identity transform.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            visible: true,
            auto_update: true,
            transform: Transform::default(),
            local: DMat4::IDENTITY,
            world: DMat4::IDENTITY,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Create a detached group node.
    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    /// Replace the local matrix and freeze it.
    pub fn set_matrix(&mut self, matrix: DMat4) {
        self.local = matrix;
        self.auto_update = false;
    }

    #[must_use]
    pub fn local_matrix(&self) -> DMat4 {
        if self.auto_update {
            self.transform.matrix()
        } else {
            self.local
        }
    }

    /// World matrix as of the last [`Scene::update_world_matrices`].
    #[must_use]
    pub fn world_matrix(&self) -> DMat4 {
        self.world
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[must_use]
    pub fn is_mesh(&self) -> bool {
        matches!(self.kind, NodeKind::Mesh { .. })
    }
}

/// A tree of nodes rooted at a group node.
#[derive(Debug, Clone)]
pub struct Scene {
    nodes: Vec<Node>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new("scene")
    }
}

impl Scene {
    /// Create a scene containing only a root group.
    #[must_use]
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node::group(root_name)],
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A scene always holds its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Attach `node` as the last child of `parent`.
    pub fn add(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        node.world = self.nodes[parent.0].world * node.local_matrix();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Deep-copy the subtree of `source` rooted at `from` under `parent`.
    ///
    /// Geometry is shared; transforms, materials and visibility are copied.
    /// Returns the id of the copied subtree root.
    pub fn graft(&mut self, parent: NodeId, source: &Scene, from: NodeId) -> NodeId {
        let copy = self.add(parent, source.node(from).clone());
        for &child in source.node(from).children() {
            self.graft(copy, source, child);
        }
        copy
    }

    /// All nodes of the subtree rooted at `id`, in pre-order.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.node(current).children.iter().rev());
        }
        out
    }

    /// Walk from `id` toward the root and return the first node matching
    /// `predicate`, including `id` itself.
    pub fn find_ancestor(&self, id: NodeId, predicate: impl Fn(&Node) -> bool) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if predicate(node) {
                return Some(node_id);
            }
            current = node.parent;
        }
        None
    }

    /// Whether `id` and all its ancestors are visible.
    #[must_use]
    pub fn is_visible(&self, id: NodeId) -> bool {
        self.find_ancestor(id, |node| !node.visible).is_none()
    }

    /// Recompute every world matrix from the root down.
    pub fn update_world_matrices(&mut self) {
        let mut stack = vec![(self.root(), DMat4::IDENTITY)];
        while let Some((id, parent_world)) = stack.pop() {
            let node = &mut self.nodes[id.0];
            if node.auto_update {
                node.local = node.transform.matrix();
            }
            node.world = parent_world * node.local;
            let world = node.world;
            stack.extend(node.children.iter().map(|&child| (child, world)));
        }
    }

    /// Iterate over all node ids.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }
}

/// The scene of one tile: a light rig, placed models and their planar
/// shadows.
#[derive(Debug, Clone)]
pub struct TileScene {
    pub scene: Scene,
    lights: NodeId,
    buildings: NodeId,
    shadows: NodeId,
    placed: HashMap<String, NodeId>,
    casters: Vec<NodeId>,
    instances: Vec<InstanceBatch>,
    playbacks: Vec<Playback>,
}

// Light rig colors, from HSL.
const SUN_HSL: (f32, f32, f32) = (0.12, 0.7, 0.98);
const SKY_HSL: (f32, f32, f32) = (0.55, 0.4, 0.95);
const GROUND_HSL: (f32, f32, f32) = (0.08, 0.25, 0.6);
const AMBIENT_HSL: (f32, f32, f32) = (0.15, 0.2, 1.0);

impl TileScene {
    /// Create an empty tile scene lit by a sun travelling along
    /// `sun_direction`.
    #[must_use]
    pub fn new(sun_direction: DVec3) -> Self {
        let mut scene = Scene::new("tile");
        let root = scene.root();
        let lights = scene.add(root, Node::group("light_group"));
        let buildings = scene.add(root, Node::group("building_group"));
        let shadows = scene.add(root, Node::group("shadow_group"));

        let (h, s, l) = SUN_HSL;
        scene.add(
            lights,
            Node::new(
                "dir_light",
                NodeKind::Light(Light::Directional {
                    color: Color::from_hsl(h, s, l),
                    intensity: 2.0,
                    direction: sun_direction.normalize_or_zero(),
                }),
            ),
        );
        let mut hemi = Node::new(
            "hemi_light",
            NodeKind::Light(Light::Hemisphere {
                sky: Color::from_hsl(SKY_HSL.0, SKY_HSL.1, SKY_HSL.2),
                ground: Color::from_hsl(GROUND_HSL.0, GROUND_HSL.1, GROUND_HSL.2),
                intensity: 2.5,
            }),
        );
        hemi.transform.translation = DVec3::Z;
        scene.add(lights, hemi);
        let (h, s, l) = AMBIENT_HSL;
        scene.add(
            lights,
            Node::new(
                "ambient_light",
                NodeKind::Light(Light::Ambient {
                    color: Color::from_hsl(h, s, l),
                    intensity: 1.2,
                }),
            ),
        );
        scene.update_world_matrices();

        Self {
            scene,
            lights,
            buildings,
            shadows,
            placed: HashMap::new(),
            casters: Vec::new(),
            instances: Vec::new(),
            playbacks: Vec::new(),
        }
    }

    #[must_use]
    pub fn lights(&self) -> NodeId {
        self.lights
    }

    #[must_use]
    pub fn buildings(&self) -> NodeId {
        self.buildings
    }

    #[must_use]
    pub fn shadows(&self) -> NodeId {
        self.shadows
    }

    /// Root node of a placement, if it has been populated.
    #[must_use]
    pub fn placement_root(&self, placement_id: &str) -> Option<NodeId> {
        self.placed.get(placement_id).copied()
    }

    /// Number of populated placements.
    #[must_use]
    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    /// Populated placement roots, keyed by placement id.
    pub fn placement_roots(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.placed.iter().map(|(id, &node)| (id.as_str(), node))
    }

    /// Planar shadow caster nodes.
    #[must_use]
    pub fn casters(&self) -> &[NodeId] {
        &self.casters
    }

    pub(crate) fn register_placement(&mut self, placement_id: String, root: NodeId) {
        self.placed.insert(placement_id, root);
    }

    pub(crate) fn register_caster(&mut self, caster: NodeId) {
        self.casters.push(caster);
    }

    /// Instance batches, one per variant, when the layer draws instanced.
    #[must_use]
    pub fn instances(&self) -> &[InstanceBatch] {
        &self.instances
    }

    pub(crate) fn set_instances(&mut self, instances: Vec<InstanceBatch>) {
        self.instances = instances;
    }

    /// Whether the scene has anything to draw.
    #[must_use]
    pub fn has_content(&self) -> bool {
        !self.placed.is_empty() || self.instances.iter().any(|batch| !batch.is_empty())
    }

    #[must_use]
    pub fn playbacks(&self) -> &[Playback] {
        &self.playbacks
    }

    pub(crate) fn add_playback(&mut self, playback: Playback) {
        self.playbacks.push(playback);
    }

    /// Advance every playing clip. Returns whether any clip is playing.
    pub fn advance_animations(&mut self, dt: f64) -> bool {
        for playback in &mut self.playbacks {
            playback.advance(dt);
        }
        !self.playbacks.is_empty()
    }

    /// Point the directional light along a new sun direction.
    pub fn set_sun_direction(&mut self, sun_direction: DVec3) {
        let lights: Vec<NodeId> = self.scene.node(self.lights).children().to_vec();
        for id in lights {
            if let NodeKind::Light(Light::Directional { direction, .. }) =
                &mut self.scene.node_mut(id).kind
            {
                *direction = sun_direction.normalize_or_zero();
            }
        }
    }

    /// Mesh nodes that belong to placed models.
    #[must_use]
    pub fn model_meshes(&self) -> Vec<NodeId> {
        self.scene
            .descendants(self.buildings)
            .into_iter()
            .filter(|&id| self.scene.node(id).is_mesh())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_matrices_compose_down_the_tree() {
        let mut scene = Scene::default();
        let mut parent = Node::group("parent");
        parent.transform.translation = DVec3::new(10.0, 0.0, 0.0);
        let parent = scene.add(scene.root(), parent);
        let mut child = Node::group("child");
        child.transform.scale = DVec3::splat(2.0);
        let child = scene.add(parent, child);

        scene.update_world_matrices();
        let p = scene.node(child).world_matrix().transform_point3(DVec3::ONE);
        assert!((p - DVec3::new(12.0, 2.0, 2.0)).length() < 1e-12);
    }

    #[test]
    fn test_frozen_matrix_ignores_transform() {
        let mut scene = Scene::default();
        let mut node = Node::group("frozen");
        node.set_matrix(DMat4::from_translation(DVec3::Z));
        node.transform.translation = DVec3::X * 100.0;
        let id = scene.add(scene.root(), node);

        scene.update_world_matrices();
        let p = scene.node(id).world_matrix().transform_point3(DVec3::ZERO);
        assert_eq!(p, DVec3::Z);
    }

    #[test]
    fn test_graft_copies_subtree() {
        let mut source = Scene::new("model");
        let a = source.add(source.root(), Node::group("a"));
        source.add(a, Node::group("b"));

        let mut target = Scene::default();
        let copy = target.graft(target.root(), &source, a);

        assert_eq!(target.len(), 3);
        assert_eq!(target.node(copy).name, "a");
        assert_eq!(target.node(target.node(copy).children()[0]).name, "b");
        assert_eq!(target.node(copy).parent(), Some(target.root()));
    }

    #[test]
    fn test_visibility_is_inherited() {
        let mut scene = Scene::default();
        let parent = scene.add(scene.root(), Node::group("parent"));
        let child = scene.add(parent, Node::group("child"));
        assert!(scene.is_visible(child));

        scene.node_mut(parent).visible = false;
        assert!(!scene.is_visible(child));
    }

    #[test]
    fn test_find_ancestor() {
        let mut scene = Scene::default();
        let group = scene.add(scene.root(), Node::group("target"));
        let leaf = scene.add(group, Node::group("leaf"));
        assert_eq!(scene.find_ancestor(leaf, |n| n.name == "target"), Some(group));
        assert_eq!(scene.find_ancestor(leaf, |n| n.name == "missing"), None);
    }

    #[test]
    fn test_tile_scene_has_light_rig() {
        let tile = TileScene::new(DVec3::new(0.0, 1.0, 1.0));
        let lights = tile.scene.node(tile.lights()).children();
        assert_eq!(lights.len(), 3);
        assert_eq!(tile.placed_count(), 0);
        assert!(tile.casters().is_empty());
    }

    #[test]
    fn test_empty_batches_are_not_content() {
        let mut tile = TileScene::new(DVec3::Z);
        assert!(!tile.has_content());
        let batch = |count| InstanceBatch {
            model_name: "oak.glb".to_string(),
            matrices: vec![DMat4::IDENTITY; count],
            scale_units: vec![1.0; count],
        };
        tile.set_instances(vec![batch(0)]);
        assert!(!tile.has_content());
        tile.set_instances(vec![batch(0), batch(2)]);
        assert!(tile.has_content());
        assert!(!tile.advance_animations(0.1));
    }
}
