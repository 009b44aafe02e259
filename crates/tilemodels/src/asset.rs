//! Model assets: geometry, materials and the renderable node hierarchy.
//!
//! A [`ModelAsset`] is the template that placements are cloned from. Its
//! geometry is shared by `Arc` so that cloning a model into a tile scene only
//! copies transforms and materials.

use std::sync::Arc;

use glam::{DMat4, DVec3, Vec2, Vec3};
use tilemodels_decode::DecodedTexture;

use crate::{
    error::{Error, Result},
    outline::{EDGE_THRESHOLD_DEGREES, edge_outline},
    scene::{Node, NodeId, NodeKind, Scene},
};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// Smallest box containing all points, or `None` for no points.
    pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self { min: first, max: first }, |acc, p| Self {
            min: acc.min.min(p),
            max: acc.max.max(p),
        }))
    }

    #[must_use]
    pub fn corners(&self) -> [DVec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            DVec3::new(a.x, a.y, a.z),
            DVec3::new(b.x, a.y, a.z),
            DVec3::new(a.x, b.y, a.z),
            DVec3::new(b.x, b.y, a.z),
            DVec3::new(a.x, a.y, b.z),
            DVec3::new(b.x, a.y, b.z),
            DVec3::new(a.x, b.y, b.z),
            DVec3::new(b.x, b.y, b.z),
        ]
    }

    /// Bounds of this box after an affine transform.
    #[must_use]
    pub fn transformed(&self, matrix: &DMat4) -> Self {
        let corners = self.corners().map(|c| matrix.transform_point3(c));
        let mut out = Self {
            min: corners[0],
            max: corners[0],
        };
        for c in &corners[1..] {
            out.min = out.min.min(*c);
            out.max = out.max.max(*c);
        }
        out
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Slab test. Returns the entry parameter along the ray, clamped to zero
    /// when the origin is inside the box.
    #[must_use]
    pub fn ray_hit(&self, origin: DVec3, direction: DVec3) -> Option<f64> {
        let inv = direction.recip();
        let t0 = (self.min - origin) * inv;
        let t1 = (self.max - origin) * inv;
        let near = t0.min(t1);
        let far = t0.max(t1);

        // NaN from 0 * inf is discarded by max_element / min_element.
        let t_enter = near.max_element();
        let t_exit = far.min_element();
        if t_exit < 0.0 || t_enter > t_exit {
            return None;
        }
        Some(t_enter.max(0.0))
    }
}

/// Indexed triangle mesh.
#[derive(Debug, Clone)]
pub struct MeshGeometry {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    indices: Vec<u32>,
    bounds: Aabb,
}

impl MeshGeometry {
    /// Create a mesh from positions and triangle indices.
    ///
    /// # Errors
    ///
    /// Returns an error if the index count is not a multiple of three or an
    /// index is out of range.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Result<Self> {
        if indices.len() % 3 != 0 {
            return Err(Error::InvalidData {
                context: "mesh indices",
                detail: format!("{} indices do not form triangles", indices.len()),
            });
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(Error::InvalidData {
                context: "mesh indices",
                detail: format!("index {bad} out of range for {} vertices", positions.len()),
            });
        }
        let bounds = Aabb::from_points(positions.iter().map(|p| p.as_dvec3())).unwrap_or(Aabb {
            min: DVec3::ZERO,
            max: DVec3::ZERO,
        });
        Ok(Self {
            positions,
            normals: Vec::new(),
            uvs: Vec::new(),
            indices,
            bounds,
        })
    }

    #[must_use]
    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = normals;
        self
    }

    #[must_use]
    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = uvs;
        self
    }

    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[must_use]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Triangle corners in double precision.
    pub fn triangles(&self) -> impl Iterator<Item = [DVec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                self.positions[tri[0] as usize].as_dvec3(),
                self.positions[tri[1] as usize].as_dvec3(),
                self.positions[tri[2] as usize].as_dvec3(),
            ]
        })
    }

    /// Flip every triangle's winding order.
    pub fn reverse_winding(&mut self) {
        for tri in self.indices.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
    }
}

/// Line segment list.
#[derive(Debug, Clone, Default)]
pub struct LineGeometry {
    pub segments: Vec<[Vec3; 2]>,
}

/// Linear RGB color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);

    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Color from a `0xRRGGBB` value.
    #[must_use]
    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| f32::from(u8::try_from((hex >> shift) & 0xFF).unwrap_or(0)) / 255.0;
        Self::new(channel(16), channel(8), channel(0))
    }

    /// Color from hue, saturation and lightness, each in `0..=1`.
    #[must_use]
    pub fn from_hsl(h: f32, s: f32, l: f32) -> Self {
        let h = h.rem_euclid(1.0);
        let s = s.clamp(0.0, 1.0);
        let l = l.clamp(0.0, 1.0);
        if s <= 0.0 {
            return Self::new(l, l, l);
        }
        let q = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        let hue = |t: f32| {
            let t = t.rem_euclid(1.0);
            if t < 1.0 / 6.0 {
                p + (q - p) * 6.0 * t
            } else if t < 0.5 {
                q
            } else if t < 2.0 / 3.0 {
                p + (q - p) * 6.0 * (2.0 / 3.0 - t)
            } else {
                p
            }
        };
        Self::new(hue(h + 1.0 / 3.0), hue(h), hue(h - 1.0 / 3.0))
    }
}

/// Depth offset applied while rasterizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonOffset {
    pub factor: f32,
    pub units: f32,
}

/// Surface material of a model mesh.
#[derive(Debug, Clone)]
pub struct MeshMaterial {
    pub color: Color,
    pub texture: Option<Arc<DecodedTexture>>,
    pub double_sided: bool,
    pub polygon_offset: Option<PolygonOffset>,
    pub opacity: f32,
}

impl Default for MeshMaterial {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            texture: None,
            double_sided: false,
            polygon_offset: None,
            opacity: 1.0,
        }
    }
}

impl MeshMaterial {
    /// Matte grey, double sided, with a -1/-1 polygon offset.
    #[must_use]
    pub fn default_model() -> Self {
        Self {
            color: Color::from_hex(0x00C0_C0C0),
            texture: None,
            double_sided: true,
            polygon_offset: Some(PolygonOffset {
                factor: -1.0,
                units: -1.0,
            }),
            opacity: 1.0,
        }
    }
}

/// A named animation clip carried alongside a model.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    /// Length in seconds.
    pub duration: f64,
}

/// A loaded model ready to be cloned into tile scenes.
#[derive(Debug, Clone)]
pub struct ModelAsset {
    pub scene: Scene,
    pub animations: Vec<AnimationClip>,
}

impl ModelAsset {
    /// Root name of the placeholder substituted for failed models.
    pub const PLACEHOLDER_NAME: &'static str = "__NULL_MODEL__";

    /// Wrap a parsed node hierarchy.
    #[must_use]
    pub fn new(scene: Scene) -> Self {
        Self {
            scene,
            animations: Vec::new(),
        }
    }

    /// Create an asset holding one mesh per `(name, geometry)` pair.
    #[must_use]
    pub fn from_meshes(name: &str, meshes: Vec<(String, MeshGeometry)>) -> Self {
        let mut scene = Scene::new(name);
        let root = scene.root();
        for (mesh_name, geometry) in meshes {
            scene.add(
                root,
                Node::new(
                    mesh_name,
                    NodeKind::Mesh {
                        geometry: Arc::new(geometry),
                        material: MeshMaterial::default(),
                    },
                ),
            );
        }
        scene.update_world_matrices();
        Self::new(scene)
    }

    /// An invisible empty model. Placements referencing it populate without
    /// drawing anything.
    #[must_use]
    pub fn placeholder() -> Self {
        let mut scene = Scene::new(Self::PLACEHOLDER_NAME);
        let root = scene.root();
        scene.node_mut(root).visible = false;
        Self::new(scene)
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.scene.node(self.scene.root()).name == Self::PLACEHOLDER_NAME
    }

    /// Whether the asset's root is drawn at all.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.scene.node(self.scene.root()).visible
    }

    #[must_use]
    pub fn with_animations(mut self, animations: Vec<AnimationClip>) -> Self {
        self.animations = animations;
        self
    }

    /// Mesh node ids in pre-order.
    #[must_use]
    pub fn mesh_nodes(&self) -> Vec<NodeId> {
        self.scene
            .descendants(self.scene.root())
            .into_iter()
            .filter(|&id| self.scene.node(id).is_mesh())
            .collect()
    }

    /// Get an asset ready for placement.
    ///
    /// Reverses face winding (placements mirror one axis), optionally
    /// replaces every material with [`MeshMaterial::default_model`], and
    /// freezes all transforms.
    pub fn prepare(&mut self, replace_materials: bool) {
        for id in self.mesh_nodes() {
            if let NodeKind::Mesh { geometry, material } = &mut self.scene.node_mut(id).kind {
                Arc::make_mut(geometry).reverse_winding();
                if replace_materials {
                    *material = MeshMaterial::default_model();
                }
            }
        }
        self.scene.update_world_matrices();
        for id in self.scene.ids().collect::<Vec<_>>() {
            let node = self.scene.node_mut(id);
            let local = node.local_matrix();
            node.set_matrix(local);
        }
    }

    /// Use `texture` as the color map of every mesh.
    pub fn apply_texture(&mut self, texture: &Arc<DecodedTexture>) {
        for id in self.mesh_nodes() {
            if let NodeKind::Mesh { material, .. } = &mut self.scene.node_mut(id).kind {
                material.texture = Some(Arc::clone(texture));
            }
        }
    }

    /// Attach a black edge outline to every mesh.
    pub fn add_outlines(&mut self) {
        for id in self.mesh_nodes() {
            let NodeKind::Mesh { geometry, .. } = &self.scene.node(id).kind else {
                continue;
            };
            let outline = edge_outline(geometry, EDGE_THRESHOLD_DEGREES);
            let name = format!("{}_outline", self.scene.node(id).name);
            let mut node = Node::new(
                name,
                NodeKind::Outline {
                    geometry: Arc::new(outline),
                    color: Color::BLACK,
                },
            );
            node.set_matrix(DMat4::IDENTITY);
            self.scene.add(id, node);
        }
        self.scene.update_world_matrices();
    }
}
