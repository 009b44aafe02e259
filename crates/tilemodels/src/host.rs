//! The map host and the render backend a layer draws through.
//!
//! Both are called only from the render timeline, so neither needs to be
//! `Send`.

use glam::DMat4;

use crate::{
    asset::ModelAsset,
    instancing::InstanceBatch,
    scene::TileScene,
    shadow::{
        CameraParams, PlanarShadowMaterial, ShadowCompareMaterial, ShadowDepthMaterial,
        ShadowTarget,
    },
    types::{TileId, Viewport},
};

/// The map a layer is attached to.
pub trait MapHost {
    /// Current fractional zoom.
    fn zoom(&self) -> f64;

    /// Tiles of zoom `zoom` covering the viewport, for tiles of
    /// `tile_size` pixels.
    fn covering_tiles(&self, zoom: u8, tile_size: u32) -> Vec<TileId>;

    /// Matrix taking `tile`'s extent coordinates to clip space.
    fn projection_matrix(&self, tile: TileId, apply_globe_matrix: bool) -> DMat4;

    /// Parameters of the host camera model.
    fn camera(&self) -> CameraParams;

    /// Size of the world in pixels at the current zoom.
    fn world_size(&self) -> f64;

    fn viewport(&self) -> Viewport;

    /// Ask the host to draw another frame.
    fn trigger_repaint(&self);
}

/// One tile drawn into the shadow target.
#[derive(Debug, Clone, Copy)]
pub struct ShadowDraw<'a> {
    pub tile: TileId,
    pub scene: &'a TileScene,
    pub material: ShadowDepthMaterial,
}

/// One variant's instances in a tile, with the loaded variant model.
#[derive(Debug, Clone, Copy)]
pub struct InstanceDraw<'a> {
    pub batch: &'a InstanceBatch,
    pub asset: &'a ModelAsset,
}

/// One tile drawn in the color pass.
#[derive(Debug, Clone, Copy)]
pub struct TileDraw<'a> {
    pub tile: TileId,
    pub scene: &'a TileScene,
    /// Host projection matrix of the tile.
    pub projection: DMat4,
    /// Shadow map comparison, when the shadow pass ran.
    pub shadow: Option<ShadowCompareMaterial>,
    /// Material for the planar shadow casters, when shadows are on.
    pub planar_shadow: Option<PlanarShadowMaterial>,
    /// Instance batches whose variant model has loaded.
    pub instances: &'a [InstanceDraw<'a>],
}

/// GPU side of a layer.
pub trait RenderBackend {
    fn clear_stencil(&mut self);
    fn begin_shadow_pass(&mut self, target: &ShadowTarget);
    fn draw_shadow_tile(&mut self, draw: &ShadowDraw<'_>);
    fn end_shadow_pass(&mut self);
    fn draw_tile(&mut self, draw: &TileDraw<'_>);
}

/// What a layer needs from its host while attached.
pub struct LayerContext {
    pub host: Box<dyn MapHost>,
    pub backend: Box<dyn RenderBackend>,
}

impl LayerContext {
    #[must_use]
    pub fn new(host: Box<dyn MapHost>, backend: Box<dyn RenderBackend>) -> Self {
        Self { host, backend }
    }
}

impl std::fmt::Debug for LayerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerContext").finish_non_exhaustive()
    }
}
