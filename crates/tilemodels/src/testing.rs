//! In-memory hosts, backends and sources for layer tests.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use glam::DMat4;
use prost::Message;
use tilemodels_decode::{DecodedTexture, geometry::zigzag_encode};
use tilemodels_proto::{
    Tile,
    tile::{Feature, GeomType, Layer, Value},
};

use crate::{
    asset::{AnimationClip, ModelAsset},
    assemble::tests::cube_asset,
    error::Error,
    host::{MapHost, RenderBackend, ShadowDraw, TileDraw},
    shadow::{CameraParams, ShadowTarget},
    source::{FetchFuture, ModelLoader, ModelRequest, TileSource},
    types::{TileId, Viewport},
};

/// Encode a placement tile with one point feature per `(id, model, x, y)`,
/// in an 8192 extent.
pub fn tile_bytes(layer_name: &str, features: &[(&str, &str, i32, i32)]) -> Vec<u8> {
    tile_bytes_with_kind(layer_name, features, "Object")
}

pub fn tile_bytes_with_kind(
    layer_name: &str,
    features: &[(&str, &str, i32, i32)],
    kind: &str,
) -> Vec<u8> {
    let keys = ["id", "modelname", "modelurl", "modeltype", "texturename", "textureurl"];
    let mut values = Vec::new();
    let mut encoded = Vec::new();
    for (index, &(id, model, x, y)) in features.iter().enumerate() {
        let props = [
            id.to_string(),
            model.to_string(),
            format!("{model}.obj"),
            kind.to_string(),
            model.to_string(),
            format!("{model}.jpg"),
        ];
        let mut tags = Vec::new();
        for (key, value) in props.into_iter().enumerate() {
            tags.push(key as u32);
            tags.push(values.len() as u32);
            values.push(Value {
                string_value: Some(value),
                ..Value::default()
            });
        }
        encoded.push(Feature {
            id: Some(index as u64 + 1),
            tags,
            r#type: Some(GeomType::Point as i32),
            geometry: vec![9, zigzag_encode(x), zigzag_encode(y)],
        });
    }
    let layer = Layer {
        version: 2,
        name: layer_name.to_string(),
        features: encoded,
        keys: keys.iter().map(ToString::to_string).collect(),
        values,
        extent: Some(8192),
    };
    Tile {
        layers: vec![layer],
    }
    .encode_to_vec()
}

#[derive(Debug)]
struct HostState {
    tiles: Vec<TileId>,
    zoom: f64,
    projection: DMat4,
    repaints: usize,
}

/// Map host with a fixed set of covering tiles.
#[derive(Debug, Clone)]
pub struct MockHost(Rc<RefCell<HostState>>);

impl MockHost {
    pub fn new(tiles: Vec<TileId>) -> Self {
        Self(Rc::new(RefCell::new(HostState {
            tiles,
            zoom: 16.0,
            projection: DMat4::IDENTITY,
            repaints: 0,
        })))
    }

    pub fn set_tiles(&self, tiles: Vec<TileId>) {
        self.0.borrow_mut().tiles = tiles;
    }

    pub fn set_projection(&self, projection: DMat4) {
        self.0.borrow_mut().projection = projection;
    }

    pub fn repaints(&self) -> usize {
        self.0.borrow().repaints
    }
}

impl MapHost for MockHost {
    fn zoom(&self) -> f64 {
        self.0.borrow().zoom
    }

    fn covering_tiles(&self, _zoom: u8, _tile_size: u32) -> Vec<TileId> {
        self.0.borrow().tiles.clone()
    }

    fn projection_matrix(&self, _tile: TileId, _apply_globe_matrix: bool) -> DMat4 {
        self.0.borrow().projection
    }

    fn camera(&self) -> CameraParams {
        CameraParams::default()
    }

    fn world_size(&self) -> f64 {
        512.0 * 65_536.0
    }

    fn viewport(&self) -> Viewport {
        Viewport::new(512.0, 512.0)
    }

    fn trigger_repaint(&self) {
        self.0.borrow_mut().repaints += 1;
    }
}

/// What one frame drew.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub shadow_passes: usize,
    pub shadow_target: Option<ShadowTarget>,
    pub shadow_tiles: Vec<TileId>,
    /// Tile, whether it had a shadow comparison material, whether it had a
    /// planar shadow material.
    pub draws: Vec<(TileId, bool, bool)>,
    /// Variant model name and instance count of every instance draw.
    pub instances: Vec<(TileId, String, usize)>,
}

/// Backend recording draw calls. A stencil clear starts a new frame.
#[derive(Debug, Clone, Default)]
pub struct MockBackend(Rc<RefCell<Vec<Frame>>>);

impl MockBackend {
    pub fn stencil_clears(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn last_frame(&self) -> Frame {
        self.0.borrow().last().cloned().unwrap_or_default()
    }

    pub fn tiles_drawn(&self) -> usize {
        self.0.borrow().iter().map(|frame| frame.draws.len()).sum()
    }

    fn with_frame(&self, f: impl FnOnce(&mut Frame)) {
        let mut frames = self.0.borrow_mut();
        if frames.is_empty() {
            frames.push(Frame::default());
        }
        if let Some(frame) = frames.last_mut() {
            f(frame);
        }
    }
}

impl RenderBackend for MockBackend {
    fn clear_stencil(&mut self) {
        self.0.borrow_mut().push(Frame::default());
    }

    fn begin_shadow_pass(&mut self, target: &ShadowTarget) {
        let target = *target;
        self.with_frame(|frame| {
            frame.shadow_passes += 1;
            frame.shadow_target = Some(target);
        });
    }

    fn draw_shadow_tile(&mut self, draw: &ShadowDraw<'_>) {
        let tile = draw.tile;
        self.with_frame(|frame| frame.shadow_tiles.push(tile));
    }

    fn end_shadow_pass(&mut self) {}

    fn draw_tile(&mut self, draw: &TileDraw<'_>) {
        let entry = (draw.tile, draw.shadow.is_some(), draw.planar_shadow.is_some());
        let instances: Vec<_> = draw
            .instances
            .iter()
            .map(|i| (draw.tile, i.batch.model_name.clone(), i.batch.len()))
            .collect();
        self.with_frame(|frame| {
            frame.draws.push(entry);
            frame.instances.extend(instances);
        });
    }
}

/// One queued answer to a tile fetch. `None` data fails with 404.
type Reply = (Option<Vec<u8>>, Duration);

/// Tile source serving payloads from memory. Unknown tiles fail with 404.
///
/// Queued replies answer fetches of their tile in order before the inserted
/// payload is used.
#[derive(Debug, Clone, Default)]
pub struct MockTileSource {
    tiles: Arc<Mutex<HashMap<TileId, Vec<u8>>>>,
    replies: Arc<Mutex<HashMap<TileId, VecDeque<Reply>>>>,
    fetches: Arc<AtomicUsize>,
    delay: Arc<Mutex<Duration>>,
}

impl MockTileSource {
    pub fn insert(&self, tile: TileId, data: Vec<u8>) {
        self.tiles.lock().unwrap().insert(tile, data);
    }

    /// Answer the next unanswered fetch of `tile` with `data` after `delay`.
    pub fn queue_reply(&self, tile: TileId, data: Option<Vec<u8>>, delay: Duration) {
        self.replies
            .lock()
            .unwrap()
            .entry(tile)
            .or_default()
            .push_back((data, delay));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl TileSource for MockTileSource {
    fn fetch_tile(&self, tile: TileId) -> FetchFuture<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let queued = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&tile)
            .and_then(VecDeque::pop_front);
        let (data, delay) = queued.unwrap_or_else(|| {
            let data = self.tiles.lock().unwrap().get(&tile).cloned();
            (data, *self.delay.lock().unwrap())
        });
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            data.ok_or_else(|| Error::HttpStatus {
                url: tile.key(),
                status: 404,
            })
        })
    }
}

#[derive(Debug, Default)]
struct LoaderState {
    failing_models: HashSet<String>,
    failing_textures: HashSet<String>,
    animations: HashMap<String, Vec<AnimationClip>>,
    urls: Vec<String>,
}

/// Model loader answering every request with a unit cube.
#[derive(Debug, Clone, Default)]
pub struct MockLoader(Arc<Mutex<LoaderState>>);

impl MockLoader {
    pub fn fail_model(&self, name: &str) {
        self.0.lock().unwrap().failing_models.insert(name.to_string());
    }

    /// Fail the texture `{name}.jpg`.
    pub fn fail_texture(&self, name: &str) {
        self.0
            .lock()
            .unwrap()
            .failing_textures
            .insert(format!("/{name}.jpg"));
    }

    /// Serve model `name` with `clips`.
    pub fn animate(&self, name: &str, clips: Vec<AnimationClip>) {
        self.0.lock().unwrap().animations.insert(name.to_string(), clips);
    }

    pub fn model_requests(&self) -> usize {
        self.0.lock().unwrap().urls.len()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.0.lock().unwrap().urls.clone()
    }
}

impl ModelLoader for MockLoader {
    fn load_model(&self, request: &ModelRequest) -> FetchFuture<ModelAsset> {
        let mut state = self.0.lock().unwrap();
        state.urls.push(request.url.clone());
        let result = if state.failing_models.contains(&request.name) {
            Err(Error::Asset {
                url: request.url.clone(),
                message: "unreadable".to_string(),
            })
        } else {
            let clips = state.animations.get(&request.name).cloned().unwrap_or_default();
            Ok(cube_asset(&request.name).with_animations(clips))
        };
        Box::pin(async move { result })
    }

    fn load_texture(&self, url: &str) -> FetchFuture<DecodedTexture> {
        let state = self.0.lock().unwrap();
        let result = if state.failing_textures.iter().any(|suffix| url.ends_with(suffix)) {
            Err(Error::Texture {
                url: url.to_string(),
                message: "not an image".to_string(),
            })
        } else {
            Ok(DecodedTexture::new(vec![255; 4], 1, 1))
        };
        Box::pin(async move { result })
    }
}
