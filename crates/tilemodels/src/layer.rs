//! The model layer: per-frame maintenance, rendering and picking.
//!
//! Each frame the layer drains finished fetch jobs and commits them to the
//! registries, makes sure every visible tile and every model those tiles
//! reference has an entry, and populates loaded tiles with placed models.
//! Fetch jobs run on the [`Spawner`]; everything else happens on the render
//! timeline inside `&mut self` methods.

use std::sync::Arc;

use glam::DVec2;
use tilemodels_decode::{ModelKind, Placement};
use web_time::Instant;

use crate::{
    animation::Playback,
    asset::ModelAsset,
    assemble::{place, placement_scale_unit, populate},
    config::{DEFAULT_LIGHT_DIRECTION, LayerConfig, Sun, SunOptions},
    coords::{LatLon, clamp_zoom, lat_lon_to_tile_local, tile_world_matrix},
    error::{Error, Result},
    host::{InstanceDraw, LayerContext, ShadowDraw, TileDraw},
    instancing::batch_placements,
    pick::{PickHit, PickOutcome, pick},
    registry::{
        DisposeFlag, ModelEntry, ModelRegistry, RegistryEntry, TileEntry, TileRegistry,
    },
    runtime::Spawner,
    scene::TileScene,
    scheduler::FetchScheduler,
    shadow::{
        PlanarShadowMaterial, ShadowDepthMaterial, ShadowMap, ShadowTarget, shadow_view_projection,
        update_casters,
    },
    source::{ModelLoader, ModelRequest, TileContent, TileDecoder, TileSource},
    types::{DownloadState, TileId, TileState},
};

/// Called with the nearest placement under a click.
pub type PickCallback = Box<dyn FnMut(&PickHit)>;

/// Called when a click hits nothing.
pub type PickFailCallback = Box<dyn FnMut()>;

/// Collaborators a layer fetches content through.
#[derive(Clone)]
pub struct Sources {
    pub tiles: Arc<dyn TileSource>,
    pub decoder: Arc<dyn TileDecoder>,
    pub models: Arc<dyn ModelLoader>,
}

enum TileOutcome {
    Content(TileContent),
    Failed(Error),
    Cancelled,
}

struct TileJob {
    tile: TileId,
    generation: u64,
    outcome: TileOutcome,
}

enum ModelOutcome {
    Ready(ModelAsset),
    Cancelled,
}

struct ModelJob {
    name: String,
    generation: u64,
    outcome: ModelOutcome,
}

/// A map layer streaming and drawing models placed by vector tiles.
pub struct ModelLayer {
    config: LayerConfig,
    sources: Sources,
    tiles: TileRegistry,
    models: ModelRegistry,
    tile_jobs: FetchScheduler<TileJob>,
    model_jobs: FetchScheduler<ModelJob>,
    context: Option<LayerContext>,
    visible: bool,
    sun: Option<Sun>,
    planar_material: PlanarShadowMaterial,
    shadow_map: ShadowMap,
    render_set: Vec<TileId>,
    maintained: bool,
    clock: Option<Instant>,
    on_pick: Option<PickCallback>,
    on_pick_fail: Option<PickFailCallback>,
}

impl std::fmt::Debug for ModelLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLayer")
            .field("id", &self.config.id)
            .field("tiles", &self.tiles.len())
            .field("models", &self.models.len())
            .field("attached", &self.context.is_some())
            .field("visible", &self.visible)
            .finish_non_exhaustive()
    }
}

impl ModelLayer {
    /// Create a detached layer.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(config: LayerConfig, sources: Sources, spawner: Arc<dyn Spawner>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tiles: TileRegistry::new(config.max_tile_cache),
            models: ModelRegistry::new(config.max_model_cache),
            tile_jobs: FetchScheduler::new("tiles", config.tile_concurrency, Arc::clone(&spawner)),
            model_jobs: FetchScheduler::new("models", config.model_concurrency, spawner),
            context: None,
            visible: true,
            sun: config.sun.as_ref().map(Sun::from_options),
            planar_material: PlanarShadowMaterial::new(config.planar_shadow_opacity),
            shadow_map: ShadowMap::default(),
            render_set: Vec::new(),
            maintained: false,
            clock: None,
            on_pick: None,
            on_pick_fail: None,
            config,
            sources,
        })
    }

    #[must_use]
    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    /// Attach to a host. Replaces any previous context.
    pub fn attach(&mut self, context: LayerContext) {
        tracing::info!(layer = %self.config.id, "attached");
        self.context = Some(context);
    }

    /// Detach from the host, dropping every cached tile and model.
    ///
    /// Jobs already running complete but their results are discarded.
    pub fn detach(&mut self) {
        if self.context.take().is_none() {
            return;
        }
        self.tile_jobs.clear_queue();
        self.model_jobs.clear_queue();
        self.tiles.clear();
        self.models.clear();
        self.render_set.clear();
        self.shadow_map.clear();
        self.clock = None;
        tracing::info!(layer = %self.config.id, "detached");
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.context.is_some()
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.repaint();
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Move the sun. Relights every cached tile scene.
    pub fn set_sun(&mut self, options: &SunOptions) {
        let sun = Sun::from_options(options);
        for entry in self.tiles.entries_mut() {
            if let Some(scene) = entry.scene.as_mut() {
                scene.set_sun_direction(sun.direction);
            }
        }
        tracing::debug!(
            altitude = sun.position.altitude,
            azimuth = sun.position.azimuth,
            shadow = sun.shadow,
            "sun moved"
        );
        self.sun = Some(sun);
        self.repaint();
    }

    #[must_use]
    pub fn sun(&self) -> Option<&Sun> {
        self.sun.as_ref()
    }

    pub fn on_pick(&mut self, callback: impl FnMut(&PickHit) + 'static) {
        self.on_pick = Some(Box::new(callback));
    }

    pub fn on_pick_fail(&mut self, callback: impl FnMut() + 'static) {
        self.on_pick_fail = Some(Box::new(callback));
    }

    /// Host pre-render hook. Runs per-frame maintenance.
    pub fn pre_render(&mut self) {
        if !self.visible || self.context.is_none() {
            return;
        }
        self.maintain();
        self.maintained = true;
    }

    /// Draw the layer. Runs maintenance first if the host has no pre-render
    /// hook.
    pub fn render(&mut self) {
        if !self.visible || self.context.is_none() {
            return;
        }
        if !self.maintained {
            self.maintain();
        }
        self.maintained = false;

        let now = Instant::now();
        let dt = self
            .clock
            .replace(now)
            .map_or(0.0, |last| now.duration_since(last).as_secs_f64());
        let animating = self.advance_animations(dt);

        let Self {
            config,
            tiles,
            models,
            context,
            sun,
            planar_material,
            shadow_map,
            render_set,
            ..
        } = self;
        let Some(LayerContext { host, backend }) = context.as_mut() else {
            return;
        };

        backend.clear_stencil();
        shadow_map.clear();
        let shadow_sun = sun.filter(|sun| sun.shadow);

        if let Some(sun) = shadow_sun {
            let camera = host.camera();
            let view_projection =
                shadow_view_projection(&camera, sun.position.altitude, sun.position.azimuth);
            *shadow_map = ShadowMap::new(
                ShadowTarget::square(config.shadow_map_size),
                view_projection,
                camera.far,
            );
            let world_size = host.world_size();

            backend.begin_shadow_pass(&shadow_map.target);
            for &tile in render_set.iter() {
                let Some(scene) = tiles.peek(&tile).and_then(|entry| entry.scene.as_ref()) else {
                    continue;
                };
                let light_space = shadow_map.record(tile, tile_world_matrix(tile, world_size));
                backend.draw_shadow_tile(&ShadowDraw {
                    tile,
                    scene,
                    material: ShadowDepthMaterial {
                        light_space,
                        far: shadow_map.far,
                    },
                });
            }
            backend.end_shadow_pass();
        }

        let models = &*models;
        for &tile in render_set.iter() {
            let projection = host.projection_matrix(tile, config.apply_globe_matrix);
            let Some(scene) = tiles.peek_mut(&tile).and_then(|entry| entry.scene.as_mut()) else {
                continue;
            };
            if let Some(sun) = shadow_sun {
                update_casters(scene, sun.direction);
            }
            let scene = &*scene;
            let instances: Vec<InstanceDraw<'_>> = scene
                .instances()
                .iter()
                .filter_map(|batch| {
                    let asset = models.peek(&batch.model_name)?.ready_asset()?;
                    Some(InstanceDraw { batch, asset })
                })
                .collect();
            backend.draw_tile(&TileDraw {
                tile,
                scene,
                projection,
                shadow: shadow_map.compare_material(tile),
                planar_shadow: shadow_sun.map(|_| *planar_material),
                instances: &instances,
            });
        }

        if animating {
            host.trigger_repaint();
        }
    }

    /// Advance the animation clips of every tile in the render set by `dt`
    /// seconds. Returns whether any clip is playing.
    ///
    /// [`render`](Self::render) calls this with the time since the last
    /// frame.
    pub fn advance_animations(&mut self, dt: f64) -> bool {
        let mut playing = false;
        for tile in &self.render_set {
            if let Some(scene) = self.tiles.peek_mut(tile).and_then(|e| e.scene.as_mut()) {
                playing |= scene.advance_animations(dt);
            }
        }
        playing
    }

    /// Place a copy of the loaded model `model` at `position` with object
    /// scale `scale`, under the placement id `id`. The placement goes into
    /// the tile containing `position` at the current zoom, which must be
    /// loaded. Every animation clip of the model starts playing on it.
    ///
    /// Returns the tile the placement was added to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if the layer is detached or the model or
    /// tile is not loaded, and [`Error::InvalidData`] if `id` is empty or
    /// already placed in that tile.
    pub fn add_placement(
        &mut self,
        id: &str,
        model: &str,
        position: LatLon,
        scale: f64,
    ) -> Result<TileId> {
        let Some(LayerContext { host, .. }) = self.context.as_ref() else {
            return Err(Error::NotReady {
                what: "layer",
                name: self.config.id.clone(),
            });
        };
        let zoom = clamp_zoom(self.config.min_zoom, self.config.max_zoom, host.zoom());
        let (tile, local) = lat_lon_to_tile_local(zoom, position);

        let Some(entry) = self.models.peek(&model.to_string()) else {
            return Err(Error::NotReady {
                what: "model",
                name: model.to_string(),
            });
        };
        let Some(asset) = entry.ready_asset() else {
            return Err(Error::NotReady {
                what: "model",
                name: model.to_string(),
            });
        };
        let Some(scene) = self.tiles.peek_mut(&tile).and_then(|e| e.scene.as_mut()) else {
            return Err(Error::NotReady {
                what: "tile",
                name: tile.key(),
            });
        };
        if id.is_empty() || scene.placement_root(id).is_some() {
            return Err(Error::InvalidData {
                context: "placement",
                detail: format!("id {id:?} is empty or already placed in {tile}"),
            });
        }

        let placement = Placement {
            id: id.to_string(),
            model_name: model.to_string(),
            model_url: String::new(),
            model_kind: ModelKind::Object,
            texture_name: String::new(),
            texture_url: String::new(),
            x: local.x,
            y: local.y,
            bearing: 0.0,
            scale,
        };
        let root = place(scene, &placement, asset, placement_scale_unit(tile, &placement));
        scene.scene.update_world_matrices();
        if let Some(playback) = Playback::start(root, &entry.animations) {
            scene.add_playback(playback);
        }
        tracing::debug!(%tile, placement = id, model, "added placement");

        if !self.render_set.contains(&tile) {
            self.render_set.push(tile);
        }
        self.repaint();
        Ok(tile)
    }

    /// Pick the placement under `point`, in viewport pixels, and notify the
    /// pick callbacks.
    pub fn handle_click(&mut self, point: DVec2) -> PickOutcome {
        if !self.visible {
            return PickOutcome::Miss;
        }
        let Some(LayerContext { host, .. }) = self.context.as_ref() else {
            return PickOutcome::Miss;
        };

        let ndc = host.viewport().to_ndc(point);
        let zoom = clamp_zoom(self.config.min_zoom, self.config.max_zoom, host.zoom());
        let globe = self.config.apply_globe_matrix;
        let tiles = &self.tiles;
        let candidates = host
            .covering_tiles(zoom, self.config.tile_size)
            .into_iter()
            .filter_map(|tile| {
                let scene = tiles.peek(&tile)?.scene.as_ref()?;
                Some((tile, scene, host.projection_matrix(tile, globe)))
            });
        let outcome = pick(candidates, ndc);

        match &outcome {
            PickOutcome::Hit(hit) => {
                tracing::debug!(tile = %hit.tile, placement = %hit.placement_id, distance = hit.distance, "picked");
                if let Some(callback) = self.on_pick.as_mut() {
                    callback(hit);
                }
            }
            PickOutcome::Miss => {
                if let Some(callback) = self.on_pick_fail.as_mut() {
                    callback();
                }
            }
        }
        self.repaint();
        outcome
    }

    /// Tiles drawn by the last maintenance pass.
    #[must_use]
    pub fn render_set(&self) -> &[TileId] {
        &self.render_set
    }

    #[must_use]
    pub fn tile_state(&self, tile: TileId) -> Option<TileState> {
        self.tiles.peek(&tile).map(|entry| entry.state)
    }

    #[must_use]
    pub fn tile_scene(&self, tile: TileId) -> Option<&TileScene> {
        self.tiles.peek(&tile).and_then(|entry| entry.scene.as_ref())
    }

    #[must_use]
    pub fn model_state(&self, name: &str) -> Option<DownloadState> {
        self.models.peek(&name.to_string()).map(|entry| entry.download)
    }

    /// Loaded asset of model `name`.
    #[must_use]
    pub fn model_asset(&self, name: &str) -> Option<&ModelAsset> {
        self.models
            .peek(&name.to_string())
            .and_then(ModelEntry::ready_asset)
    }

    /// Whether any fetch job is running or queued.
    #[must_use]
    pub fn has_pending_jobs(&self) -> bool {
        !self.tile_jobs.is_idle() || !self.model_jobs.is_idle()
    }

    fn repaint(&self) {
        if let Some(context) = &self.context {
            context.host.trigger_repaint();
        }
    }

    fn light_direction(&self) -> glam::DVec3 {
        self.sun.map_or(DEFAULT_LIGHT_DIRECTION, |sun| sun.direction)
    }

    fn maintain(&mut self) {
        let Some(LayerContext { host, .. }) = self.context.as_ref() else {
            return;
        };
        let zoom = clamp_zoom(self.config.min_zoom, self.config.max_zoom, host.zoom());
        let visible = host.covering_tiles(zoom, self.config.tile_size);

        let mut committed = false;
        for job in self.tile_jobs.poll() {
            committed |= self.commit_tile(job);
        }
        for job in self.model_jobs.poll() {
            committed |= self.commit_model(job);
        }

        let instanced = self.config.is_instanced();
        if instanced {
            let missing: Vec<ModelRequest> = self
                .config
                .instance_models
                .iter()
                .filter(|path| !self.models.contains(path))
                .map(|path| ModelRequest::for_variant(path, &self.config.root_url))
                .collect();
            for request in missing {
                self.request_model(request);
            }
        }

        self.render_set.clear();
        for tile in visible {
            if tile.z != zoom {
                tracing::error!(%tile, zoom, "host returned a covering tile at the wrong zoom");
                continue;
            }
            let Some(entry) = self.tiles.get(&tile) else {
                self.request_tile(tile);
                continue;
            };
            if entry.state != TileState::Loaded {
                continue;
            }

            let mut missing: Vec<ModelRequest> = Vec::new();
            for placement in &entry.placements {
                if instanced
                    || placement.model_name.is_empty()
                    || self.models.contains(&placement.model_name)
                    || missing.iter().any(|r| r.name == placement.model_name)
                {
                    continue;
                }
                missing.push(ModelRequest::for_placement(placement, &self.config.root_url));
            }
            for request in missing {
                self.request_model(request);
            }

            if let Some(entry) = self.tiles.peek_mut(&tile) {
                if !instanced && populate(entry, &mut self.models) > 0 {
                    committed = true;
                }
                if entry.scene.as_ref().is_some_and(TileScene::has_content) {
                    self.render_set.push(tile);
                }
            }
        }

        if committed {
            self.repaint();
        }
    }

    fn request_tile(&mut self, tile: TileId) {
        let generation = self.tiles.next_generation();
        let entry = TileEntry::preparing(tile, generation);
        let dispose = entry.dispose_flag().clone();
        if let Some((evicted, _)) = self.tiles.insert(tile, entry) {
            tracing::debug!(%evicted, "evicted tile");
        }
        tracing::debug!(%tile, generation, "requesting tile");

        let fetch = self.sources.tiles.fetch_tile(tile);
        let decoder = Arc::clone(&self.sources.decoder);
        let source_layer = self.config.source_layer.clone();
        self.tile_jobs.enqueue(async move {
            let outcome = match fetch.await {
                Err(e) => TileOutcome::Failed(e),
                Ok(_) if dispose.is_raised() => TileOutcome::Cancelled,
                Ok(data) => match decoder.decode(&data, &source_layer) {
                    Ok(content) => TileOutcome::Content(content),
                    Err(e) => TileOutcome::Failed(e),
                },
            };
            TileJob {
                tile,
                generation,
                outcome,
            }
        });
    }

    /// Returns whether the job changed a tile.
    fn commit_tile(&mut self, job: TileJob) -> bool {
        let TileJob {
            tile,
            generation,
            outcome,
        } = job;
        if matches!(outcome, TileOutcome::Cancelled) {
            tracing::debug!(%tile, generation, "tile fetch cancelled");
            return false;
        }
        let light = self.light_direction();
        let LayerConfig {
            source_layer,
            instance_models,
            instance_remainder,
            ..
        } = &self.config;
        let Some(entry) = self.tiles.commit_target(&tile, generation) else {
            tracing::debug!(%tile, generation, "superseded tile result");
            return false;
        };

        entry.download = DownloadState::Loaded;
        match outcome {
            TileOutcome::Content(TileContent::Placements(placements)) => {
                tracing::debug!(%tile, placements = placements.len(), "tile loaded");
                let mut scene = TileScene::new(light);
                if !instance_models.is_empty() {
                    scene.set_instances(batch_placements(
                        tile,
                        &placements,
                        instance_models,
                        *instance_remainder,
                    ));
                }
                entry.placements = placements;
                entry.scene = Some(scene);
                entry.state = TileState::Loaded;
            }
            TileOutcome::Content(TileContent::MissingLayer) => {
                let error = Error::UnsupportedLayer {
                    layer: source_layer.clone(),
                };
                tracing::debug!(%tile, %error, "tile not supported");
                entry.state = TileState::NotSupported;
            }
            TileOutcome::Failed(error) => {
                tracing::warn!(%tile, %error, "tile failed");
                entry.state = TileState::Error;
            }
            TileOutcome::Cancelled => {}
        }
        true
    }

    fn request_model(&mut self, request: ModelRequest) {
        let generation = self.models.next_generation();
        let mut entry = ModelEntry::downloading(request.name.clone(), generation);

        if request.url.is_empty() || matches!(request.kind, ModelKind::Other(_)) {
            tracing::debug!(model = %request.name, kind = ?request.kind, "no loadable model, using placeholder");
            entry.asset = Some(ModelAsset::placeholder());
            entry.download = DownloadState::Loaded;
            self.insert_model(request.name, entry);
            return;
        }

        let dispose = entry.dispose_flag().clone();
        self.insert_model(request.name.clone(), entry);
        tracing::debug!(model = %request.name, url = %request.url, "requesting model");

        let loader = Arc::clone(&self.sources.models);
        self.model_jobs.enqueue(async move {
            let outcome = load_model(loader.as_ref(), &request, &dispose).await;
            ModelJob {
                name: request.name,
                generation,
                outcome,
            }
        });
    }

    fn insert_model(&mut self, name: String, entry: ModelEntry) {
        if let Some((evicted, _)) = self.models.insert(name, entry) {
            tracing::debug!(%evicted, "evicted model");
        }
    }

    /// Returns whether the job changed a model.
    fn commit_model(&mut self, job: ModelJob) -> bool {
        let ModelJob {
            name,
            generation,
            outcome,
        } = job;
        let ModelOutcome::Ready(asset) = outcome else {
            tracing::debug!(model = %name, generation, "model fetch cancelled");
            return false;
        };
        let Some(entry) = self.models.commit_target(&name, generation) else {
            tracing::debug!(model = %name, generation, "superseded model result");
            return false;
        };
        tracing::debug!(model = %name, placeholder = asset.is_placeholder(), "model loaded");
        entry.animations.clone_from(&asset.animations);
        entry.asset = Some(asset);
        entry.download = DownloadState::Loaded;
        true
    }
}

/// Load a model and its texture. Failures never escape: a model that
/// cannot be loaded becomes a placeholder and a texture that cannot be
/// loaded becomes edge outlines.
async fn load_model(
    loader: &dyn ModelLoader,
    request: &ModelRequest,
    dispose: &DisposeFlag,
) -> ModelOutcome {
    let mut asset = match loader.load_model(request).await {
        Ok(asset) => asset,
        Err(error) => {
            tracing::warn!(model = %request.name, %error, "model failed, using placeholder");
            return ModelOutcome::Ready(ModelAsset::placeholder());
        }
    };
    if dispose.is_raised() {
        return ModelOutcome::Cancelled;
    }

    if request.texture_url.is_empty() {
        asset.add_outlines();
        return ModelOutcome::Ready(asset);
    }
    match loader.load_texture(&request.texture_url).await {
        Ok(texture) if texture.is_valid() => asset.apply_texture(&Arc::new(texture)),
        Ok(_) => {
            tracing::warn!(model = %request.name, url = %request.texture_url, "texture is empty, drawing outlines");
            asset.add_outlines();
        }
        Err(error) => {
            tracing::warn!(model = %request.name, %error, "texture failed, drawing outlines");
            asset.add_outlines();
        }
    }
    ModelOutcome::Ready(asset)
}
