//! Streaming, caching and rendering engine for 3D models placed on map
//! tiles.
//!
//! A [`ModelLayer`] attaches to a slippy map host. Every frame it works out
//! which tiles cover the view, fetches their placement payloads, fetches the
//! models those placements reference, and assembles a per-tile scene of
//! placed models with planar shadows. A log-depth shadow map pass and ray
//! picking of placed models run against the same scenes.
//!
//! # Design principles
//!
//! - **Render-timeline state**: Caches and scenes are owned by the layer and
//!   only touched from `&mut self` methods; fetch jobs hand results back
//!   over a channel
//! - **Pluggable I/O**: Tile sources, decoders and model loaders are traits,
//!   with HTTP implementations in [`client`]
//! - **Backend-agnostic rendering**: The layer produces draw descriptions for
//!   a [`RenderBackend`]; it never talks to a GPU API
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilemodels::{
//!     HttpModelLoader, HttpTileSource, LayerConfig, LayerContext, ModelLayer, MvtDecoder,
//!     Sources, TokioSpawner,
//! };
//!
//! let config = LayerConfig {
//!     tile_url: "https://tiles.example.com/{z}/{x}/{y}.pbf".into(),
//!     root_url: "https://models.example.com/".into(),
//!     ..LayerConfig::default()
//! };
//! let sources = Sources {
//!     tiles: Arc::new(HttpTileSource::new(config.tile_url.clone())),
//!     decoder: Arc::new(MvtDecoder),
//!     models: Arc::new(HttpModelLoader::new(my_parser)),
//! };
//! let mut layer = ModelLayer::new(config, sources, Arc::new(TokioSpawner::current()?))?;
//! layer.attach(LayerContext::new(Box::new(host), Box::new(backend)));
//!
//! // Each frame:
//! layer.pre_render();
//! layer.render();
//! ```

pub mod animation;
pub mod assemble;
pub mod asset;
pub mod cache;
pub mod client;
pub mod config;
pub mod coords;
mod error;
pub mod host;
pub mod instancing;
mod layer;
pub mod outline;
pub mod pick;
pub mod registry;
pub mod runtime;
pub mod scene;
pub mod scheduler;
pub mod shadow;
pub mod source;
pub mod sun;
#[cfg(test)]
mod testing;
pub mod types;

pub use asset::{ModelAsset, MeshGeometry};
pub use cache::LruCache;
pub use client::{HttpModelLoader, HttpTileSource};
pub use config::{LayerConfig, Sun, SunOptions};
pub use coords::LatLon;
pub use error::{Error, Result};
pub use host::{InstanceDraw, LayerContext, MapHost, RenderBackend, ShadowDraw, TileDraw};
pub use layer::{ModelLayer, PickCallback, PickFailCallback, Sources};
pub use pick::{PickHit, PickOutcome};
pub use registry::{ModelRegistry, TileRegistry};
pub use runtime::{Spawner, TokioSpawner};
pub use scene::TileScene;
pub use source::{AssetParser, ModelLoader, ModelRequest, MvtDecoder, TileContent, TileDecoder, TileSource};
pub use sun::SunPosition;
pub use types::{DownloadState, TileId, TileState, Viewport};

// Re-export decode types for convenience.
pub use tilemodels_decode::{DecodedTexture, ModelKind, Placement};
