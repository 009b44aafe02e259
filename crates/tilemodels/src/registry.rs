//! Tile and model registries.
//!
//! Both registries are [`LruCache`]s whose dispose hook marks an in-flight
//! entry as [`DownloadState::Disposed`] and raises its [`DisposeFlag`]. Fetch
//! jobs never hold a reference into a registry: they report back with the
//! key and the generation they were started for, and the commit point looks
//! the entry up again through [`Registry::commit_target`].

use std::{
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tilemodels_decode::Placement;

use crate::{
    asset::{AnimationClip, ModelAsset},
    cache::LruCache,
    scene::TileScene,
    types::{DownloadState, TileId, TileState},
};

/// Default capacity of both registries.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Advisory cancellation flag shared between an entry and its fetch job.
#[derive(Debug, Clone, Default)]
pub struct DisposeFlag(Arc<AtomicBool>);

impl DisposeFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Bookkeeping shared by registry entries.
pub trait RegistryEntry {
    fn download(&self) -> DownloadState;
    fn set_download(&mut self, state: DownloadState);
    fn generation(&self) -> u64;
    fn dispose_flag(&self) -> &DisposeFlag;
}

fn dispose_entry<K, E: RegistryEntry>(_key: &K, entry: &mut E) {
    if entry.download() == DownloadState::Downloading {
        entry.set_download(DownloadState::Disposed);
        entry.dispose_flag().raise();
    }
}

/// A cached tile.
#[derive(Debug)]
pub struct TileEntry {
    pub tile: TileId,
    pub state: TileState,
    pub download: DownloadState,
    /// Present once the tile is `Loaded`.
    pub scene: Option<TileScene>,
    pub placements: Vec<Placement>,
    generation: u64,
    dispose: DisposeFlag,
}

impl TileEntry {
    /// A freshly referenced tile, waiting for its fetch.
    #[must_use]
    pub fn preparing(tile: TileId, generation: u64) -> Self {
        Self {
            tile,
            state: TileState::Preparing,
            download: DownloadState::Downloading,
            scene: None,
            placements: Vec::new(),
            generation,
            dispose: DisposeFlag::new(),
        }
    }

    /// Number of placement roots in the tile scene.
    #[must_use]
    pub fn placed_count(&self) -> usize {
        self.scene.as_ref().map_or(0, TileScene::placed_count)
    }

    /// Whether every decoded placement has a root in the scene. Placements
    /// added at runtime do not count.
    #[must_use]
    pub fn is_fully_populated(&self) -> bool {
        self.scene.as_ref().is_some_and(|scene| {
            self.placements
                .iter()
                .all(|p| scene.placement_root(&p.id).is_some())
        })
    }
}

impl RegistryEntry for TileEntry {
    fn download(&self) -> DownloadState {
        self.download
    }

    fn set_download(&mut self, state: DownloadState) {
        self.download = state;
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn dispose_flag(&self) -> &DisposeFlag {
        &self.dispose
    }
}

/// A cached model, shared by every placement naming it.
#[derive(Debug)]
pub struct ModelEntry {
    pub name: String,
    pub download: DownloadState,
    /// Present once the model is `Loaded`. Failed models hold a placeholder.
    pub asset: Option<ModelAsset>,
    pub animations: Vec<AnimationClip>,
    generation: u64,
    dispose: DisposeFlag,
}

impl ModelEntry {
    /// A freshly referenced model, waiting for its fetch.
    #[must_use]
    pub fn downloading(name: impl Into<String>, generation: u64) -> Self {
        Self {
            name: name.into(),
            download: DownloadState::Downloading,
            asset: None,
            animations: Vec::new(),
            generation,
            dispose: DisposeFlag::new(),
        }
    }

    /// The loaded asset, if the model is ready for placement.
    #[must_use]
    pub fn ready_asset(&self) -> Option<&ModelAsset> {
        match self.download {
            DownloadState::Loaded => self.asset.as_ref(),
            DownloadState::Downloading | DownloadState::Disposed => None,
        }
    }
}

impl RegistryEntry for ModelEntry {
    fn download(&self) -> DownloadState {
        self.download
    }

    fn set_download(&mut self, state: DownloadState) {
        self.download = state;
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn dispose_flag(&self) -> &DisposeFlag {
        &self.dispose
    }
}

/// An LRU registry of fetchable entries.
#[derive(Debug)]
pub struct Registry<K, E> {
    cache: LruCache<K, E>,
    generation: u64,
}

/// Tiles keyed by address.
pub type TileRegistry = Registry<TileId, TileEntry>;

/// Models keyed by model name.
pub type ModelRegistry = Registry<String, ModelEntry>;

impl<K, E> Registry<K, E>
where
    K: Clone + Eq + Hash + 'static,
    E: RegistryEntry + 'static,
{
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::with_dispose_hook(capacity, dispose_entry::<K, E>),
            generation: 0,
        }
    }

    /// Reserve a generation number for a new entry.
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Get an entry, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&mut E> {
        self.cache.get(key)
    }

    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&E> {
        self.cache.peek(key)
    }

    pub fn peek_mut(&mut self, key: &K) -> Option<&mut E> {
        self.cache.peek_mut(key)
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains(key)
    }

    /// Insert an entry, returning the one evicted to make room.
    pub fn insert(&mut self, key: K, entry: E) -> Option<(K, E)> {
        self.cache.set(key, entry)
    }

    /// The entry a fetch completion should be committed to.
    ///
    /// Returns `None` when the completion is superseded: the entry was
    /// evicted, replaced by a newer generation, or disposed. Does not touch
    /// recency.
    pub fn commit_target(&mut self, key: &K, generation: u64) -> Option<&mut E> {
        self.cache.peek_mut(key).filter(|entry| {
            entry.generation() == generation && entry.download() == DownloadState::Downloading
        })
    }

    /// Every entry, without touching recency.
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut E> {
        self.cache.values_mut()
    }

    /// Dispose and drop every entry.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }
}
