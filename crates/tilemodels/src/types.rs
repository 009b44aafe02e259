//! Core types shared across the engine.

use std::fmt;

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Address of a tile in the z/x/y pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    /// Create a tile address.
    #[must_use]
    pub const fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at this tile's zoom, saturating at
    /// `u32::MAX` past zoom 31.
    #[must_use]
    pub fn tiles_per_axis(self) -> u32 {
        1u32.checked_shl(u32::from(self.z)).unwrap_or(u32::MAX)
    }

    /// Canonical cache key, `z/x/y`.
    #[must_use]
    pub fn key(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Processing state of a tile's content.
///
/// `Loaded`, `NotSupported` and `Error` are terminal; a tile only leaves
/// them by being evicted and recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Waiting for fetch and decode.
    Preparing,
    /// Placements decoded and a scene created.
    Loaded,
    /// The tile has no layer with the configured source layer name.
    NotSupported,
    /// Fetch or decode failed.
    Error,
}

/// Transfer state of a cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    /// A fetch job is queued or running.
    Downloading,
    /// The fetch job has been committed.
    Loaded,
    /// Evicted while downloading. Its completion will be discarded.
    Disposed,
}

/// Size of the host viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Convert a pointer position to normalized device coordinates.
    ///
    /// The top-left pixel maps to (-1, 1), the bottom-right to (1, -1).
    #[must_use]
    pub fn to_ndc(&self, point: DVec2) -> DVec2 {
        DVec2::new(
            point.x / self.width * 2.0 - 1.0,
            -(point.y / self.height * 2.0 - 1.0),
        )
    }
}
