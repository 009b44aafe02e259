//! Layer configuration.
//!
//! Every field has a default, so a configuration file only needs to name
//! what differs. Deserialized with `serde`; the probe CLI reads it from JSON.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::{
    coords::MAX_ZOOM,
    error::{Error, Result},
    instancing::RemainderPolicy,
    registry::DEFAULT_CAPACITY,
    scheduler::DEFAULT_MAX_ACTIVE,
    sun::{SunPosition, sun_direction, sun_position_at, sun_position_now},
};

/// Sun placement and shadow switch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SunOptions {
    /// Whether shadows are drawn.
    pub shadow: bool,
    /// Altitude above the horizon in degrees.
    pub altitude: f64,
    /// Azimuth clockwise from north in degrees.
    pub azimuth: f64,
    /// When both are set, the position is computed for this location
    /// instead of using `altitude` and `azimuth`.
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl Default for SunOptions {
    fn default() -> Self {
        Self {
            shadow: true,
            altitude: 45.0,
            azimuth: 180.0,
            lat: None,
            lon: None,
        }
    }
}

impl SunOptions {
    /// Fixed sun at `altitude` and `azimuth` degrees.
    #[must_use]
    pub fn fixed(altitude: f64, azimuth: f64, shadow: bool) -> Self {
        Self {
            shadow,
            altitude,
            azimuth,
            lat: None,
            lon: None,
        }
    }

    /// Sun position at `unix_seconds`.
    #[must_use]
    pub fn position_at(&self, unix_seconds: f64) -> SunPosition {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => sun_position_at(lat, lon, unix_seconds),
            _ => SunPosition {
                altitude: self.altitude,
                azimuth: self.azimuth,
            },
        }
    }

    /// Sun position now.
    #[must_use]
    pub fn position(&self) -> SunPosition {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => sun_position_now(lat, lon),
            _ => SunPosition {
                altitude: self.altitude,
                azimuth: self.azimuth,
            },
        }
    }
}

/// Resolved sun state used while rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sun {
    pub position: SunPosition,
    pub direction: DVec3,
    pub shadow: bool,
}

impl Sun {
    #[must_use]
    pub fn new(position: SunPosition, shadow: bool) -> Self {
        Self {
            position,
            direction: sun_direction(position.altitude.to_radians(), position.azimuth.to_radians()),
            shadow,
        }
    }

    #[must_use]
    pub fn from_options(options: &SunOptions) -> Self {
        Self::new(options.position(), options.shadow)
    }
}

/// Light direction used for tile scenes when no sun is configured.
pub const DEFAULT_LIGHT_DIRECTION: DVec3 = DVec3::new(0.5, 0.5, 0.5);

/// Configuration of a [`ModelLayer`](crate::ModelLayer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub id: String,
    /// Vector tile URL template with `{z}`, `{x}` and `{y}` placeholders.
    pub tile_url: String,
    /// Name of the vector tile layer carrying placements.
    pub source_layer: String,
    /// Prefix joined to model and texture URLs.
    pub root_url: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_size: u32,
    pub max_tile_cache: usize,
    pub max_model_cache: usize,
    pub tile_concurrency: usize,
    pub model_concurrency: usize,
    /// Ask the host for globe-aware projection matrices.
    pub apply_globe_matrix: bool,
    /// Sun and shadows. No sun disables shadows.
    pub sun: Option<SunOptions>,
    pub planar_shadow_opacity: f32,
    /// Edge length of the square shadow map in texels.
    pub shadow_map_size: u32,
    /// Model paths, relative to `root_url`, that tile features are dealt
    /// over as instances. Empty places each feature's own model.
    pub instance_models: Vec<String>,
    pub instance_remainder: RemainderPolicy,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            id: "tilemodels".to_string(),
            tile_url: String::new(),
            source_layer: "models".to_string(),
            root_url: String::new(),
            min_zoom: 16,
            max_zoom: 19,
            tile_size: 512,
            max_tile_cache: DEFAULT_CAPACITY,
            max_model_cache: DEFAULT_CAPACITY,
            tile_concurrency: DEFAULT_MAX_ACTIVE,
            model_concurrency: DEFAULT_MAX_ACTIVE,
            apply_globe_matrix: true,
            sun: Some(SunOptions::default()),
            planar_shadow_opacity: 0.15,
            shadow_map_size: 512,
            instance_models: Vec::new(),
            instance_remainder: RemainderPolicy::default(),
        }
    }
}

impl LayerConfig {
    /// Check field combinations serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] if the zoom range is empty, a cache
    /// or concurrency bound is zero, the opacity is outside `0..=1`, or an
    /// instance model path is empty.
    pub fn validate(&self) -> Result<()> {
        let invalid = |detail: String| {
            Err(Error::InvalidData {
                context: "layer config",
                detail,
            })
        };
        if self.min_zoom > self.max_zoom {
            return invalid(format!(
                "min_zoom {} is above max_zoom {}",
                self.min_zoom, self.max_zoom
            ));
        }
        if self.max_zoom > MAX_ZOOM {
            return invalid(format!("max_zoom {} is above {MAX_ZOOM}", self.max_zoom));
        }
        for (name, value) in [
            ("max_tile_cache", self.max_tile_cache),
            ("max_model_cache", self.max_model_cache),
            ("tile_concurrency", self.tile_concurrency),
            ("model_concurrency", self.model_concurrency),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be at least 1"));
            }
        }
        if !(0.0..=1.0).contains(&self.planar_shadow_opacity) {
            return invalid(format!(
                "planar_shadow_opacity {} is outside 0..=1",
                self.planar_shadow_opacity
            ));
        }
        if self.instance_models.iter().any(String::is_empty) {
            return invalid("instance_models contains an empty path".to_string());
        }
        Ok(())
    }

    /// Whether tiles are drawn as instance batches.
    #[must_use]
    pub fn is_instanced(&self) -> bool {
        !self.instance_models.is_empty()
    }

    /// Model URL for a placement's relative model path.
    #[must_use]
    pub fn model_url(&self, relative: &str) -> String {
        format!("{}{relative}", self.root_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LayerConfig::default();
        assert_eq!((config.min_zoom, config.max_zoom), (16, 19));
        assert_eq!(config.tile_size, 512);
        assert_eq!(config.max_tile_cache, 1024);
        assert_eq!(config.model_concurrency, 8);
        assert!(config.apply_globe_matrix);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LayerConfig = serde_json::from_str(
            r#"{
                "tile_url": "https://tiles.example.com/{z}/{x}/{y}.pbf",
                "source_layer": "map4d_3dmodels",
                "max_zoom": 18,
                "sun": { "altitude": 30.0, "lat": 21.0, "lon": 105.8 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.source_layer, "map4d_3dmodels");
        assert_eq!(config.max_zoom, 18);
        assert_eq!(config.min_zoom, 16);
        let sun = config.sun.unwrap();
        assert!(sun.shadow);
        assert_eq!(sun.altitude, 30.0);
        assert_eq!(sun.lat, Some(21.0));
    }

    #[test]
    fn test_null_sun_disables_shadows() {
        let config: LayerConfig = serde_json::from_str(r#"{ "sun": null }"#).unwrap();
        assert!(config.sun.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let config = LayerConfig {
            min_zoom: 18,
            max_zoom: 16,
            ..LayerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidData { .. })));

        let config = LayerConfig {
            tile_concurrency: 0,
            ..LayerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = LayerConfig {
            planar_shadow_opacity: 1.5,
            ..LayerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = LayerConfig {
            max_zoom: MAX_ZOOM + 1,
            ..LayerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = LayerConfig {
            instance_models: vec![String::new()],
            ..LayerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_instance_models_from_json() {
        let config: LayerConfig = serde_json::from_str(
            r#"{ "instance_models": ["trees/oak.glb"], "instance_remainder": "spread" }"#,
        )
        .unwrap();
        assert!(config.is_instanced());
        assert_eq!(config.instance_remainder, RemainderPolicy::Spread);
        assert!(!LayerConfig::default().is_instanced());
    }

    #[test]
    fn test_fixed_sun_ignores_clock() {
        let options = SunOptions::fixed(20.0, 90.0, false);
        let position = options.position_at(0.0);
        assert_eq!(position.altitude, 20.0);
        assert_eq!(position.azimuth, 90.0);
        assert_eq!(options.position(), position);
    }

    #[test]
    fn test_located_sun_uses_clock() {
        let options = SunOptions {
            lat: Some(50.5),
            lon: Some(30.5),
            ..SunOptions::default()
        };
        let position = options.position_at(1_362_441_600.0);
        assert!(position.altitude < 0.0);
    }

    #[test]
    fn test_sun_direction_from_degrees() {
        let sun = Sun::new(
            SunPosition {
                altitude: 90.0,
                azimuth: 0.0,
            },
            true,
        );
        assert!((sun.direction - DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn test_model_url_joins_root() {
        let config = LayerConfig {
            root_url: "https://cdn.example.com/".to_string(),
            ..LayerConfig::default()
        };
        assert_eq!(config.model_url("a/b.obj"), "https://cdn.example.com/a/b.obj");
    }
}
