//! Model placement extraction from point features.

use std::collections::HashMap;

use prost::Message;
use tilemodels_proto::{
    Tile,
    tile::{Feature, GeomType, Layer},
};

use crate::{
    error::DecodeResult,
    geometry::first_point,
    properties::{PropertyValue, feature_properties},
};

/// Tile-local coordinate extent. Decoded coordinates lie in `0..EXTENT`.
pub const EXTENT: f64 = 8192.0;

/// The asset format a placement refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Wavefront OBJ with a separate texture.
    Object,
    /// Binary or JSON glTF.
    Gltf,
    /// Any other declared type. Resolved to a placeholder.
    Other(String),
}

impl ModelKind {
    /// Parse the `modeltype` property.
    #[must_use]
    pub fn from_property(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "object" | "obj" => Self::Object,
            "glb" | "gltf" => Self::Gltf,
            _ => Self::Other(value.to_string()),
        }
    }
}

/// A single model instance declared by a tile.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Feature id, unique within the tile.
    pub id: String,
    /// Shared model name used as the model cache key.
    pub model_name: String,
    /// Model URL relative to the layer's root URL.
    pub model_url: String,
    /// Declared model format.
    pub model_kind: ModelKind,
    pub texture_name: String,
    pub texture_url: String,
    /// Local x in `0..EXTENT`.
    pub x: f64,
    /// Local y in `0..EXTENT`, growing southward.
    pub y: f64,
    /// Clockwise rotation from north, in degrees.
    pub bearing: f64,
    /// Uniform object scale.
    pub scale: f64,
}

fn text(properties: &HashMap<String, PropertyValue>, key: &str) -> String {
    properties
        .get(key)
        .map(PropertyValue::to_text)
        .unwrap_or_default()
}

fn number(properties: &HashMap<String, PropertyValue>, key: &str, default: f64) -> f64 {
    properties
        .get(key)
        .and_then(PropertyValue::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// Convert one feature into a placement.
///
/// Returns `Ok(None)` for features that are not points, have no geometry,
/// or lack any of the model name, model URL, model type, texture name and
/// texture URL properties.
///
/// # Errors
///
/// Returns an error if the feature's geometry or tags are malformed.
pub fn placement_from_feature(layer: &Layer, feature: &Feature) -> DecodeResult<Option<Placement>> {
    if feature.r#type() != GeomType::Point {
        return Ok(None);
    }
    let Some(point) = first_point(&feature.geometry)? else {
        return Ok(None);
    };

    let properties = feature_properties(layer, feature)?;
    let model_name = text(&properties, "modelname");
    let model_url = text(&properties, "modelurl");
    let model_type = text(&properties, "modeltype");
    let texture_name = text(&properties, "texturename");
    let texture_url = text(&properties, "textureurl");

    if [&model_name, &model_url, &model_type, &texture_name, &texture_url]
        .iter()
        .any(|s| s.is_empty())
    {
        return Ok(None);
    }

    let id = properties
        .get("id")
        .map(PropertyValue::to_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| feature.id().to_string());

    let ratio = EXTENT / f64::from(layer.extent().max(1));

    Ok(Some(Placement {
        id,
        model_name,
        model_url,
        model_kind: ModelKind::from_property(&model_type),
        texture_name,
        texture_url,
        x: f64::from(point.x) * ratio,
        y: f64::from(point.y) * ratio,
        bearing: number(&properties, "bearing", 0.0),
        scale: number(&properties, "scale", 1.0),
    }))
}

/// Decode a tile payload into the placements of one source layer.
///
/// Returns `Ok(None)` if the tile has no layer named `source_layer`.
/// Features that do not describe a complete placement are skipped.
///
/// # Errors
///
/// Returns an error if the payload is not a valid vector tile or a kept
/// layer's features are malformed.
pub fn decode_placements(data: &[u8], source_layer: &str) -> DecodeResult<Option<Vec<Placement>>> {
    let tile = Tile::decode(data)?;
    let Some(layer) = tile.layers.iter().find(|l| l.name == source_layer) else {
        return Ok(None);
    };

    let mut placements = Vec::with_capacity(layer.features.len());
    for feature in &layer.features {
        if let Some(placement) = placement_from_feature(layer, feature)? {
            placements.push(placement);
        }
    }
    Ok(Some(placements))
}
