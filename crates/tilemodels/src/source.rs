//! Collaborator seams for fetching and decoding tile and model content.
//!
//! Every future returned here is `Send + 'static` so it can run on a
//! [`Spawner`](crate::runtime::Spawner) detached from the layer that
//! requested it. Implementations keep their shared state behind `Arc`s or
//! cheaply clonable handles.

use std::{future::Future, pin::Pin};

use tilemodels_decode::{DecodedTexture, ModelKind, Placement, decode_placements};

use crate::{asset::ModelAsset, error::Result, types::TileId};

/// Future returned by fetch operations.
pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Source of raw tile payloads.
pub trait TileSource: Send + Sync {
    /// Fetch the payload of `tile`.
    fn fetch_tile(&self, tile: TileId) -> FetchFuture<Vec<u8>>;
}

/// What a tile payload holds for the configured source layer.
#[derive(Debug, Clone, PartialEq)]
pub enum TileContent {
    Placements(Vec<Placement>),
    /// The payload has no layer with the source layer name.
    MissingLayer,
}

/// Turns tile payloads into placements.
pub trait TileDecoder: Send + Sync {
    /// Decode `data`, reading placements from `source_layer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed.
    fn decode(&self, data: &[u8], source_layer: &str) -> Result<TileContent>;
}

/// Decoder for Mapbox Vector Tile payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct MvtDecoder;

impl TileDecoder for MvtDecoder {
    fn decode(&self, data: &[u8], source_layer: &str) -> Result<TileContent> {
        Ok(match decode_placements(data, source_layer)? {
            Some(placements) => TileContent::Placements(placements),
            None => TileContent::MissingLayer,
        })
    }
}

/// A model to load, with URLs already joined to the root URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub name: String,
    pub url: String,
    pub texture_url: String,
    pub kind: ModelKind,
}

impl ModelRequest {
    /// Request for the model of `placement`, resolving its URLs against
    /// `root_url`.
    ///
    /// An empty relative URL stays empty.
    #[must_use]
    pub fn for_placement(placement: &Placement, root_url: &str) -> Self {
        let join = |relative: &str| {
            if relative.is_empty() {
                String::new()
            } else {
                format!("{root_url}{relative}")
            }
        };
        Self {
            name: placement.model_name.clone(),
            url: join(&placement.model_url),
            texture_url: join(&placement.texture_url),
            kind: placement.model_kind.clone(),
        }
    }

    /// Request for an instance variant at `path` relative to `root_url`.
    /// The format follows the file extension and there is no texture.
    #[must_use]
    pub fn for_variant(path: &str, root_url: &str) -> Self {
        let extension = std::path::Path::new(path)
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or_default();
        Self {
            name: path.to_string(),
            url: format!("{root_url}{path}"),
            texture_url: String::new(),
            kind: ModelKind::from_property(extension),
        }
    }
}

/// Loads model assets and their textures.
pub trait ModelLoader: Send + Sync {
    /// Load and parse the model named by `request`. The asset is returned
    /// prepared for placement (see [`ModelAsset::prepare`]).
    fn load_model(&self, request: &ModelRequest) -> FetchFuture<ModelAsset>;

    /// Load and decode a texture.
    fn load_texture(&self, url: &str) -> FetchFuture<DecodedTexture>;
}

/// Parses model payloads into node hierarchies.
pub trait AssetParser: Send + Sync + 'static {
    /// Parse `data`, declared as `kind`, into an asset.
    ///
    /// Returned assets keep their own materials when [`Self::keeps_materials`]
    /// is true; otherwise they are replaced by the default model material.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid model of `kind`.
    fn parse(&self, kind: &ModelKind, url: &str, data: &[u8]) -> Result<ModelAsset>;

    /// Whether parsed assets carry materials that should be kept.
    fn keeps_materials(&self, kind: &ModelKind) -> bool {
        matches!(kind, ModelKind::Gltf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use tilemodels_proto::{
        Tile,
        tile::{Feature, GeomType, Layer, Value},
    };

    fn string(value: &str) -> Value {
        Value {
            string_value: Some(value.to_string()),
            ..Value::default()
        }
    }

    fn tile_bytes(layer_name: &str) -> Vec<u8> {
        let keys = ["id", "modelname", "modelurl", "modeltype", "texturename", "textureurl"];
        let values = ["b1", "tower", "tower.obj", "Object", "tower", "tower.jpg"];
        let layer = Layer {
            version: 2,
            name: layer_name.to_string(),
            features: vec![Feature {
                id: Some(1),
                tags: vec![0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5],
                r#type: Some(GeomType::Point as i32),
                // MoveTo(1) at (25, 17).
                geometry: vec![9, 50, 34],
            }],
            keys: keys.iter().map(ToString::to_string).collect(),
            values: values.iter().map(|v| string(v)).collect(),
            extent: Some(4096),
        };
        Tile { layers: vec![layer] }.encode_to_vec()
    }

    #[test]
    fn test_mvt_decoder_reads_source_layer() {
        let content = MvtDecoder.decode(&tile_bytes("models"), "models").unwrap();
        let TileContent::Placements(placements) = content else {
            panic!("expected placements");
        };
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].id, "b1");
        assert_eq!(placements[0].model_name, "tower");
        // 4096 extent normalized to 8192.
        assert_eq!((placements[0].x, placements[0].y), (50.0, 34.0));
    }

    #[test]
    fn test_mvt_decoder_reports_missing_layer() {
        let content = MvtDecoder.decode(&tile_bytes("roads"), "models").unwrap();
        assert_eq!(content, TileContent::MissingLayer);
    }

    #[test]
    fn test_mvt_decoder_rejects_garbage() {
        assert!(MvtDecoder.decode(&[0xFF, 0xFF, 0xFF], "models").is_err());
    }

    #[test]
    fn test_model_request_joins_root_url() {
        let placement = Placement {
            id: "b1".to_string(),
            model_name: "tower".to_string(),
            model_url: "models/tower.obj".to_string(),
            model_kind: ModelKind::Object,
            texture_name: "tower".to_string(),
            texture_url: String::new(),
            x: 0.0,
            y: 0.0,
            bearing: 0.0,
            scale: 1.0,
        };
        let request = ModelRequest::for_placement(&placement, "https://cdn.example.com/");
        assert_eq!(request.url, "https://cdn.example.com/models/tower.obj");
        assert_eq!(request.texture_url, "");
        assert_eq!(request.kind, ModelKind::Object);
    }

    #[test]
    fn test_variant_request_kind_follows_extension() {
        let request = ModelRequest::for_variant("trees/oak.glb", "https://cdn.example.com/");
        assert_eq!(request.name, "trees/oak.glb");
        assert_eq!(request.url, "https://cdn.example.com/trees/oak.glb");
        assert_eq!(request.kind, ModelKind::Gltf);
        assert!(request.texture_url.is_empty());
        let request = ModelRequest::for_variant("trees.v2/oak", "");
        assert!(matches!(request.kind, ModelKind::Other(_)));
    }
}
