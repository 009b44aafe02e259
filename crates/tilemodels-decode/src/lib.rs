//! Decode model placements and textures from vector tile payloads.
//!
//! This crate provides pure synchronous decoding functions for turning the
//! raw bytes of a placement tile into [`Placement`] records, and the raw
//! bytes of a model texture into RGBA pixels. All functions are designed to
//! be called from any threading context; the caller controls parallelism.
//!
//! # Design principles
//!
//! - **Synchronous**: No async, no threading primitives
//! - **User-controlled parallelism**: Client decides how to parallelize
//! - **Normalized output**: Local coordinates always use an 8192 extent

mod error;
pub mod geometry;
mod placement;
mod properties;
pub mod texture;

pub use error::{DecodeError, DecodeResult};
pub use geometry::{GeometryCommand, decode_geometry, first_point};
pub use placement::{EXTENT, ModelKind, Placement, decode_placements, placement_from_feature};
pub use properties::{PropertyValue, feature_properties};
pub use texture::{DecodedTexture, TextureFormat, decode_texture};
