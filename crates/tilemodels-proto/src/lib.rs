//! Generated protobuf types for the Mapbox Vector Tile format.
//!
//! This crate provides Rust types generated from the `vector_tile.proto`
//! schema (version 2 of the vector tile format). Model placement tiles are
//! ordinary vector tiles whose point features carry model properties.
//!
//! # Key types
//!
//! - [`Tile`]: A tile containing any number of named layers
//! - [`tile::Layer`]: A named layer with features and shared key/value tables
//! - [`tile::Feature`]: A geometry command stream plus tag indices
//! - [`tile::Value`]: A variant property value
//!
//! # Regenerating types
//!
//! To regenerate the protobuf types after modifying `proto/vector_tile.proto`:
//!
//! ```sh
//! cargo run -p tilemodels-proto --bin generate
//! ```
//!
//! This requires `protoc` to be installed.

mod generated;

pub use generated::*;
