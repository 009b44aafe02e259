//! Feature property resolution.
//!
//! Feature tags are pairs of indices into the layer's shared key and value
//! tables.

use std::collections::HashMap;

use tilemodels_proto::tile::{Feature, Layer, Value};

use crate::error::{DecodeError, DecodeResult};

/// A resolved property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Float(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

impl PropertyValue {
    fn from_proto(value: &Value) -> Option<Self> {
        if let Some(s) = &value.string_value {
            return Some(Self::String(s.clone()));
        }
        if let Some(f) = value.float_value {
            return Some(Self::Float(f64::from(f)));
        }
        if let Some(d) = value.double_value {
            return Some(Self::Float(d));
        }
        if let Some(i) = value.int_value.or(value.sint_value) {
            return Some(Self::Int(i));
        }
        if let Some(u) = value.uint_value {
            return Some(Self::UInt(u));
        }
        value.bool_value.map(Self::Bool)
    }

    /// Numeric view of the value. Strings are parsed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::String(s) => s.trim().parse().ok(),
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::UInt(u) => Some(*u as f64),
            Self::Bool(_) => None,
        }
    }

    /// Text view of the value. Numbers are formatted.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Float(f) => f.to_string(),
            Self::Int(i) => i.to_string(),
            Self::UInt(u) => u.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// Resolve a feature's tags against its layer's key and value tables.
///
/// # Errors
///
/// Returns an error if the tag list has odd length or references a key or
/// value outside the layer's tables.
pub fn feature_properties(
    layer: &Layer,
    feature: &Feature,
) -> DecodeResult<HashMap<String, PropertyValue>> {
    if feature.tags.len() % 2 != 0 {
        return Err(DecodeError::InvalidFormat {
            context: "feature tags",
            detail: format!("odd tag count {}", feature.tags.len()),
        });
    }

    let mut properties = HashMap::with_capacity(feature.tags.len() / 2);
    for pair in feature.tags.chunks_exact(2) {
        let key_index = pair[0] as usize;
        let value_index = pair[1] as usize;

        let key = layer
            .keys
            .get(key_index)
            .ok_or(DecodeError::IndexOutOfBounds {
                index: key_index,
                len: layer.keys.len(),
            })?;
        let value = layer
            .values
            .get(value_index)
            .ok_or(DecodeError::IndexOutOfBounds {
                index: value_index,
                len: layer.values.len(),
            })?;

        if let Some(value) = PropertyValue::from_proto(value) {
            properties.insert(key.clone(), value);
        }
    }

    Ok(properties)
}
