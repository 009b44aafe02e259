//! Error types for the tilemodels crate.

use std::fmt;

/// Result type for tilemodels operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching, decoding or preparing tile content.
#[derive(Debug)]
pub enum Error {
    /// HTTP request failed.
    Http {
        /// The URL that failed.
        url: String,
        /// The error message.
        message: String,
    },
    /// HTTP response had a non-success status code.
    HttpStatus {
        /// The URL that returned the error.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
    /// Tile payload decoding failed.
    Decode(tilemodels_decode::DecodeError),
    /// The tile has no layer with the configured source layer name.
    UnsupportedLayer {
        /// The missing layer name.
        layer: String,
    },
    /// A model texture failed to download or decode.
    Texture {
        /// The texture URL.
        url: String,
        /// The error message.
        message: String,
    },
    /// A model payload could not be parsed.
    Asset {
        /// The model URL.
        url: String,
        /// The error message.
        message: String,
    },
    /// No async runtime is available to run fetch jobs.
    Runtime {
        /// The error message.
        message: String,
    },
    /// A runtime edit referenced something that is not loaded yet.
    NotReady {
        /// What kind of thing was missing.
        what: &'static str,
        /// Its name or key.
        name: String,
    },
    /// Invalid data supplied by a collaborator.
    InvalidData {
        /// Context for where the error occurred.
        context: &'static str,
        /// Description of what was invalid.
        detail: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http { url, message } => {
                write!(f, "http request to {url} failed: {message}")
            }
            Error::HttpStatus { url, status } => {
                write!(f, "http request to {url} returned status {status}")
            }
            Error::Decode(e) => write!(f, "decode error: {e}"),
            Error::UnsupportedLayer { layer } => {
                write!(f, "tile has no source layer named {layer:?}")
            }
            Error::Texture { url, message } => {
                write!(f, "texture {url} failed: {message}")
            }
            Error::Asset { url, message } => {
                write!(f, "model {url} failed to parse: {message}")
            }
            Error::Runtime { message } => write!(f, "no async runtime: {message}"),
            Error::NotReady { what, name } => write!(f, "{what} {name} is not loaded"),
            Error::InvalidData { context, detail } => {
                write!(f, "invalid {context}: {detail}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<tilemodels_decode::DecodeError> for Error {
    fn from(e: tilemodels_decode::DecodeError) -> Self {
        Error::Decode(e)
    }
}
