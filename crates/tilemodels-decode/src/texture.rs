//! Texture decoding for model materials.
//!
//! Model textures are served as ordinary PNG or JPEG images. Both formats
//! decode to RGBA pixel data suitable for GPU upload.

use image::ImageFormat;

use crate::error::{DecodeError, DecodeResult};

/// Texture format indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Png,
    Jpeg,
}

impl TextureFormat {
    fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Decoded texture data.
#[derive(Debug, Clone)]
pub struct DecodedTexture {
    /// RGBA pixel data (4 bytes per pixel).
    pub data: Vec<u8>,
    /// Texture width in pixels.
    pub width: u32,
    /// Texture height in pixels.
    pub height: u32,
}

impl DecodedTexture {
    /// Create a new decoded texture.
    #[must_use]
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Check if the texture data size is valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

/// Detect texture format from data signature.
#[must_use]
pub fn detect_format(data: &[u8]) -> Option<TextureFormat> {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some(TextureFormat::Png)
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(TextureFormat::Jpeg)
    } else {
        None
    }
}

/// Decode a texture to RGBA, detecting its format from the signature.
///
/// # Errors
///
/// Returns an error if the format is not recognized or decoding fails.
pub fn decode_texture(data: &[u8]) -> DecodeResult<DecodedTexture> {
    let format = detect_format(data).ok_or_else(|| DecodeError::InvalidFormat {
        context: "texture",
        detail: "unrecognized image signature".to_string(),
    })?;

    let image = image::load_from_memory_with_format(data, format.image_format())?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedTexture::new(rgba.into_raw(), width, height))
}
