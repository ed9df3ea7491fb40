//! Image decoding
//!
//! Image bytes come from a buffer view (GLB) or a URI (data URI or file next
//! to the asset). Decoding is delegated to an [`ImageCodec`]; the default
//! codec uses the `image` crate and produces RGBA8 pixels.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;

use crate::document::Image;
use crate::error::{ImportError, Result};
use crate::source::{BufferViewData, ByteSource};

/// Decoded RGBA8 pixels
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8, `width * height * 4` bytes
    pub pixels: Vec<u8>,
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Image codec boundary: compressed bytes in, pixels out
pub trait ImageCodec: Send + Sync + fmt::Debug {
    fn decode(&self, bytes: &[u8], mime_hint: Option<&str>) -> Result<DecodedImage>;
}

/// PNG/JPEG decoding through the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultImageCodec;

impl ImageCodec for DefaultImageCodec {
    fn decode(&self, bytes: &[u8], mime_hint: Option<&str>) -> Result<DecodedImage> {
        let format = match mime_hint {
            Some("image/png") => Some(image::ImageFormat::Png),
            Some("image/jpeg") | Some("image/jpg") => Some(image::ImageFormat::Jpeg),
            _ => None,
        };
        let img = match format {
            Some(format) => image::load_from_memory_with_format(bytes, format),
            None => image::load_from_memory(bytes),
        }
        .map_err(|e| ImportError::ImageDecode(e.to_string()))?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(DecodedImage {
            name: None,
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

fn mime_from_extension(uri: &str) -> Option<&'static str> {
    let lower = uri.to_ascii_lowercase();
    if lower.ends_with(".png") {
        Some("image/png")
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        Some("image/jpeg")
    } else {
        None
    }
}

/// Fetch and decode one image
pub fn decode_image(
    index: usize,
    image: &Image,
    views: &[Option<BufferViewData>],
    source: &ByteSource,
    codec: &dyn ImageCodec,
) -> Result<DecodedImage> {
    let (bytes, mime): (Vec<u8>, Option<String>) = match (&image.buffer_view, &image.uri) {
        (Some(view), _) => {
            let data = views
                .get(*view)
                .cloned()
                .flatten()
                .ok_or_else(|| {
                    ImportError::UnresolvableUri(format!(
                        "image {} buffer view {}",
                        index, view
                    ))
                })?;
            (data.bytes().to_vec(), image.mime_type.clone())
        }
        (None, Some(uri)) => {
            let loaded = source.load_uri(uri)?;
            let mime = image
                .mime_type
                .clone()
                .or(loaded.mime_type)
                .or_else(|| mime_from_extension(uri).map(str::to_string));
            (loaded.data, mime)
        }
        (None, None) => {
            return Err(ImportError::UnresolvableUri(format!(
                "image {} has neither uri nor bufferView",
                index
            )));
        }
    };

    let mut decoded = codec.decode(&bytes, mime.as_deref())?;
    decoded.name = image.name.clone();
    Ok(decoded)
}

/// Decode every image in parallel. Failures are logged and leave `None`.
pub fn decode_images(
    images: &[Image],
    views: &[Option<BufferViewData>],
    source: &ByteSource,
    codec: &dyn ImageCodec,
) -> Vec<Option<Arc<DecodedImage>>> {
    images
        .par_iter()
        .enumerate()
        .map(|(index, image)| match decode_image(index, image, views, source, codec) {
            Ok(decoded) => {
                tracing::debug!(
                    "Decoded image {} ({}x{})",
                    index,
                    decoded.width,
                    decoded.height
                );
                Some(Arc::new(decoded))
            }
            Err(e) => {
                tracing::warn!("Image {} could not be decoded: {}", index, e);
                None
            }
        })
        .collect()
}
