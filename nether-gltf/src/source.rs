//! Buffer and buffer view resolution
//!
//! A buffer's bytes come from one of three places: a `data:` URI embedded in
//! the JSON, a file next to the asset, or the BIN chunk of a GLB container.
//! Resolution happens once per buffer; the bytes are shared immutably
//! (`Arc<[u8]>`) by every view that slices them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;

use crate::document::{Buffer, BufferView};
use crate::error::{ImportError, Result};

/// A decoded `data:` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    /// Media type, e.g. `application/octet-stream` or `image/png`
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

/// Decode a `data:[<mediatype>][;base64],<data>` URI
pub fn decode_data_uri(uri: &str) -> Result<DataUri> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| ImportError::InvalidDataUri("missing data: prefix".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImportError::InvalidDataUri("missing ',' separator".into()))?;

    let (media, is_base64) = match header.strip_suffix(";base64") {
        Some(media) => (media, true),
        None => (header, false),
    };
    // Drop parameters such as ";charset=utf-8"
    let media = media.split(';').next().unwrap_or_default();
    let mime_type = (!media.is_empty()).then(|| media.to_string());

    let data = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| ImportError::InvalidDataUri(e.to_string()))?
    } else {
        percent_decode(payload)
    };

    Ok(DataUri { mime_type, data })
}

/// Decode `%XX` escapes. Invalid escapes are kept literally.
pub fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(value) = hex {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Where external references are looked up
#[derive(Debug, Clone, Default)]
pub struct ByteSource {
    /// Directory of the source document; `None` for in-memory imports
    base_dir: Option<PathBuf>,
    /// BIN chunk of a GLB container
    glb_bin: Option<Arc<[u8]>>,
}

impl ByteSource {
    pub fn new(base_dir: Option<PathBuf>, glb_bin: Option<Arc<[u8]>>) -> Self {
        Self { base_dir, glb_bin }
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Resolve a URI to bytes.
    ///
    /// Returns the decoded data and, for data URIs, the embedded media type.
    pub fn load_uri(&self, uri: &str) -> Result<DataUri> {
        if uri.starts_with("data:") {
            return decode_data_uri(uri);
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Err(ImportError::UnresolvableUri(uri.to_string()));
        }

        let base_dir = self
            .base_dir
            .as_ref()
            .ok_or_else(|| ImportError::UnresolvableUri(uri.to_string()))?;
        let relative = String::from_utf8_lossy(&percent_decode(uri)).into_owned();
        let relative = relative.strip_prefix("file://").unwrap_or(relative.as_str());
        let path = base_dir.join(relative);
        let data = std::fs::read(&path).map_err(|e| ImportError::io(&path, e))?;

        Ok(DataUri {
            mime_type: None,
            data,
        })
    }

    /// Resolve the bytes of one buffer
    pub fn load_buffer(&self, index: usize, buffer: &Buffer) -> Result<Arc<[u8]>> {
        let bytes: Arc<[u8]> = match &buffer.uri {
            Some(uri) => self.load_uri(uri)?.data.into(),
            None if index == 0 => self
                .glb_bin
                .clone()
                .ok_or_else(|| ImportError::UnresolvableUri("<GLB BIN chunk>".into()))?,
            None => {
                return Err(ImportError::UnresolvableUri(format!(
                    "buffer {} has no uri",
                    index
                )));
            }
        };

        if bytes.len() < buffer.byte_length {
            tracing::warn!(
                "Buffer {} is {} bytes but declares byteLength {}",
                index,
                bytes.len(),
                buffer.byte_length
            );
        }
        Ok(bytes)
    }

    /// Resolve every buffer. Failures are logged and leave a `None` slot.
    pub fn resolve_buffers(&self, buffers: &[Buffer]) -> Vec<Option<Arc<[u8]>>> {
        buffers
            .iter()
            .enumerate()
            .map(|(index, buffer)| match self.load_buffer(index, buffer) {
                Ok(bytes) => {
                    tracing::debug!("Resolved buffer {} ({} bytes)", index, bytes.len());
                    Some(bytes)
                }
                Err(e) => {
                    tracing::warn!("Buffer {} unavailable: {}", index, e);
                    None
                }
            })
            .collect()
    }
}

/// A resolved byte window into a buffer
#[derive(Debug, Clone)]
pub struct BufferViewData {
    bytes: Arc<[u8]>,
    start: usize,
    len: usize,
    /// Declared `byteStride`, if any
    pub stride: Option<usize>,
}

impl BufferViewData {
    /// Wrap a standalone byte blob as a view covering all of it
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len();
        Self {
            bytes,
            start: 0,
            len,
            stride: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[self.start..self.start + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Slice one view out of its buffer
pub fn slice_buffer_view(
    index: usize,
    view: &BufferView,
    buffers: &[Option<Arc<[u8]>>],
) -> Option<BufferViewData> {
    let Some(Some(bytes)) = buffers.get(view.buffer) else {
        tracing::warn!(
            "Buffer view {} references unavailable buffer {}",
            index,
            view.buffer
        );
        return None;
    };

    let end = view.byte_offset.checked_add(view.byte_length);
    match end {
        Some(end) if end <= bytes.len() => {}
        _ => {
            tracing::warn!(
                "Buffer view {} range {}+{} exceeds buffer {} ({} bytes)",
                index,
                view.byte_offset,
                view.byte_length,
                view.buffer,
                bytes.len()
            );
            return None;
        }
    }

    Some(BufferViewData {
        bytes: Arc::clone(bytes),
        start: view.byte_offset,
        len: view.byte_length,
        stride: view.byte_stride,
    })
}

/// Slice every buffer view. Unresolvable views leave a `None` slot.
pub fn slice_buffer_views(
    views: &[BufferView],
    buffers: &[Option<Arc<[u8]>>],
) -> Vec<Option<BufferViewData>> {
    views
        .iter()
        .enumerate()
        .map(|(index, view)| slice_buffer_view(index, view, buffers))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_data_uri() {
        let uri = "data:application/octet-stream;base64,AAECAw==";
        let decoded = decode_data_uri(uri).unwrap();
        assert_eq!(decoded.data, vec![0, 1, 2, 3]);
        assert_eq!(
            decoded.mime_type.as_deref(),
            Some("application/octet-stream")
        );
    }

    #[test]
    fn test_plain_data_uri_is_percent_decoded() {
        let decoded = decode_data_uri("data:,a%20b%2Cc").unwrap();
        assert_eq!(decoded.data, b"a b,c");
        assert_eq!(decoded.mime_type, None);
    }

    #[test]
    fn test_invalid_data_uri() {
        assert!(matches!(
            decode_data_uri("data:application/octet-stream;base64"),
            Err(ImportError::InvalidDataUri(_))
        ));
        assert!(matches!(
            decode_data_uri("data:;base64,@@@"),
            Err(ImportError::InvalidDataUri(_))
        ));
    }

    #[test]
    fn test_percent_decode_keeps_bad_escapes() {
        assert_eq!(percent_decode("my%20file.bin"), b"my file.bin");
        assert_eq!(percent_decode("100%"), b"100%");
        assert_eq!(percent_decode("%zz"), b"%zz");
    }

    #[test]
    fn test_external_buffer_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("my data.bin"), [9u8, 8, 7]).unwrap();

        let source = ByteSource::new(Some(dir.path().to_path_buf()), None);
        let buffer = Buffer {
            uri: Some("my%20data.bin".into()),
            byte_length: 3,
            ..Default::default()
        };
        assert_eq!(&*source.load_buffer(0, &buffer).unwrap(), &[9, 8, 7]);

        let missing = Buffer {
            uri: Some("missing.bin".into()),
            ..Default::default()
        };
        assert!(matches!(
            source.load_buffer(1, &missing),
            Err(ImportError::Io { .. })
        ));
    }

    #[test]
    fn test_glb_chunk_backs_first_buffer_only() {
        let bin: Arc<[u8]> = Arc::from(vec![1u8, 2, 3, 4]);
        let source = ByteSource::new(None, Some(bin));
        let buffers = vec![Buffer::default(), Buffer::default()];
        let resolved = source.resolve_buffers(&buffers);
        assert_eq!(resolved[0].as_deref(), Some(&[1u8, 2, 3, 4][..]));
        assert!(resolved[1].is_none());
    }

    #[test]
    fn test_network_uri_is_skipped() {
        let source = ByteSource::new(Some(PathBuf::from(".")), None);
        assert!(matches!(
            source.load_uri("https://example.com/a.bin"),
            Err(ImportError::UnresolvableUri(_))
        ));
    }

    #[test]
    fn test_slice_buffer_views() {
        let buffers = vec![Some(Arc::<[u8]>::from(vec![0u8, 1, 2, 3, 4, 5, 6, 7]))];
        let views = vec![
            BufferView {
                buffer: 0,
                byte_offset: 2,
                byte_length: 4,
                byte_stride: Some(4),
                target: None,
            },
            BufferView {
                buffer: 0,
                byte_offset: 6,
                byte_length: 4,
                ..Default::default()
            },
            BufferView {
                buffer: 3,
                byte_length: 1,
                ..Default::default()
            },
        ];

        let sliced = slice_buffer_views(&views, &buffers);
        let first = sliced[0].as_ref().unwrap();
        assert_eq!(first.bytes(), &[2, 3, 4, 5]);
        assert_eq!(first.stride, Some(4));
        assert!(sliced[1].is_none());
        assert!(sliced[2].is_none());
    }
}
