//! GLB binary container
//!
//! Layout: 12-byte header (`magic`, `version`, `length`), then chunks of
//! `chunkLength: u32`, `chunkType: u32`, payload. The first chunk must be
//! JSON; the first BIN chunk backs the buffer without a `uri`.

use crate::error::{ImportError, Result};

/// "glTF" as read little-endian
pub const GLB_MAGIC: [u8; 4] = *b"glTF";
/// Only container version 2 is supported
pub const GLB_VERSION: u32 = 2;
/// Header size in bytes
pub const GLB_HEADER_LEN: usize = 12;
/// Chunk type "JSON"
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
/// Chunk type "BIN\0"
pub const CHUNK_BIN: u32 = 0x004E_4942;

/// Parsed GLB container borrowing the input bytes
#[derive(Debug, Clone, Copy)]
pub struct Glb<'a> {
    /// Header `length` field (informational)
    pub declared_length: u32,
    pub json: &'a [u8],
    pub bin: Option<&'a [u8]>,
}

/// Whether the bytes start with the GLB magic
pub fn is_glb(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..4] == GLB_MAGIC
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Parse the GLB header and chunk table
pub fn parse_glb(data: &[u8]) -> Result<Glb<'_>> {
    if data.len() < GLB_HEADER_LEN {
        return Err(ImportError::TooSmall(data.len()));
    }

    let magic = [data[0], data[1], data[2], data[3]];
    if magic != GLB_MAGIC {
        return Err(ImportError::InvalidMagic(magic));
    }

    let version = read_u32(data, 4);
    if version != GLB_VERSION {
        return Err(ImportError::UnsupportedVersion(version));
    }

    let declared_length = read_u32(data, 8);
    if declared_length as usize != data.len() {
        tracing::warn!(
            "GLB header declares {} bytes but {} were supplied",
            declared_length,
            data.len()
        );
    }

    let mut offset = GLB_HEADER_LEN;
    let mut json: Option<&[u8]> = None;
    let mut bin: Option<&[u8]> = None;
    let mut chunk_index = 0usize;

    while offset + 8 <= data.len() {
        let chunk_length = read_u32(data, offset) as usize;
        let chunk_type = read_u32(data, offset + 4);
        offset += 8;

        let end = offset
            .checked_add(chunk_length)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                ImportError::MalformedContainer(format!(
                    "chunk {} ({} bytes) extends past the end of the file",
                    chunk_index, chunk_length
                ))
            })?;
        let payload = &data[offset..end];

        match chunk_type {
            CHUNK_JSON if chunk_index == 0 => json = Some(payload),
            CHUNK_JSON => {
                return Err(ImportError::MalformedContainer(
                    "JSON chunk is not the first chunk".into(),
                ));
            }
            CHUNK_BIN if bin.is_none() => bin = Some(payload),
            CHUNK_BIN => tracing::debug!("Ignoring extra BIN chunk {}", chunk_index),
            other => tracing::debug!("Ignoring unknown GLB chunk type 0x{:08X}", other),
        }

        if chunk_index == 0 && json.is_none() {
            return Err(ImportError::MalformedContainer(
                "first chunk is not JSON".into(),
            ));
        }

        offset = end;
        chunk_index += 1;
    }

    let json = json
        .ok_or_else(|| ImportError::MalformedContainer("missing JSON chunk".into()))?;

    Ok(Glb {
        declared_length,
        json,
        bin,
    })
}

/// Assemble a GLB container from JSON text and an optional binary payload.
///
/// JSON is padded with spaces and BIN with zeros to 4-byte alignment.
pub fn write_glb(json: &[u8], bin: Option<&[u8]>) -> Vec<u8> {
    let json_padding = (4 - json.len() % 4) % 4;
    let json_chunk_length = json.len() + json_padding;
    let bin_padding = bin.map(|b| (4 - b.len() % 4) % 4).unwrap_or(0);
    let bin_chunk_length = bin.map(|b| b.len() + bin_padding).unwrap_or(0);

    let mut total_length = GLB_HEADER_LEN + 8 + json_chunk_length;
    if bin.is_some() {
        total_length += 8 + bin_chunk_length;
    }

    let mut glb = Vec::with_capacity(total_length);
    glb.extend_from_slice(&GLB_MAGIC);
    glb.extend_from_slice(&GLB_VERSION.to_le_bytes());
    glb.extend_from_slice(&(total_length as u32).to_le_bytes());

    glb.extend_from_slice(&(json_chunk_length as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    glb.extend_from_slice(json);
    glb.extend(std::iter::repeat_n(b' ', json_padding));

    if let Some(bin) = bin {
        glb.extend_from_slice(&(bin_chunk_length as u32).to_le_bytes());
        glb.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        glb.extend_from_slice(bin);
        glb.extend(std::iter::repeat_n(0u8, bin_padding));
    }

    glb
}
