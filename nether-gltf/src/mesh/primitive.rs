//! Single primitive decoding
//!
//! Produces the vertex streams and index list of one primitive in the target
//! convention: X mirrored, UV V flipped, triangle winding reversed.

use glam::{Vec2, Vec3, Vec4};

use super::types::{BoneWeight, Topology, MAX_SKIN_SETS, MAX_UV_CHANNELS};
use crate::accessor::AccessorTable;
use crate::convert;
use crate::document::Primitive;
use crate::draco::{DracoDecoder, DracoGeometry};
use crate::error::ImportError;
use crate::extensions::DracoMeshCompression;
use crate::source::BufferViewData;

/// Vertex streams and indices of one primitive, indices local to it
#[derive(Debug, Clone, Default)]
pub(crate) struct PrimitiveGeometry {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub tangents: Option<Vec<Vec4>>,
    pub colors: Option<Vec<Vec4>>,
    pub uvs: [Option<Vec<Vec2>>; MAX_UV_CHANNELS],
    pub bone_weights: Option<Vec<BoneWeight>>,
    pub indices: Vec<u32>,
    pub topology: Option<Topology>,
}

/// Read-only inputs shared by every primitive of an import
#[derive(Clone, Copy)]
pub(crate) struct PrimitiveSources<'a> {
    pub accessors: &'a AccessorTable,
    pub views: &'a [Option<BufferViewData>],
    pub draco: Option<&'a dyn DracoDecoder>,
}

/// Raw per-vertex data before skin sets are merged
#[derive(Default)]
struct RawAttributes {
    positions: Option<Vec<Vec3>>,
    normals: Option<Vec<Vec3>>,
    tangents: Option<Vec<Vec4>>,
    colors: Option<Vec<Vec4>>,
    uvs: [Option<Vec<Vec2>>; MAX_UV_CHANNELS],
    joints: [Option<Vec<[u16; 4]>>; MAX_SKIN_SETS],
    weights: [Option<Vec<Vec4>>; MAX_SKIN_SETS],
    indices: Option<Vec<u32>>,
}

fn semantic_set(semantic: &str, prefix: &str, limit: usize) -> Option<usize> {
    let n: usize = semantic.strip_prefix(prefix)?.parse().ok()?;
    (n < limit).then_some(n)
}

impl RawAttributes {
    fn from_accessors(primitive: &Primitive, accessors: &AccessorTable, label: &str) -> Self {
        let mut raw = Self::default();
        for (semantic, &index) in &primitive.attributes {
            let Some(accessor) = accessors.get(index) else {
                tracing::warn!("{} attribute {} references missing accessor", label, semantic);
                continue;
            };
            match semantic.as_str() {
                "POSITION" => raw.positions = Some(accessor.read_vec3()),
                "NORMAL" => raw.normals = Some(accessor.read_vec3()),
                "TANGENT" => raw.tangents = Some(accessor.read_vec4()),
                "COLOR_0" => raw.colors = Some(accessor.read_colors()),
                s => {
                    if let Some(n) = semantic_set(s, "TEXCOORD_", MAX_UV_CHANNELS) {
                        raw.uvs[n] = Some(accessor.read_vec2());
                    } else if let Some(n) = semantic_set(s, "JOINTS_", MAX_SKIN_SETS) {
                        raw.joints[n] = Some(accessor.read_joints());
                    } else if let Some(n) = semantic_set(s, "WEIGHTS_", MAX_SKIN_SETS) {
                        raw.weights[n] = Some(accessor.read_weights());
                    } else {
                        tracing::debug!("{} ignoring attribute {}", label, s);
                    }
                }
            }
        }
        raw.indices = primitive
            .indices
            .and_then(|index| accessors.get(index))
            .map(|accessor| accessor.read_indices());
        raw
    }

    fn from_draco(geometry: DracoGeometry, label: &str) -> Self {
        let mut raw = Self::default();
        for (semantic, stream) in geometry.attributes {
            let c = stream.components;
            if c == 0 {
                tracing::warn!("{} draco attribute {} has no components", label, semantic);
                continue;
            }
            let values = stream.values;
            let vec3 = || -> Vec<Vec3> {
                values
                    .chunks_exact(c)
                    .map(|v| {
                        Vec3::new(
                            v[0],
                            v.get(1).copied().unwrap_or(0.0),
                            v.get(2).copied().unwrap_or(0.0),
                        )
                    })
                    .collect()
            };
            let vec4 = |fill: f32| -> Vec<Vec4> {
                values
                    .chunks_exact(c)
                    .map(|v| {
                        Vec4::new(
                            v[0],
                            v.get(1).copied().unwrap_or(0.0),
                            v.get(2).copied().unwrap_or(0.0),
                            v.get(3).copied().unwrap_or(fill),
                        )
                    })
                    .collect()
            };
            match semantic.as_str() {
                "POSITION" => raw.positions = Some(vec3()),
                "NORMAL" => raw.normals = Some(vec3()),
                "TANGENT" => raw.tangents = Some(vec4(1.0)),
                "COLOR_0" => raw.colors = Some(vec4(1.0)),
                s => {
                    if let Some(n) = semantic_set(s, "TEXCOORD_", MAX_UV_CHANNELS) {
                        raw.uvs[n] = Some(
                            values
                                .chunks_exact(c)
                                .map(|v| Vec2::new(v[0], v.get(1).copied().unwrap_or(0.0)))
                                .collect(),
                        );
                    } else if let Some(n) = semantic_set(s, "JOINTS_", MAX_SKIN_SETS) {
                        raw.joints[n] = Some(
                            vec4(0.0)
                                .into_iter()
                                .map(|j| j.to_array().map(|x| x.max(0.0) as u16))
                                .collect(),
                        );
                    } else if let Some(n) = semantic_set(s, "WEIGHTS_", MAX_SKIN_SETS) {
                        raw.weights[n] = Some(vec4(0.0));
                    } else {
                        tracing::debug!("{} ignoring draco attribute {}", label, s);
                    }
                }
            }
        }
        raw.indices = Some(geometry.indices);
        raw
    }
}

/// Merge up to four JOINTS/WEIGHTS sets, keeping the four strongest
/// influences per vertex and renormalising them.
fn merge_skin_sets(
    joints: &[Option<Vec<[u16; 4]>>; MAX_SKIN_SETS],
    weights: &[Option<Vec<Vec4>>; MAX_SKIN_SETS],
    vertex_count: usize,
    label: &str,
) -> Option<Vec<BoneWeight>> {
    let sets: Vec<(&Vec<[u16; 4]>, &Vec<Vec4>)> = joints
        .iter()
        .zip(weights.iter())
        .enumerate()
        .filter_map(|(set, pair)| match pair {
            (Some(j), Some(w)) => Some((j, w)),
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "{} has partial skinning data in set {} (joints or weights missing), ignoring it",
                    label,
                    set
                );
                None
            }
            (None, None) => None,
        })
        .collect();
    if sets.is_empty() {
        return None;
    }

    let mut out = Vec::with_capacity(vertex_count);
    let mut influences: Vec<(u16, f32)> = Vec::with_capacity(MAX_SKIN_SETS * 4);
    for v in 0..vertex_count {
        influences.clear();
        for (j, w) in &sets {
            let (Some(js), Some(ws)) = (j.get(v), w.get(v)) else {
                continue;
            };
            for k in 0..4 {
                if ws[k] > 0.0 {
                    influences.push((js[k], ws[k]));
                }
            }
        }
        influences.sort_by(|a, b| b.1.total_cmp(&a.1));
        influences.truncate(4);

        let total: f32 = influences.iter().map(|(_, w)| w).sum();
        let mut bone = BoneWeight::default();
        for (slot, &(joint, weight)) in influences.iter().enumerate() {
            bone.joints[slot] = joint;
            bone.weights[slot] = if total > 0.0 { weight / total } else { 0.0 };
        }
        out.push(bone);
    }
    Some(out)
}

/// Fit a stream to `count` elements, warning on mismatch
fn fit<T: Clone>(stream: Option<Vec<T>>, count: usize, fill: T, what: &str, label: &str) -> Option<Vec<T>> {
    let mut stream = stream?;
    if stream.len() != count {
        tracing::warn!(
            "{} {} has {} elements, expected {}",
            label,
            what,
            stream.len(),
            count
        );
        stream.resize(count, fill);
    }
    Some(stream)
}

/// Map a glTF mode to a topology and convert the index list to it.
/// Returns `None` for unknown modes.
fn convert_topology(mode: u32, indices: Vec<u32>, label: &str) -> Option<(Topology, Vec<u32>)> {
    match mode {
        0 => Some((Topology::Points, indices)),
        1 => {
            let mut indices = indices;
            if indices.len() % 2 != 0 {
                tracing::warn!("{} line list has a dangling index, dropping it", label);
                indices.pop();
            }
            Some((Topology::Lines, indices))
        }
        // LINE_LOOP: close the strip
        2 => {
            let mut indices = indices;
            if let Some(&first) = indices.first() {
                indices.push(first);
            }
            Some((Topology::LineStrip, indices))
        }
        3 => Some((Topology::LineStrip, indices)),
        4 => {
            let mut indices = indices;
            if indices.len() % 3 != 0 {
                tracing::warn!(
                    "{} triangle list has {} indices, truncating to a multiple of 3",
                    label,
                    indices.len()
                );
                indices.truncate(indices.len() / 3 * 3);
            }
            Some((Topology::Triangles, indices))
        }
        // TRIANGLE_STRIP
        5 => {
            let list = (0..indices.len().saturating_sub(2))
                .flat_map(|i| {
                    if i % 2 == 0 {
                        [indices[i], indices[i + 1], indices[i + 2]]
                    } else {
                        [indices[i + 1], indices[i], indices[i + 2]]
                    }
                })
                .collect();
            Some((Topology::Triangles, list))
        }
        // TRIANGLE_FAN
        6 => {
            let list = (1..indices.len().saturating_sub(1))
                .flat_map(|i| [indices[i], indices[i + 1], indices[0]])
                .collect();
            Some((Topology::Triangles, list))
        }
        _ => None,
    }
}

impl PrimitiveGeometry {
    /// Decode one primitive. Returns `None` when the primitive is skipped.
    pub(crate) fn decode(
        primitive: &Primitive,
        sources: PrimitiveSources<'_>,
        label: &str,
    ) -> Option<Self> {
        let mode = primitive.mode.unwrap_or(4);
        if !(0..=6).contains(&mode) {
            tracing::warn!("{} has unsupported mode {}, skipping", label, mode);
            return None;
        }

        let raw = match primitive.extensions.get::<DracoMeshCompression>() {
            Some(draco) => match decode_draco(draco, sources, label) {
                Ok(geometry) => RawAttributes::from_draco(geometry, label),
                Err(e) => {
                    tracing::warn!("{} draco decode failed, skipping: {}", label, e);
                    return None;
                }
            },
            None => RawAttributes::from_accessors(primitive, sources.accessors, label),
        };

        let Some(positions) = raw.positions else {
            tracing::warn!("{} has no POSITION attribute, skipping", label);
            return None;
        };
        let count = positions.len();

        let bone_weights = merge_skin_sets(&raw.joints, &raw.weights, count, label);

        let mut indices = raw.indices.unwrap_or_else(|| (0..count as u32).collect());
        let mut clamped = 0usize;
        for index in &mut indices {
            if *index as usize >= count {
                *index = 0;
                clamped += 1;
            }
        }
        if clamped > 0 {
            tracing::warn!(
                "{}: {} indices out of range (vertex count {}), clamped to 0",
                label,
                clamped,
                count
            );
        }

        let (topology, mut indices) = convert_topology(mode, indices, label)?;

        // Handedness: mirror X, flip V, and reverse triangle winding so the
        // front face survives the mirror.
        if topology == Topology::Triangles {
            for tri in indices.chunks_exact_mut(3) {
                tri.swap(0, 2);
            }
        }

        let uvs = raw.uvs.map(|uv| {
            fit(uv, count, Vec2::ZERO, "TEXCOORD", label)
                .map(|uv| uv.into_iter().map(convert::uv).collect())
        });

        Some(Self {
            positions: positions.into_iter().map(convert::vector).collect(),
            normals: fit(raw.normals, count, Vec3::ZERO, "NORMAL", label)
                .map(|n| n.into_iter().map(convert::vector).collect()),
            tangents: fit(raw.tangents, count, Vec4::ZERO, "TANGENT", label)
                .map(|t| t.into_iter().map(convert::tangent).collect()),
            colors: fit(raw.colors, count, Vec4::ONE, "COLOR_0", label),
            uvs,
            bone_weights,
            indices,
            topology: Some(topology),
        })
    }

    pub(crate) fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

fn decode_draco(
    draco: &DracoMeshCompression,
    sources: PrimitiveSources<'_>,
    label: &str,
) -> crate::error::Result<DracoGeometry> {
    let decoder = sources
        .draco
        .ok_or_else(|| ImportError::Draco("no draco decoder configured".into()))?;
    let view = sources
        .views
        .get(draco.buffer_view)
        .cloned()
        .flatten()
        .ok_or_else(|| {
            ImportError::Draco(format!("buffer view {} unavailable", draco.buffer_view))
        })?;

    // The decoded geometry is owned by this stage from here on; native
    // allocations were released inside the decoder.
    let geometry = decoder.decode(view.bytes(), draco)?;
    tracing::debug!(
        "{} draco: {} vertices, {} indices",
        label,
        geometry.vertex_count,
        geometry.indices.len()
    );
    Ok(geometry)
}
