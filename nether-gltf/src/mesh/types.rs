//! Types and constants for mesh assembly

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};

use crate::material::Material;

/// Number of UV channels carried per vertex
pub const MAX_UV_CHANNELS: usize = 8;

/// JOINTS_n / WEIGHTS_n sets that are read
pub const MAX_SKIN_SETS: usize = 4;

/// Meshes with more vertices than this need 32-bit indices
pub const MAX_NARROW_INDEX: usize = u16::MAX as usize;

/// Submesh primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    Triangles,
}

/// Index buffer width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    #[default]
    U16,
    U32,
}

impl IndexFormat {
    pub fn for_vertex_count(count: usize) -> Self {
        if count > MAX_NARROW_INDEX {
            Self::U32
        } else {
            Self::U16
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Bounds of a point set, `None` when empty
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        Some(rest.iter().fold(
            Self {
                min: *first,
                max: *first,
            },
            |b, &p| Self {
                min: b.min.min(p),
                max: b.max.max(p),
            },
        ))
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// Four strongest skin influences of a vertex
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoneWeight {
    pub joints: [u16; 4],
    /// Sums to 1 unless the vertex has no influences
    pub weights: [f32; 4],
}

/// One primitive's range inside the merged buffers
#[derive(Debug, Clone, PartialEq)]
pub struct SubMesh {
    pub index_start: usize,
    pub index_count: usize,
    pub topology: Topology,
    /// First vertex of this primitive in the merged vertex arrays
    pub first_vertex: usize,
    pub vertex_count: usize,
    /// Document material index; `None` uses the fallback material
    pub material: Option<usize>,
    /// Present when per-submesh bounds were requested
    pub bounds: Option<Bounds>,
    /// Data contributed by primitive extensions
    pub custom: BTreeMap<String, serde_json::Value>,
}

/// Morph target reconstructed over the merged vertex range
#[derive(Debug, Clone, PartialEq)]
pub struct BlendShape {
    pub name: String,
    pub default_weight: f32,
    pub position_deltas: Vec<Vec3>,
    pub normal_deltas: Option<Vec<Vec3>>,
    pub tangent_deltas: Option<Vec<Vec3>>,
}

/// A mesh with all primitives merged into one set of vertex streams
#[derive(Debug, Clone, Default)]
pub struct MeshBuffers {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub tangents: Option<Vec<Vec4>>,
    pub colors: Option<Vec<Vec4>>,
    pub uvs: [Option<Vec<Vec2>>; MAX_UV_CHANNELS],
    pub bone_weights: Option<Vec<BoneWeight>>,
    pub indices: Vec<u32>,
    pub index_format: IndexFormat,
    pub submeshes: Vec<SubMesh>,
    pub bounds: Bounds,
    pub blend_shapes: Vec<BlendShape>,
    /// Resolved material per submesh, attached once materials are built
    pub materials: Vec<Arc<Material>>,
}

impl MeshBuffers {
    /// An empty mesh with a name
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Length of every per-vertex stream present, by name
    pub fn stream_lengths(&self) -> Vec<(String, usize)> {
        let mut lengths = vec![("POSITION".to_string(), self.positions.len())];
        if let Some(n) = &self.normals {
            lengths.push(("NORMAL".into(), n.len()));
        }
        if let Some(t) = &self.tangents {
            lengths.push(("TANGENT".into(), t.len()));
        }
        if let Some(c) = &self.colors {
            lengths.push(("COLOR_0".into(), c.len()));
        }
        for (channel, uv) in self.uvs.iter().enumerate() {
            if let Some(uv) = uv {
                lengths.push((format!("TEXCOORD_{}", channel), uv.len()));
            }
        }
        if let Some(w) = &self.bone_weights {
            lengths.push(("BONE_WEIGHTS".into(), w.len()));
        }
        for shape in &self.blend_shapes {
            lengths.push((format!("{}.POSITION", shape.name), shape.position_deltas.len()));
            if let Some(n) = &shape.normal_deltas {
                lengths.push((format!("{}.NORMAL", shape.name), n.len()));
            }
            if let Some(t) = &shape.tangent_deltas {
                lengths.push((format!("{}.TANGENT", shape.name), t.len()));
            }
        }
        lengths
    }

    /// Indices of one submesh
    pub fn submesh_indices(&self, submesh: usize) -> &[u32] {
        match self.submeshes.get(submesh) {
            Some(s) => &self.indices[s.index_start..s.index_start + s.index_count],
            None => &[],
        }
    }
}
