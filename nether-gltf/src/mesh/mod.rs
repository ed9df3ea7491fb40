//! Mesh assembly (glTF primitives -> merged vertex/index buffers)

mod assemble;
mod generate;
mod morph;
mod primitive;
mod types;

// Re-export public API
pub use assemble::MeshAssembler;
pub use generate::{generate_normals, generate_tangents};
pub use types::{
    BlendShape, BoneWeight, Bounds, IndexFormat, MeshBuffers, SubMesh, Topology, MAX_NARROW_INDEX,
    MAX_SKIN_SETS, MAX_UV_CHANNELS,
};
