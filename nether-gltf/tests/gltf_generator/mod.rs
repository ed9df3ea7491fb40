//! Programmatic glTF/GLB generation for integration tests.
//!
//! Generates:
//! - a skinned GLB (positions, normals, UVs, joints, weights, indices, a
//!   3-bone skeleton with inverse bind matrices and a 30-frame wave)
//! - a two-primitive `.gltf` with an external buffer and a morph target
//! - a single triangle with an embedded data URI buffer
//! - a skinned triangle whose skin lists a missing joint node

#![allow(dead_code)]

mod binary_packing;
mod gltf_json;
mod mesh_data;
mod variants;

pub use mesh_data::{wave_angle, BONE_COUNT, FRAME_COUNT, SEGMENT_HEIGHT, SEGMENT_VERTICES};
pub use variants::{
    generate_embedded_triangle, generate_morph_gltf, generate_skin_with_missing_joint,
};

use mesh_data::{create_animation, create_mesh_data, create_skeleton};
use nether_gltf::glb::write_glb;

/// Generate a complete skinned GLB for testing.
///
/// Contains:
/// - 3 stacked box segments (one per bone)
/// - 3-bone skeleton (Root -> Spine -> Head)
/// - 30-frame wave animation
pub fn generate_skinned_glb() -> Vec<u8> {
    let mesh = create_mesh_data();
    let skeleton = create_skeleton();
    let animation = create_animation();

    let (root, buffer_data) = gltf_json::build_skinned_gltf(&mesh, &skeleton, &animation);
    let json = serde_json::to_vec(&root).expect("Failed to serialize JSON");
    write_glb(&json, Some(&buffer_data))
}
