//! glTF JSON for the skinned fixture.

use serde_json::{json, Value};

use super::binary_packing::{BufferBuilder, FLOAT, UNSIGNED_BYTE};
use super::mesh_data::{AnimationData, MeshData, SkeletonData, SEGMENT_HEIGHT};

/// Pack the skinned mesh, skeleton and animation and describe them in JSON.
///
/// Nodes: 0 Root -> 1 Spine -> 2 Head, 3 mesh node with the skin.
pub(crate) fn build_skinned_gltf(
    mesh: &MeshData,
    skeleton: &SkeletonData,
    animation: &AnimationData,
) -> (Value, Vec<u8>) {
    let mut buffer = BufferBuilder::default();

    let position = buffer.push_positions(&mesh.positions());
    let normal = buffer.push(&mesh.normals(), FLOAT, "VEC3", None);
    let uv = buffer.push(&mesh.uvs(), FLOAT, "VEC2", None);
    let joints = buffer.push(&mesh.joints(), UNSIGNED_BYTE, "VEC4", None);
    let weights = buffer.push(&mesh.weights(), FLOAT, "VEC4", None);
    let indices = buffer.push_indices(&mesh.indices);
    let ibm = buffer.push(&skeleton.inverse_bind_matrices, FLOAT, "MAT4", None);
    let times = buffer.push_times(&animation.times);

    // Three LINEAR channels per bone, all sharing one input accessor
    let mut samplers = Vec::new();
    let mut channels = Vec::new();
    for (bone, track) in animation.tracks.iter().enumerate() {
        let outputs = [
            ("translation", buffer.push(&track.translations, FLOAT, "VEC3", None)),
            ("rotation", buffer.push(&track.rotations, FLOAT, "VEC4", None)),
            ("scale", buffer.push(&track.scales, FLOAT, "VEC3", None)),
        ];
        for (path, output) in outputs {
            channels.push(json!({
                "sampler": samplers.len(),
                "target": {"node": bone, "path": path},
            }));
            samplers.push(json!({"input": times, "output": output, "interpolation": "LINEAR"}));
        }
    }

    let (data, views, accessors) = buffer.finish();

    let root = json!({
        "asset": {"version": "2.0", "generator": "nether-gltf test generator"},
        "scene": 0,
        "scenes": [{"name": "Scene", "nodes": [0, 3]}],
        "nodes": [
            {"name": "Root", "children": [1], "translation": [0.0, 0.0, 0.0]},
            {"name": "Spine", "children": [2], "translation": [0.0, SEGMENT_HEIGHT, 0.0]},
            {"name": "Head", "translation": [0.0, SEGMENT_HEIGHT, 0.0]},
            {"name": "Body", "mesh": 0, "skin": 0},
        ],
        "meshes": [{
            "name": "Body",
            "primitives": [{
                "attributes": {
                    "POSITION": position,
                    "NORMAL": normal,
                    "TEXCOORD_0": uv,
                    "JOINTS_0": joints,
                    "WEIGHTS_0": weights,
                },
                "indices": indices,
                "material": 0,
            }],
        }],
        "materials": [{
            "name": "Skin",
            "pbrMetallicRoughness": {"baseColorFactor": [0.8, 0.6, 0.5, 1.0], "metallicFactor": 0.0},
        }],
        "skins": [{"name": "Armature", "inverseBindMatrices": ibm, "joints": [0, 1, 2], "skeleton": 0}],
        "animations": [{"name": "Wave", "channels": channels, "samplers": samplers}],
        "buffers": [{"byteLength": data.len()}],
        "bufferViews": views,
        "accessors": accessors,
    });

    (root, data)
}
