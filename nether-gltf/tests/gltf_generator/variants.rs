//! Small single-purpose fixtures.

use base64::Engine;
use glam::{Mat4, Vec3};
use serde_json::{json, Value};

use super::binary_packing::{BufferBuilder, FLOAT, UNSIGNED_BYTE};

/// Two primitives that disagree on optional attributes, a morph target on the
/// first primitive only, and a STEP animation of its weight.
///
/// Returns the glTF JSON (referencing `bin_name`) and the buffer bytes.
pub fn generate_morph_gltf(bin_name: &str) -> (String, Vec<u8>) {
    let mut buffer = BufferBuilder::default();

    // Primitive 0: quad with normals, UVs and a morph target
    let quad = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
    let quad_position = buffer.push_positions(&quad);
    let quad_normal = buffer.push(&[[0.0f32, 0.0, 1.0]; 4], FLOAT, "VEC3", None);
    let quad_uv = buffer.push(
        &[[0.0f32, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        FLOAT,
        "VEC2",
        None,
    );
    let quad_indices = buffer.push_indices(&[0, 1, 2, 0, 2, 3]);
    let smile = buffer.push(&[[0.0f32, 0.5, 0.0]; 4], FLOAT, "VEC3", None);

    // Primitive 1: bare triangle, positions only
    let tri = [[2.0, 0.0, 0.0], [3.0, 0.0, 0.0], [2.0, 1.0, 0.0]];
    let tri_position = buffer.push_positions(&tri);
    let tri_indices = buffer.push_indices(&[0, 1, 2]);

    let times = buffer.push_times(&[0.0, 1.0, 2.0]);
    let weights = buffer.push(&[0.0f32, 1.0, 0.25], FLOAT, "SCALAR", None);

    let (data, views, accessors) = buffer.finish();
    let root = json!({
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [{"name": "Face", "mesh": 0}],
        "meshes": [{
            "name": "Face",
            "weights": [0.0],
            "extras": {"targetNames": ["Smile"]},
            "primitives": [
                {
                    "attributes": {"POSITION": quad_position, "NORMAL": quad_normal, "TEXCOORD_0": quad_uv},
                    "indices": quad_indices,
                    "targets": [{"POSITION": smile}],
                },
                {
                    "attributes": {"POSITION": tri_position},
                    "indices": tri_indices,
                    "material": 7,
                },
            ],
        }],
        "animations": [{
            "channels": [{"sampler": 0, "target": {"node": 0, "path": "weights"}}],
            "samplers": [{"input": times, "output": weights, "interpolation": "STEP"}],
        }],
        "buffers": [{"uri": bin_name, "byteLength": data.len()}],
        "bufferViews": views,
        "accessors": accessors,
    });

    (root.to_string(), data)
}

/// One triangle without normals, buffer embedded as a base64 data URI
pub fn generate_embedded_triangle() -> String {
    let mut buffer = BufferBuilder::default();
    let position = buffer.push_positions(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    let indices = buffer.push_indices(&[0, 1, 2]);
    let (data, views, accessors) = buffer.finish();

    let uri = format!(
        "data:application/octet-stream;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&data)
    );
    let root: Value = json!({
        "asset": {"version": "2.0"},
        "nodes": [{"mesh": 0}],
        "meshes": [{"primitives": [{"attributes": {"POSITION": position}, "indices": indices}]}],
        "buffers": [{"uri": uri, "byteLength": data.len()}],
        "bufferViews": views,
        "accessors": accessors,
    });
    root.to_string()
}

/// Skin whose middle joint points at a node that does not exist.
///
/// Joints `[0, 99, 1]` with inverse bind matrices translating by +1, +2 and
/// +3 on X. The single triangle is bound entirely to palette slot 2.
pub fn generate_skin_with_missing_joint() -> String {
    let mut buffer = BufferBuilder::default();
    let position = buffer.push_positions(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    let joints = buffer.push(&[[2u8, 0, 0, 0]; 3], UNSIGNED_BYTE, "VEC4", None);
    let weights = buffer.push(&[[1.0f32, 0.0, 0.0, 0.0]; 3], FLOAT, "VEC4", None);
    let indices = buffer.push_indices(&[0, 1, 2]);
    let matrices = [1.0, 2.0, 3.0].map(|x| Mat4::from_translation(Vec3::new(x, 0.0, 0.0)));
    let ibm = buffer.push(&matrices, FLOAT, "MAT4", None);
    let (data, views, accessors) = buffer.finish();

    let uri = format!(
        "data:application/octet-stream;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&data)
    );
    let root: Value = json!({
        "asset": {"version": "2.0"},
        "nodes": [
            {"name": "Hip", "children": [1]},
            {"name": "Knee", "translation": [0.0, -1.0, 0.0]},
            {"name": "Leg", "mesh": 0, "skin": 0},
        ],
        "meshes": [{"primitives": [{
            "attributes": {"POSITION": position, "JOINTS_0": joints, "WEIGHTS_0": weights},
            "indices": indices,
        }]}],
        "skins": [{"inverseBindMatrices": ibm, "joints": [0, 99, 1]}],
        "buffers": [{"uri": uri, "byteLength": data.len()}],
        "bufferViews": views,
        "accessors": accessors,
    });
    root.to_string()
}
