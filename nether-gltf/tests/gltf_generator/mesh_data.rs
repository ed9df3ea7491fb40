//! Geometry, skeleton and wave animation of the skinned fixture.
//!
//! The mesh is a column of boxes, one per bone. Each box is rigidly bound
//! to its bone so skinning results are easy to predict.

use glam::{Mat4, Quat, Vec2, Vec3};
use std::f32::consts::TAU;

/// Bones in the Root -> Spine -> Head chain
pub const BONE_COUNT: usize = 3;
/// Keys per animation track
pub const FRAME_COUNT: usize = 30;
/// Vertices per box (6 faces x 4 corners)
pub const SEGMENT_VERTICES: usize = 24;
/// Height of one box, also the distance between bones
pub const SEGMENT_HEIGHT: f32 = 1.0;

const HALF_WIDTH: f32 = 0.15;

#[derive(Debug, Clone, Copy)]
pub(crate) struct SkinnedVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub bone: u8,
}

pub(crate) struct MeshData {
    pub vertices: Vec<SkinnedVertex>,
    pub indices: Vec<u16>,
}

impl MeshData {
    pub fn positions(&self) -> Vec<[f32; 3]> {
        self.vertices.iter().map(|v| v.position.to_array()).collect()
    }

    pub fn normals(&self) -> Vec<Vec3> {
        self.vertices.iter().map(|v| v.normal).collect()
    }

    pub fn uvs(&self) -> Vec<Vec2> {
        self.vertices.iter().map(|v| v.uv).collect()
    }

    /// JOINTS_0 as unsigned bytes: the owning bone in slot 0
    pub fn joints(&self) -> Vec<[u8; 4]> {
        self.vertices.iter().map(|v| [v.bone, 0, 0, 0]).collect()
    }

    /// WEIGHTS_0: full weight on slot 0
    pub fn weights(&self) -> Vec<[f32; 4]> {
        vec![[1.0, 0.0, 0.0, 0.0]; self.vertices.len()]
    }
}

pub(crate) struct SkeletonData {
    pub inverse_bind_matrices: Vec<Mat4>,
}

/// Keys of one bone, sampled at [`AnimationData::times`]
pub(crate) struct BoneTrack {
    pub translations: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    pub scales: Vec<Vec3>,
}

pub(crate) struct AnimationData {
    pub times: Vec<f32>,
    pub tracks: Vec<BoneTrack>,
}

/// Unit box face: outward axis plus the two axes spanning it, wound
/// counter-clockwise when seen from outside
const FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
];

const CORNERS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
];

/// One box per bone, stacked along +Y
pub(crate) fn create_mesh_data() -> MeshData {
    let mut vertices = Vec::with_capacity(BONE_COUNT * SEGMENT_VERTICES);
    let mut indices = Vec::with_capacity(BONE_COUNT * 36);
    let extent = Vec3::new(HALF_WIDTH, SEGMENT_HEIGHT * 0.5, HALF_WIDTH);

    for bone in 0..BONE_COUNT {
        let center = Vec3::new(0.0, (bone as f32 + 0.5) * SEGMENT_HEIGHT, 0.0);

        for (normal, u_axis, v_axis) in FACES {
            let first = vertices.len() as u16;
            for uv in CORNERS {
                let local = normal + u_axis * (uv.x * 2.0 - 1.0) + v_axis * (uv.y * 2.0 - 1.0);
                vertices.push(SkinnedVertex {
                    position: center + local * extent,
                    normal,
                    uv,
                    bone: bone as u8,
                });
            }
            indices.extend([0, 1, 2, 0, 2, 3].map(|i| first + i));
        }
    }

    MeshData { vertices, indices }
}

/// Each bone sits one segment above its parent; the inverse bind matrix
/// moves the bone's rest position back to the origin
pub(crate) fn create_skeleton() -> SkeletonData {
    let inverse_bind_matrices = (0..BONE_COUNT)
        .map(|bone| Mat4::from_translation(Vec3::new(0.0, -(bone as f32) * SEGMENT_HEIGHT, 0.0)))
        .collect();
    SkeletonData {
        inverse_bind_matrices,
    }
}

/// Z rotation of `bone` at normalised time `t`
pub fn wave_angle(bone: usize, t: f32) -> f32 {
    let phase = bone as f32 * 0.5;
    let amplitude = 0.3 + bone as f32 * 0.1;
    (t * TAU + phase).sin() * amplitude
}

/// One-second wave: every bone keeps its rest offset and sways about Z
pub(crate) fn create_animation() -> AnimationData {
    let times: Vec<f32> = (0..FRAME_COUNT)
        .map(|frame| frame as f32 / (FRAME_COUNT - 1) as f32)
        .collect();

    let tracks = (0..BONE_COUNT)
        .map(|bone| {
            let rest = if bone == 0 {
                Vec3::ZERO
            } else {
                Vec3::new(0.0, SEGMENT_HEIGHT, 0.0)
            };
            BoneTrack {
                translations: vec![rest; FRAME_COUNT],
                rotations: times
                    .iter()
                    .map(|&t| Quat::from_rotation_z(wave_angle(bone, t)))
                    .collect(),
                scales: vec![Vec3::ONE; FRAME_COUNT],
            }
        })
        .collect();

    AnimationData { times, tracks }
}
