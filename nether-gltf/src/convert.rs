//! Handedness conversion
//!
//! glTF is right-handed (+Y up, +Z forward, -X right when facing +Z); the
//! target convention is left-handed with the same up and forward axes. The
//! conversion mirrors the X axis. Every function here is an involution, so
//! applying it twice returns the input unchanged.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

/// Mirror matrix `diag(-1, 1, 1, 1)`
pub const FLIP: Mat4 = Mat4::from_cols(
    Vec4::new(-1.0, 0.0, 0.0, 0.0),
    Vec4::Y,
    Vec4::Z,
    Vec4::W,
);

/// Positions, directions, normals and morph deltas
#[inline]
pub fn vector(v: Vec3) -> Vec3 {
    Vec3::new(-v.x, v.y, v.z)
}

/// Tangents (xyz direction, w handedness)
///
/// `w` is kept: the X mirror and the UV V flip both reverse the bitangent,
/// which cancels out.
#[inline]
pub fn tangent(t: Vec4) -> Vec4 {
    Vec4::new(-t.x, t.y, t.z, t.w)
}

/// Rotations: negate Y and Z, keep X and W
#[inline]
pub fn rotation(q: Quat) -> Quat {
    Quat::from_xyzw(q.x, -q.y, -q.z, q.w)
}

/// Affine matrices: `FLIP * m * FLIP`
#[inline]
pub fn matrix(m: Mat4) -> Mat4 {
    FLIP * m * FLIP
}

/// Texture coordinates: glTF has its origin top-left, the target bottom-left
#[inline]
pub fn uv(v: Vec2) -> Vec2 {
    Vec2::new(v.x, 1.0 - v.y)
}
