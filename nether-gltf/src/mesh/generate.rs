//! Normal and tangent generation for triangle lists

use glam::{Vec2, Vec3, Vec4};

const EPSILON: f32 = 1e-8;

/// Face-weighted vertex normals: the unnormalised cross products of every
/// incident triangle are summed, then normalised.
pub fn generate_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (Some(&p0), Some(&p1), Some(&p2)) = (positions.get(a), positions.get(b), positions.get(c))
        else {
            continue;
        };
        let face = (p1 - p0).cross(p2 - p0);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }

    normals
        .into_iter()
        .map(|n| n.normalize_or(Vec3::Y))
        .collect()
}

/// Axis with the smallest absolute dot product against `n`
fn least_aligned_axis(n: Vec3) -> Vec3 {
    let a = n.abs();
    if a.x <= a.y && a.x <= a.z {
        Vec3::X
    } else if a.y <= a.z {
        Vec3::Y
    } else {
        Vec3::Z
    }
}

/// Per-vertex tangents from texture-space derivatives.
///
/// Triangle basis vectors are accumulated per vertex, then Gram-Schmidt
/// orthogonalised against the normal. `w` holds the bitangent sign.
pub fn generate_tangents(
    positions: &[Vec3],
    normals: &[Vec3],
    uvs: &[Vec2],
    indices: &[u32],
) -> Vec<Vec4> {
    let count = positions.len();
    let mut tan1 = vec![Vec3::ZERO; count];
    let mut tan2 = vec![Vec3::ZERO; count];

    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a >= count || b >= count || c >= count {
            continue;
        }
        let (Some(&uv0), Some(&uv1), Some(&uv2)) = (uvs.get(a), uvs.get(b), uvs.get(c)) else {
            continue;
        };

        let e1 = positions[b] - positions[a];
        let e2 = positions[c] - positions[a];
        let d1 = uv1 - uv0;
        let d2 = uv2 - uv0;

        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let sdir = (e1 * d2.y - e2 * d1.y) * r;
        let tdir = (e2 * d1.x - e1 * d2.x) * r;

        for i in [a, b, c] {
            tan1[i] += sdir;
            tan2[i] += tdir;
        }
    }

    (0..count)
        .map(|i| {
            let n = normals.get(i).copied().unwrap_or(Vec3::Y);
            let mut t = tan1[i] - n * n.dot(tan1[i]);
            if t.length_squared() < EPSILON {
                let axis = least_aligned_axis(n);
                t = axis - n * n.dot(axis);
            }
            let t = t.normalize_or(Vec3::X);
            let w = if n.cross(t).dot(tan2[i]) < 0.0 { -1.0 } else { 1.0 };
            t.extend(w)
        })
        .collect()
}
