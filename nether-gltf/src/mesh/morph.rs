//! Morph target reconstruction over the merged vertex range

use glam::Vec3;

use super::types::BlendShape;
use crate::accessor::AccessorTable;
use crate::convert;
use crate::document;

/// Where a source primitive landed in the merged vertex arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PrimitiveWindow {
    pub primitive: usize,
    pub first_vertex: usize,
    pub vertex_count: usize,
}

/// Copy one target accessor into its primitive's window
fn write_window(
    deltas: &mut [Vec3],
    window: PrimitiveWindow,
    accessor: usize,
    accessors: &AccessorTable,
    label: &str,
) {
    let Some(accessor) = accessors.get(accessor) else {
        return;
    };
    let values = accessor.read_vec3();
    if values.len() != window.vertex_count {
        tracing::warn!(
            "{} has {} deltas for {} vertices",
            label,
            values.len(),
            window.vertex_count
        );
    }
    let dst = &mut deltas[window.first_vertex..window.first_vertex + window.vertex_count];
    for (d, v) in dst.iter_mut().zip(values) {
        *d = convert::vector(v);
    }
}

/// Build one blend shape per morph target index.
///
/// Runs after all primitives are merged. A primitive without an accessor for
/// a given target keeps zero deltas over its vertex window.
pub(crate) fn build_blend_shapes(
    mesh: &document::Mesh,
    windows: &[PrimitiveWindow],
    vertex_count: usize,
    accessors: &AccessorTable,
    mesh_label: &str,
) -> Vec<BlendShape> {
    let target_count = windows
        .iter()
        .filter_map(|w| mesh.primitives.get(w.primitive))
        .map(|p| p.targets.len())
        .max()
        .unwrap_or(0);

    let mut shapes = Vec::with_capacity(target_count);
    for target in 0..target_count {
        let mut positions = vec![Vec3::ZERO; vertex_count];
        let mut normals: Option<Vec<Vec3>> = None;
        let mut tangents: Option<Vec<Vec3>> = None;

        for &window in windows {
            let Some(attributes) = mesh
                .primitives
                .get(window.primitive)
                .and_then(|p| p.targets.get(target))
            else {
                continue;
            };
            let label = format!(
                "{} primitive {} target {}",
                mesh_label, window.primitive, target
            );

            for (semantic, &accessor) in attributes {
                let stream = match semantic.as_str() {
                    "POSITION" => &mut positions,
                    "NORMAL" => normals.get_or_insert_with(|| vec![Vec3::ZERO; vertex_count]),
                    "TANGENT" => tangents.get_or_insert_with(|| vec![Vec3::ZERO; vertex_count]),
                    other => {
                        tracing::debug!("{} ignoring morph attribute {}", label, other);
                        continue;
                    }
                };
                write_window(stream, window, accessor, accessors, &label);
            }
        }

        shapes.push(BlendShape {
            name: mesh.extras.target_name(target),
            default_weight: mesh.weights.get(target).copied().unwrap_or(0.0),
            position_deltas: positions,
            normal_deltas: normals,
            tangent_deltas: tangents,
        });
    }
    shapes
}
