//! Multi-primitive mesh assembly
//!
//! Primitives are decoded in declared order and appended to one set of
//! vertex streams. Indices are rebased by the running vertex count, each
//! primitive becomes a [`SubMesh`], and optional streams are padded with
//! neutral values so every per-vertex array stays as long as the positions.

use glam::{Vec2, Vec3, Vec4};
use rayon::prelude::*;

use super::generate::{generate_normals, generate_tangents};
use super::morph::{build_blend_shapes, PrimitiveWindow};
use super::primitive::{PrimitiveGeometry, PrimitiveSources};
use super::types::{BoneWeight, Bounds, IndexFormat, MeshBuffers, SubMesh, Topology};
use crate::accessor::AccessorTable;
use crate::document;
use crate::draco::DracoDecoder;
use crate::settings::MeshSettings;
use crate::source::BufferViewData;

/// Append one primitive's stream, padding whichever side is missing
fn append_stream<T: Clone>(
    stream: &mut Option<Vec<T>>,
    part: Option<Vec<T>>,
    offset: usize,
    count: usize,
    neutral: T,
) {
    match (stream.as_mut(), part) {
        (Some(merged), Some(part)) => merged.extend(part),
        (Some(merged), None) => merged.resize(offset + count, neutral),
        (None, Some(part)) => {
            let mut merged = vec![neutral; offset];
            merged.extend(part);
            *stream = Some(merged);
        }
        (None, None) => {}
    }
}

/// Builds [`MeshBuffers`] from document meshes
pub struct MeshAssembler<'a> {
    sources: PrimitiveSources<'a>,
    material_count: usize,
    settings: &'a MeshSettings,
}

impl<'a> MeshAssembler<'a> {
    pub fn new(
        accessors: &'a AccessorTable,
        views: &'a [Option<BufferViewData>],
        material_count: usize,
        settings: &'a MeshSettings,
    ) -> Self {
        Self {
            sources: PrimitiveSources {
                accessors,
                views,
                draco: None,
            },
            material_count,
            settings,
        }
    }

    /// Use `decoder` for `KHR_draco_mesh_compression` primitives
    pub fn with_draco(mut self, decoder: Option<&'a dyn DracoDecoder>) -> Self {
        self.sources.draco = decoder;
        self
    }

    /// Assemble every mesh, in parallel
    pub fn assemble_all(&self, meshes: &[document::Mesh]) -> Vec<MeshBuffers> {
        meshes
            .par_iter()
            .enumerate()
            .map(|(index, mesh)| self.assemble(index, mesh))
            .collect()
    }

    /// Merge all primitives of one mesh
    pub fn assemble(&self, index: usize, mesh: &document::Mesh) -> MeshBuffers {
        let name = mesh
            .name
            .clone()
            .unwrap_or_else(|| format!("mesh{}", index));
        let mesh_label = format!("mesh {}", index);

        let mut out = MeshBuffers::empty(name);
        if mesh.primitives.is_empty() {
            tracing::debug!("{} has no primitives", mesh_label);
            return out;
        }

        let mut windows = Vec::with_capacity(mesh.primitives.len());
        let mut bounds: Option<Bounds> = None;

        for (p, primitive) in mesh.primitives.iter().enumerate() {
            let label = format!("{} primitive {}", mesh_label, p);
            let Some(geometry) = PrimitiveGeometry::decode(primitive, self.sources, &label) else {
                continue;
            };

            let offset = out.positions.len();
            let count = geometry.vertex_count();
            let topology = geometry.topology.unwrap_or(Topology::Triangles);
            let prim_bounds = Bounds::from_points(&geometry.positions);
            bounds = match (bounds, prim_bounds) {
                (Some(a), Some(b)) => Some(a.union(b)),
                (a, b) => a.or(b),
            };

            let material = primitive.material.and_then(|m| {
                if m < self.material_count {
                    Some(m)
                } else {
                    tracing::warn!(
                        "{} references missing material {}, using fallback",
                        label,
                        m
                    );
                    None
                }
            });

            let mut submesh = SubMesh {
                index_start: out.indices.len(),
                index_count: geometry.indices.len(),
                topology,
                first_vertex: offset,
                vertex_count: count,
                material,
                bounds: prim_bounds.filter(|_| self.settings.submesh_bounds),
                custom: Default::default(),
            };
            for extension in primitive.extensions.resolved() {
                extension.contribute_submesh(&mut submesh);
            }

            out.indices
                .extend(geometry.indices.iter().map(|&i| i + offset as u32));
            out.positions.extend(geometry.positions);
            append_stream(&mut out.normals, geometry.normals, offset, count, Vec3::ZERO);
            append_stream(&mut out.tangents, geometry.tangents, offset, count, Vec4::ZERO);
            append_stream(&mut out.colors, geometry.colors, offset, count, Vec4::ONE);
            for (merged, part) in out.uvs.iter_mut().zip(geometry.uvs) {
                append_stream(merged, part, offset, count, Vec2::ZERO);
            }
            append_stream(
                &mut out.bone_weights,
                geometry.bone_weights,
                offset,
                count,
                BoneWeight::default(),
            );

            out.submeshes.push(submesh);
            windows.push(PrimitiveWindow {
                primitive: p,
                first_vertex: offset,
                vertex_count: count,
            });
        }

        out.bounds = bounds.unwrap_or_default();
        out.index_format = IndexFormat::for_vertex_count(out.positions.len());

        let all_triangles = out
            .submeshes
            .iter()
            .all(|s| s.topology == Topology::Triangles);

        if out.normals.is_none() && self.settings.generate_normals && !out.positions.is_empty() {
            if all_triangles {
                tracing::debug!("{}: generating normals", mesh_label);
                out.normals = Some(generate_normals(&out.positions, &out.indices));
            } else {
                tracing::warn!(
                    "{}: not generating normals for point/line topology",
                    mesh_label
                );
            }
        }

        if out.tangents.is_none() && self.settings.generate_tangents && all_triangles {
            if let (Some(normals), Some(uv0)) = (&out.normals, &out.uvs[0]) {
                tracing::debug!("{}: generating tangents", mesh_label);
                out.tangents = Some(generate_tangents(
                    &out.positions,
                    normals,
                    uv0,
                    &out.indices,
                ));
            }
        }

        if self.settings.blend_shapes {
            out.blend_shapes = build_blend_shapes(
                mesh,
                &windows,
                out.positions.len(),
                self.sources.accessors,
                &mesh_label,
            );
        }

        tracing::debug!(
            "Assembled {} '{}': {} vertices, {} indices, {} submeshes, {} blend shapes",
            mesh_label,
            out.name,
            out.positions.len(),
            out.indices.len(),
            out.submeshes.len(),
            out.blend_shapes.len()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::draco::{DracoGeometry, DracoStream};
    use crate::error::Result;
    use crate::extensions::{
        decode_extension, DracoMeshCompression, Extension, ExtensionRegistry,
    };

    /// Lays out float/u16 arrays as one buffer view each
    #[derive(Default)]
    struct Fixture {
        views: Vec<Option<BufferViewData>>,
        accessors: Vec<document::Accessor>,
    }

    impl Fixture {
        fn push(&mut self, bytes: Vec<u8>, component_type: u32, ty: &str, count: usize) -> usize {
            self.views.push(Some(BufferViewData::from_bytes(bytes)));
            self.accessors.push(document::Accessor {
                buffer_view: Some(self.views.len() - 1),
                component_type,
                count,
                element_type: ty.to_string(),
                ..Default::default()
            });
            self.accessors.len() - 1
        }

        fn vec3(&mut self, values: &[[f32; 3]]) -> usize {
            self.push(bytemuck::cast_slice(values).to_vec(), 5126, "VEC3", values.len())
        }

        fn vec2(&mut self, values: &[[f32; 2]]) -> usize {
            self.push(bytemuck::cast_slice(values).to_vec(), 5126, "VEC2", values.len())
        }

        fn indices(&mut self, values: &[u16]) -> usize {
            self.push(bytemuck::cast_slice(values).to_vec(), 5123, "SCALAR", values.len())
        }

        fn table(&self) -> AccessorTable {
            AccessorTable::resolve(&self.accessors, &self.views)
        }
    }

    fn primitive(attributes: &[(&str, usize)], indices: Option<usize>) -> document::Primitive {
        document::Primitive {
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            indices,
            ..Default::default()
        }
    }

    fn assert_no_drift(mesh: &MeshBuffers) {
        for (name, len) in mesh.stream_lengths() {
            assert_eq!(len, mesh.vertex_count(), "{} drifted", name);
        }
    }

    const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

    #[test]
    fn test_single_triangle_scenario() {
        let mut f = Fixture::default();
        let pos = f.vec3(&TRIANGLE);
        let idx = f.indices(&[0, 1, 2]);
        let table = f.table();
        let settings = MeshSettings::default();
        let mesh = document::Mesh {
            primitives: vec![primitive(&[("POSITION", pos)], Some(idx))],
            ..Default::default()
        };

        let out = MeshAssembler::new(&table, &f.views, 0, &settings).assemble(0, &mesh);
        assert_eq!(out.name, "mesh0");
        assert_eq!(out.vertex_count(), 3);
        assert_eq!(out.submeshes.len(), 1);
        assert_eq!(out.submeshes[0].index_count, 3);
        assert_eq!(out.submeshes[0].topology, Topology::Triangles);
        assert_eq!(out.index_format, IndexFormat::U16);

        // X mirrored, winding reversed
        assert_eq!(out.positions[1], Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(out.indices, vec![2, 1, 0]);

        // Generated normals agree and keep the source's +Z facing
        let normals = out.normals.as_ref().unwrap();
        for n in normals {
            assert!(n.abs_diff_eq(Vec3::Z, 1e-6), "normal {:?}", n);
        }
        assert_no_drift(&out);
    }

    #[test]
    fn test_reversed_winding_stays_front_facing() {
        // Face normal of the converted triangle equals the converted source normal
        let mut f = Fixture::default();
        let tilted = [[0.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 1.0, 0.0]];
        let pos = f.vec3(&tilted);
        let table = f.table();
        let settings = MeshSettings::default();
        let mesh = document::Mesh {
            primitives: vec![primitive(&[("POSITION", pos)], None)],
            ..Default::default()
        };
        let out = MeshAssembler::new(&table, &f.views, 0, &settings).assemble(0, &mesh);

        let p = |i: u32| Vec3::from(tilted[i as usize]);
        let source_normal = (p(1) - p(0)).cross(p(2) - p(0)).normalize();
        let expected = crate::convert::vector(source_normal);
        assert!(out.normals.unwrap()[0].abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_merge_pads_missing_streams() {
        let mut f = Fixture::default();
        let pos_a = f.vec3(&TRIANGLE);
        let uv_a = f.vec2(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let pos_b = f.vec3(&[[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0], [1.0, 1.0, 1.0]]);
        let nrm_b = f.vec3(&[[0.0, 0.0, 1.0]; 4]);
        let idx_b = f.indices(&[0, 1, 2, 2, 1, 3]);
        let table = f.table();
        let settings = MeshSettings {
            submesh_bounds: true,
            ..Default::default()
        };
        let mut second = primitive(&[("POSITION", pos_b), ("NORMAL", nrm_b)], Some(idx_b));
        second.material = Some(7);
        let mesh = document::Mesh {
            name: Some("Merged".into()),
            primitives: vec![
                primitive(&[("POSITION", pos_a), ("TEXCOORD_0", uv_a)], None),
                second,
            ],
            ..Default::default()
        };

        let out = MeshAssembler::new(&table, &f.views, 1, &settings).assemble(0, &mesh);
        assert_eq!(out.vertex_count(), 7);
        assert_no_drift(&out);

        let normals = out.normals.as_ref().unwrap();
        assert_eq!(normals[0], Vec3::ZERO);
        assert_eq!(normals[3], Vec3::Z);

        let uv0 = out.uvs[0].as_ref().unwrap();
        assert_eq!(uv0[1], Vec2::new(1.0, 1.0));
        assert_eq!(uv0[5], Vec2::ZERO);

        // Second primitive indices rebased past the first three vertices
        assert_eq!(out.submeshes[1].index_start, 3);
        assert_eq!(out.submesh_indices(1), &[5, 4, 3, 6, 4, 5]);
        assert_eq!(out.submeshes[1].first_vertex, 3);
        assert_eq!(out.submeshes[1].material, None);

        let b0 = out.submeshes[0].bounds.unwrap();
        let b1 = out.submeshes[1].bounds.unwrap();
        assert_eq!(out.bounds, b0.union(b1));
        assert_eq!(out.bounds.min, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(out.bounds.max, Vec3::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn test_morph_targets_use_primitive_windows() {
        let mut f = Fixture::default();
        let pos_a = f.vec3(&TRIANGLE);
        let pos_b = f.vec3(&TRIANGLE);
        let delta_b = f.vec3(&[[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 3.0]]);
        let normal_a = f.vec3(&[[0.0, 1.0, 0.0]; 3]);
        let table = f.table();
        let settings = MeshSettings::default();

        let mut a = primitive(&[("POSITION", pos_a)], None);
        a.targets = vec![
            BTreeMap::from([("NORMAL".to_string(), normal_a)]),
            BTreeMap::new(),
        ];
        let mut b = primitive(&[("POSITION", pos_b)], None);
        b.targets = vec![BTreeMap::from([("POSITION".to_string(), delta_b)])];

        let mesh = document::Mesh {
            primitives: vec![a, b],
            weights: vec![0.25],
            extras: document::MeshExtras {
                target_names: vec!["Smile".into()],
            },
            ..Default::default()
        };
        let out = MeshAssembler::new(&table, &f.views, 0, &settings).assemble(0, &mesh);

        assert_eq!(out.blend_shapes.len(), 2);
        let smile = &out.blend_shapes[0];
        assert_eq!(smile.name, "Smile");
        assert_eq!(smile.default_weight, 0.25);
        assert_eq!(&smile.position_deltas[..3], &[Vec3::ZERO; 3]);
        assert_eq!(smile.position_deltas[3], Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(smile.position_deltas[5], Vec3::new(0.0, 0.0, 3.0));
        let normals = smile.normal_deltas.as_ref().unwrap();
        assert_eq!(normals[0], Vec3::Y);
        assert_eq!(normals[4], Vec3::ZERO);
        assert!(smile.tangent_deltas.is_none());

        assert_eq!(out.blend_shapes[1].name, "1");
        assert_no_drift(&out);
    }

    #[test]
    fn test_points_and_lines_skip_normal_generation() {
        let mut f = Fixture::default();
        let pos = f.vec3(&TRIANGLE);
        let table = f.table();
        let settings = MeshSettings::default();
        let mut points = primitive(&[("POSITION", pos)], None);
        points.mode = Some(0);
        let mut lines = primitive(&[("POSITION", pos)], None);
        lines.mode = Some(2);
        let mut bogus = primitive(&[("POSITION", pos)], None);
        bogus.mode = Some(11);
        let mesh = document::Mesh {
            primitives: vec![points, lines, bogus],
            ..Default::default()
        };

        let out = MeshAssembler::new(&table, &f.views, 0, &settings).assemble(0, &mesh);
        assert_eq!(out.submeshes.len(), 2);
        assert_eq!(out.submeshes[0].topology, Topology::Points);
        assert_eq!(out.submeshes[1].topology, Topology::LineStrip);
        assert_eq!(out.submesh_indices(1), &[3, 4, 5, 3]);
        assert!(out.normals.is_none());
        assert_no_drift(&out);
    }

    #[test]
    fn test_empty_mesh_is_valid() {
        let table = AccessorTable::default();
        let settings = MeshSettings::default();
        let mesh = document::Mesh {
            name: Some("Nothing".into()),
            ..Default::default()
        };
        let out = MeshAssembler::new(&table, &[], 0, &settings).assemble(3, &mesh);
        assert_eq!(out.name, "Nothing");
        assert!(out.is_empty());
        assert!(out.submeshes.is_empty());
        assert_eq!(out.bounds, Bounds::default());
    }

    #[test]
    fn test_tangents_generated_with_uvs() {
        let mut f = Fixture::default();
        let pos = f.vec3(&TRIANGLE);
        let uv = f.vec2(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let table = f.table();
        let settings = MeshSettings::default();
        let mesh = document::Mesh {
            primitives: vec![primitive(&[("POSITION", pos), ("TEXCOORD_0", uv)], None)],
            ..Default::default()
        };
        let out = MeshAssembler::new(&table, &f.views, 0, &settings).assemble(0, &mesh);
        let tangents = out.tangents.as_ref().unwrap();
        assert_eq!(tangents.len(), 3);
        for t in tangents {
            assert!((t.truncate().length() - 1.0).abs() < 1e-5);
            assert!(t.w == 1.0 || t.w == -1.0);
        }
    }

    #[test]
    fn test_wide_indices_above_threshold() {
        let mut f = Fixture::default();
        let points: Vec<[f32; 3]> = (0..70_000).map(|i| [i as f32, 0.0, 0.0]).collect();
        let pos = f.vec3(&points);
        let table = f.table();
        let settings = MeshSettings::default();
        let mut prim = primitive(&[("POSITION", pos)], None);
        prim.mode = Some(0);
        let mesh = document::Mesh {
            primitives: vec![prim],
            ..Default::default()
        };
        let out = MeshAssembler::new(&table, &f.views, 0, &settings).assemble(0, &mesh);
        assert_eq!(out.index_format, IndexFormat::U32);
    }

    #[derive(Debug)]
    struct FakeDraco;

    impl DracoDecoder for FakeDraco {
        fn decode(&self, bytes: &[u8], extension: &DracoMeshCompression) -> Result<DracoGeometry> {
            assert_eq!(bytes, b"DRACO");
            assert_eq!(extension.attributes["POSITION"], 0);
            Ok(DracoGeometry {
                vertex_count: 3,
                indices: vec![0, 1, 2],
                attributes: BTreeMap::from([(
                    "POSITION".to_string(),
                    DracoStream {
                        components: 3,
                        values: TRIANGLE.concat(),
                    },
                )]),
            })
        }
    }

    #[derive(Debug, serde::Deserialize)]
    struct Tag {
        value: String,
    }

    impl Extension for Tag {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn contribute_submesh(&self, submesh: &mut SubMesh) {
            submesh
                .custom
                .insert("tag".into(), serde_json::Value::String(self.value.clone()));
        }
    }

    #[test]
    fn test_draco_primitive_and_submesh_extension() {
        let mut registry = ExtensionRegistry::with_builtin();
        registry.register("VENDOR_tag", decode_extension::<Tag>);
        let doc = document::Document::from_json(
            br#"{
                "asset": {"version": "2.0"},
                "meshes": [{"primitives": [{
                    "attributes": {"POSITION": 0},
                    "extensions": {
                        "KHR_draco_mesh_compression": {"bufferView": 0, "attributes": {"POSITION": 0}},
                        "VENDOR_tag": {"value": "hull"}
                    }
                }]}],
                "accessors": [{"componentType": 5126, "count": 3, "type": "VEC3"}]
            }"#,
            &registry,
        )
        .unwrap();

        let views = vec![Some(BufferViewData::from_bytes(b"DRACO".to_vec()))];
        let table = AccessorTable::resolve(&doc.accessors, &views);
        let settings = MeshSettings::default();
        let decoder: Arc<dyn DracoDecoder> = Arc::new(FakeDraco);

        let out = MeshAssembler::new(&table, &views, 0, &settings)
            .with_draco(Some(decoder.as_ref()))
            .assemble(0, &doc.meshes[0]);
        assert_eq!(out.vertex_count(), 3);
        assert_eq!(out.positions[1], Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(out.indices, vec![2, 1, 0]);
        assert_eq!(out.submeshes[0].custom["tag"], serde_json::json!("hull"));

        // Without a decoder the compressed primitive is skipped
        let skipped = MeshAssembler::new(&table, &views, 0, &settings).assemble(0, &doc.meshes[0]);
        assert!(skipped.submeshes.is_empty());
    }
}
