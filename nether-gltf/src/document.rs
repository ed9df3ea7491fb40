//! glTF JSON document model
//!
//! A direct serde mapping of the glTF 2.0 schema. Indices stay plain
//! `usize` values; validation happens in the stages that dereference them.
//! Extension objects are kept raw and resolved through an
//! [`ExtensionRegistry`](crate::extensions::ExtensionRegistry) once the whole
//! document has been parsed.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use crate::error::{ImportError, Result};
use crate::extensions::{ExtensionRegistry, Extensions};

/// Root of a glTF document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Required by the format; checked after parsing
    pub asset: Option<Asset>,
    /// Default scene index
    pub scene: Option<usize>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub meshes: Vec<Mesh>,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub textures: Vec<Texture>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub samplers: Vec<Sampler>,
    #[serde(default)]
    pub buffers: Vec<Buffer>,
    #[serde(default)]
    pub buffer_views: Vec<BufferView>,
    #[serde(default)]
    pub accessors: Vec<Accessor>,
    #[serde(default)]
    pub skins: Vec<Skin>,
    #[serde(default)]
    pub animations: Vec<Animation>,
    #[serde(default)]
    pub cameras: Vec<Camera>,
    #[serde(default)]
    pub extensions_used: Vec<String>,
    #[serde(default)]
    pub extensions_required: Vec<String>,
    #[serde(default)]
    pub extensions: Extensions,
}

impl Document {
    /// Parse and validate JSON text, then resolve extensions.
    ///
    /// Fails only for syntax errors, a missing `asset` object or a
    /// non-2.x asset version.
    pub fn from_json(json: &[u8], registry: &ExtensionRegistry) -> Result<Self> {
        let mut document: Document = serde_json::from_slice(json)?;

        let asset = document
            .asset
            .as_ref()
            .ok_or(ImportError::MissingField("asset"))?;
        if !asset.version.starts_with("2.") && asset.version != "2" {
            return Err(ImportError::UnsupportedAssetVersion(asset.version.clone()));
        }

        for name in &document.extensions_required {
            if !registry.contains(name) {
                tracing::warn!(
                    "Required extension '{}' is not registered, importing without it",
                    name
                );
            }
        }

        document.resolve_extensions(registry);
        Ok(document)
    }

    fn resolve_extensions(&mut self, registry: &ExtensionRegistry) {
        registry.resolve(&mut self.extensions);
        for node in &mut self.nodes {
            registry.resolve(&mut node.extensions);
        }
        for mesh in &mut self.meshes {
            registry.resolve(&mut mesh.extensions);
            for primitive in &mut mesh.primitives {
                registry.resolve(&mut primitive.extensions);
            }
        }
        for material in &mut self.materials {
            registry.resolve(&mut material.extensions);
            if let Some(pbr) = &mut material.pbr_metallic_roughness {
                for info in [
                    &mut pbr.base_color_texture,
                    &mut pbr.metallic_roughness_texture,
                ]
                .into_iter()
                .flatten()
                {
                    registry.resolve(&mut info.extensions);
                }
            }
            if let Some(info) = &mut material.normal_texture {
                registry.resolve(&mut info.extensions);
            }
            if let Some(info) = &mut material.occlusion_texture {
                registry.resolve(&mut info.extensions);
            }
            if let Some(info) = &mut material.emissive_texture {
                registry.resolve(&mut info.extensions);
            }
        }
        for texture in &mut self.textures {
            registry.resolve(&mut texture.extensions);
        }
    }

    /// Generator string from the asset block
    pub fn generator(&self) -> Option<&str> {
        self.asset.as_ref().and_then(|a| a.generator.as_deref())
    }
}

/// `asset` block
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    #[serde(default)]
    pub version: String,
    pub min_version: Option<String>,
    pub generator: Option<String>,
    pub copyright: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scene {
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Node {
    pub name: Option<String>,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    pub camera: Option<usize>,
    #[serde(default)]
    pub children: Vec<usize>,
    /// Column-major 4x4 matrix; takes precedence over TRS
    pub matrix: Option<[f32; 16]>,
    pub translation: Option<[f32; 3]>,
    /// Quaternion `[x, y, z, w]`
    pub rotation: Option<[f32; 4]>,
    pub scale: Option<[f32; 3]>,
    /// Morph weights overriding `mesh.weights`
    pub weights: Option<Vec<f32>>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Mesh {
    pub name: Option<String>,
    #[serde(default)]
    pub primitives: Vec<Primitive>,
    /// Default morph target weights
    #[serde(default)]
    pub weights: Vec<f32>,
    #[serde(default)]
    pub extras: MeshExtras,
    #[serde(default)]
    pub extensions: Extensions,
}

/// Mesh `extras`; only the conventional morph target names are read.
///
/// `extras` may hold any JSON value, so anything that is not an object with a
/// `targetNames` array yields no names instead of failing the document.
#[derive(Debug, Clone, Default)]
pub struct MeshExtras {
    /// Non-string entries keep their slot as an empty name
    pub target_names: Vec<String>,
}

impl MeshExtras {
    pub fn from_value(value: &serde_json::Value) -> Self {
        let names = match value.get("targetNames") {
            Some(serde_json::Value::Array(names)) => names,
            Some(other) => {
                tracing::warn!("Ignoring mesh extras.targetNames that is not an array: {}", other);
                return Self::default();
            }
            None => return Self::default(),
        };
        let target_names = names
            .iter()
            .map(|name| match name.as_str() {
                Some(name) => name.to_string(),
                None => {
                    tracing::warn!("Ignoring non-string morph target name {}", name);
                    String::new()
                }
            })
            .collect();
        Self { target_names }
    }

    /// Name of morph target `index`, falling back to the index itself
    pub fn target_name(&self, index: usize) -> String {
        match self.target_names.get(index) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => index.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for MeshExtras {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// Attribute semantic -> accessor index
pub type AttributeMap = BTreeMap<String, usize>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Primitive {
    #[serde(default)]
    pub attributes: AttributeMap,
    pub indices: Option<usize>,
    pub material: Option<usize>,
    /// Rendering mode; 4 (TRIANGLES) when absent
    pub mode: Option<u32>,
    /// Morph targets (POSITION / NORMAL / TANGENT deltas)
    #[serde(default)]
    pub targets: Vec<AttributeMap>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub name: Option<String>,
    pub pbr_metallic_roughness: Option<PbrMetallicRoughness>,
    pub normal_texture: Option<TextureInfo>,
    pub occlusion_texture: Option<TextureInfo>,
    pub emissive_texture: Option<TextureInfo>,
    pub emissive_factor: Option<[f32; 3]>,
    /// "OPAQUE", "MASK" or "BLEND"
    pub alpha_mode: Option<String>,
    pub alpha_cutoff: Option<f32>,
    #[serde(default)]
    pub double_sided: bool,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbrMetallicRoughness {
    pub base_color_factor: Option<[f32; 4]>,
    pub base_color_texture: Option<TextureInfo>,
    pub metallic_factor: Option<f32>,
    pub roughness_factor: Option<f32>,
    pub metallic_roughness_texture: Option<TextureInfo>,
}

/// Texture reference shared by all material slots.
///
/// `scale` is only meaningful for normal textures and `strength` for
/// occlusion textures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureInfo {
    pub index: usize,
    #[serde(default)]
    pub tex_coord: u32,
    pub scale: Option<f32>,
    pub strength: Option<f32>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Texture {
    pub name: Option<String>,
    pub sampler: Option<usize>,
    pub source: Option<usize>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub mime_type: Option<String>,
    pub buffer_view: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sampler {
    pub mag_filter: Option<u32>,
    pub min_filter: Option<u32>,
    pub wrap_s: Option<u32>,
    pub wrap_t: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffer {
    pub name: Option<String>,
    pub uri: Option<String>,
    #[serde(default)]
    pub byte_length: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    pub buffer: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub byte_length: usize,
    pub byte_stride: Option<usize>,
    pub target: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    pub name: Option<String>,
    pub buffer_view: Option<usize>,
    #[serde(default)]
    pub byte_offset: usize,
    pub component_type: u32,
    #[serde(default)]
    pub normalized: bool,
    pub count: usize,
    /// "SCALAR", "VEC2", ..., "MAT4"
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default)]
    pub min: Vec<f64>,
    #[serde(default)]
    pub max: Vec<f64>,
    pub sparse: Option<Sparse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sparse {
    pub count: usize,
    pub indices: SparseIndices,
    pub values: SparseValues,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparseIndices {
    pub buffer_view: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub component_type: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparseValues {
    pub buffer_view: usize,
    #[serde(default)]
    pub byte_offset: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skin {
    pub name: Option<String>,
    pub inverse_bind_matrices: Option<usize>,
    #[serde(default)]
    pub joints: Vec<usize>,
    pub skeleton: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Animation {
    pub name: Option<String>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub samplers: Vec<AnimationSampler>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Channel {
    pub sampler: usize,
    pub target: ChannelTarget,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelTarget {
    pub node: Option<usize>,
    /// "translation", "rotation", "scale" or "weights"
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnimationSampler {
    pub input: usize,
    pub output: usize,
    /// "LINEAR" when absent
    pub interpolation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Camera {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub camera_type: String,
    pub perspective: Option<Perspective>,
    pub orthographic: Option<Orthographic>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Perspective {
    pub aspect_ratio: Option<f32>,
    pub yfov: f32,
    pub znear: f32,
    pub zfar: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Orthographic {
    pub xmag: f32,
    pub ymag: f32,
    pub znear: f32,
    pub zfar: f32,
}
