//! Extension registry
//!
//! Every glTF object with an `extensions` member keeps the raw JSON for each
//! extension name. After the document is parsed, the registry turns each raw
//! object into a typed [`Extension`] using the factory registered under that
//! name. Unregistered extensions stay available as raw JSON.
//!
//! The registry is built explicitly before decoding starts:
//!
//! ```ignore
//! let mut registry = ExtensionRegistry::with_builtin();
//! registry.register("VENDOR_wind", decode_extension::<Wind>);
//! let importer = Importer::new(settings).with_registry(registry);
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use glam::Vec2;
use hashbrown::HashMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::document::TextureInfo;
use crate::material::Material;
use crate::mesh::SubMesh;

pub const KHR_DRACO_MESH_COMPRESSION: &str = "KHR_draco_mesh_compression";
pub const KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS: &str = "KHR_materials_pbrSpecularGlossiness";
pub const KHR_MATERIALS_UNLIT: &str = "KHR_materials_unlit";
pub const KHR_MATERIALS_EMISSIVE_STRENGTH: &str = "KHR_materials_emissive_strength";
pub const KHR_TEXTURE_TRANSFORM: &str = "KHR_texture_transform";

/// A typed extension payload
///
/// The contribution hooks let extension types the core does not know about
/// add data to the objects the pipeline builds.
pub trait Extension: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;

    /// Called once per material after the core fields are filled in
    fn contribute_material(&self, _material: &mut Material) {}

    /// Called once per submesh built from the owning primitive
    fn contribute_submesh(&self, _submesh: &mut SubMesh) {}

    /// Resolve extensions nested inside this payload, such as the
    /// texture-info extensions of a material extension's texture slots
    fn resolve_nested(&mut self, _registry: &ExtensionRegistry) {}
}

/// Builds a typed extension from its JSON subtree
pub type ExtensionFactory =
    fn(&serde_json::Value) -> Result<Arc<dyn Extension>, serde_json::Error>;

/// Factory for any extension type that deserializes straight from its JSON
pub fn decode_extension<T>(value: &serde_json::Value) -> Result<Arc<dyn Extension>, serde_json::Error>
where
    T: Extension + DeserializeOwned,
{
    Ok(Arc::new(T::deserialize(value)?))
}

/// Extension name -> factory lookup
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    factories: HashMap<String, ExtensionFactory>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &names)
            .finish()
    }
}

impl ExtensionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every extension the pipeline understands natively
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            KHR_DRACO_MESH_COMPRESSION,
            decode_extension::<DracoMeshCompression>,
        );
        registry.register(
            KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS,
            decode_extension::<SpecularGlossiness>,
        );
        registry.register(KHR_MATERIALS_UNLIT, decode_extension::<MaterialsUnlit>);
        registry.register(
            KHR_MATERIALS_EMISSIVE_STRENGTH,
            decode_extension::<EmissiveStrength>,
        );
        registry.register(KHR_TEXTURE_TRANSFORM, decode_extension::<TextureTransform>);
        registry
    }

    /// Register (or replace) the factory for an extension name
    pub fn register(&mut self, name: impl Into<String>, factory: ExtensionFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Decode every raw entry that has a registered factory
    pub fn resolve(&self, extensions: &mut Extensions) {
        for (name, value) in &extensions.raw {
            let Some(factory) = self.factories.get(name.as_str()) else {
                continue;
            };
            match factory(value) {
                Ok(mut extension) => {
                    // freshly decoded, so the Arc is not shared yet
                    if let Some(inner) = Arc::get_mut(&mut extension) {
                        inner.resolve_nested(self);
                    }
                    extensions.resolved.insert(name.clone(), extension);
                }
                Err(e) => {
                    tracing::warn!("Ignoring malformed extension '{}': {}", name, e);
                }
            }
        }
    }
}

/// Extension objects attached to one glTF object
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Extensions {
    raw: BTreeMap<String, serde_json::Value>,
    #[serde(skip)]
    resolved: HashMap<String, Arc<dyn Extension>>,
}

impl Extensions {
    /// First resolved extension of type `T`
    pub fn get<T: Extension>(&self) -> Option<&T> {
        self.resolved
            .values()
            .find_map(|ext| ext.as_any().downcast_ref::<T>())
    }

    /// Resolved extension by name
    pub fn by_name(&self, name: &str) -> Option<&dyn Extension> {
        self.resolved.get(name).map(|ext| ext.as_ref())
    }

    /// Raw JSON for an extension, resolved or not
    pub fn raw(&self, name: &str) -> Option<&serde_json::Value> {
        self.raw.get(name)
    }

    /// Names of every extension present on the object
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.raw.keys().map(String::as_str)
    }

    /// Resolved extensions in name order
    pub fn resolved(&self) -> impl Iterator<Item = &dyn Extension> {
        self.raw
            .keys()
            .filter_map(|name| self.resolved.get(name))
            .map(|ext| ext.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

// ============================================================================
// Built-in extensions
// ============================================================================

/// `KHR_draco_mesh_compression` on a primitive
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DracoMeshCompression {
    pub buffer_view: usize,
    /// Attribute semantic -> draco unique attribute id
    #[serde(default)]
    pub attributes: BTreeMap<String, u32>,
}

impl Extension for DracoMeshCompression {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn one() -> f32 {
    1.0
}

fn white() -> [f32; 4] {
    [1.0; 4]
}

/// `KHR_materials_pbrSpecularGlossiness`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecularGlossiness {
    #[serde(default = "white")]
    pub diffuse_factor: [f32; 4],
    pub diffuse_texture: Option<TextureInfo>,
    #[serde(default = "SpecularGlossiness::default_specular")]
    pub specular_factor: [f32; 3],
    #[serde(default = "one")]
    pub glossiness_factor: f32,
    pub specular_glossiness_texture: Option<TextureInfo>,
}

impl SpecularGlossiness {
    fn default_specular() -> [f32; 3] {
        [1.0; 3]
    }
}

impl Extension for SpecularGlossiness {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn resolve_nested(&mut self, registry: &ExtensionRegistry) {
        for info in [
            &mut self.diffuse_texture,
            &mut self.specular_glossiness_texture,
        ]
        .into_iter()
        .flatten()
        {
            registry.resolve(&mut info.extensions);
        }
    }
}

/// `KHR_materials_unlit`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaterialsUnlit {}

impl Extension for MaterialsUnlit {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn contribute_material(&self, material: &mut Material) {
        material.unlit = true;
    }
}

/// `KHR_materials_emissive_strength`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissiveStrength {
    #[serde(default = "one")]
    pub emissive_strength: f32,
}

impl Extension for EmissiveStrength {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn contribute_material(&self, material: &mut Material) {
        material.emissive_factor *= self.emissive_strength;
    }
}

/// `KHR_texture_transform` on a texture info.
///
/// Values are kept in glTF UV space (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureTransform {
    #[serde(default)]
    pub offset: [f32; 2],
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "TextureTransform::default_scale")]
    pub scale: [f32; 2],
    /// Overrides the texture info's `texCoord`
    pub tex_coord: Option<u32>,
}

impl TextureTransform {
    fn default_scale() -> [f32; 2] {
        [1.0, 1.0]
    }

    /// Apply the transform to a glTF-space UV
    pub fn apply(&self, uv: Vec2) -> Vec2 {
        let (sin, cos) = self.rotation.sin_cos();
        let scaled = uv * Vec2::from(self.scale);
        let rotated = Vec2::new(
            cos * scaled.x + sin * scaled.y,
            -sin * scaled.x + cos * scaled.y,
        );
        rotated + Vec2::from(self.offset)
    }
}

impl Extension for TextureTransform {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct VendorWind {
        strength: f32,
    }

    impl Extension for VendorWind {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn contribute_material(&self, material: &mut Material) {
            material
                .custom
                .insert("wind".to_string(), json!(self.strength));
        }
    }

    fn extensions_from(value: serde_json::Value) -> Extensions {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_builtin_resolution() {
        let registry = ExtensionRegistry::with_builtin();
        let mut ext = extensions_from(json!({
            "KHR_draco_mesh_compression": {
                "bufferView": 3,
                "attributes": {"POSITION": 0, "NORMAL": 1}
            },
            "EXT_unknown": {"foo": 1}
        }));
        registry.resolve(&mut ext);

        let draco = ext.get::<DracoMeshCompression>().unwrap();
        assert_eq!(draco.buffer_view, 3);
        assert_eq!(draco.attributes["NORMAL"], 1);
        assert!(ext.by_name("EXT_unknown").is_none());
        assert_eq!(ext.raw("EXT_unknown"), Some(&json!({"foo": 1})));
        assert_eq!(ext.names().count(), 2);
    }

    #[test]
    fn test_external_registration() {
        let mut registry = ExtensionRegistry::new();
        assert!(!registry.contains("VENDOR_wind"));
        registry.register("VENDOR_wind", decode_extension::<VendorWind>);
        assert!(registry.contains("VENDOR_wind"));

        let mut ext = extensions_from(json!({"VENDOR_wind": {"strength": 2.5}}));
        registry.resolve(&mut ext);

        let mut material = Material::fallback(&Default::default());
        for extension in ext.resolved() {
            extension.contribute_material(&mut material);
        }
        assert_eq!(material.custom["wind"], json!(2.5));
    }

    #[test]
    fn test_malformed_extension_is_skipped() {
        let registry = ExtensionRegistry::with_builtin();
        let mut ext = extensions_from(json!({
            "KHR_draco_mesh_compression": {"attributes": "not a map"}
        }));
        registry.resolve(&mut ext);
        assert!(ext.get::<DracoMeshCompression>().is_none());
        assert!(ext.raw(KHR_DRACO_MESH_COMPRESSION).is_some());
    }

    #[test]
    fn test_texture_transform_defaults_and_apply() {
        let t: TextureTransform = serde_json::from_value(json!({"offset": [0.5, 0.0]})).unwrap();
        assert_eq!(t.scale, [1.0, 1.0]);
        assert_eq!(t.tex_coord, None);
        assert_eq!(t.apply(Vec2::new(0.25, 0.25)), Vec2::new(0.75, 0.25));
    }
}
