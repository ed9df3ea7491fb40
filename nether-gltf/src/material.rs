//! Materials and texture bindings
//!
//! Textures are resolved once (image + sampler) and shared by every material
//! that references them. Missing textures or images leave the slot untextured;
//! a missing material falls back to the configured default material.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Vec3, Vec4};

use crate::document::{self, TextureInfo};
use crate::extensions::{SpecularGlossiness, TextureTransform};
use crate::images::DecodedImage;
use crate::settings::MaterialConfig;

/// Texture wrap mode (GL enum values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

impl WrapMode {
    fn from_code(code: Option<u32>) -> Self {
        match code {
            Some(33071) => Self::ClampToEdge,
            Some(33648) => Self::MirroredRepeat,
            _ => Self::Repeat,
        }
    }
}

/// Filter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

impl FilterMode {
    fn from_code(code: Option<u32>) -> Self {
        match code {
            // NEAREST, NEAREST_MIPMAP_NEAREST, NEAREST_MIPMAP_LINEAR
            Some(9728) | Some(9984) | Some(9986) => Self::Nearest,
            _ => Self::Linear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureSampler {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl From<&document::Sampler> for TextureSampler {
    fn from(sampler: &document::Sampler) -> Self {
        Self {
            mag_filter: FilterMode::from_code(sampler.mag_filter),
            min_filter: FilterMode::from_code(sampler.min_filter),
            wrap_s: WrapMode::from_code(sampler.wrap_s),
            wrap_t: WrapMode::from_code(sampler.wrap_t),
        }
    }
}

/// A texture with its image and sampler looked up
#[derive(Debug, Clone)]
pub struct ResolvedTexture {
    pub name: Option<String>,
    pub image_index: Option<usize>,
    /// `None` when the image failed to load
    pub image: Option<Arc<DecodedImage>>,
    pub sampler: TextureSampler,
}

/// Resolve every texture's image and sampler
pub fn resolve_textures(
    textures: &[document::Texture],
    samplers: &[document::Sampler],
    images: &[Option<Arc<DecodedImage>>],
) -> Vec<ResolvedTexture> {
    textures
        .iter()
        .enumerate()
        .map(|(index, texture)| {
            let sampler = match texture.sampler {
                Some(s) => match samplers.get(s) {
                    Some(sampler) => TextureSampler::from(sampler),
                    None => {
                        tracing::warn!("Texture {} references missing sampler {}", index, s);
                        TextureSampler::default()
                    }
                },
                None => TextureSampler::default(),
            };

            let image = texture.source.and_then(|source| match images.get(source) {
                Some(image) => image.clone(),
                None => {
                    tracing::warn!("Texture {} references missing image {}", index, source);
                    None
                }
            });

            ResolvedTexture {
                name: texture.name.clone(),
                image_index: texture.source,
                image,
                sampler,
            }
        })
        .collect()
}

/// A material texture slot
#[derive(Debug, Clone)]
pub struct TextureBinding {
    pub texture_index: usize,
    pub image_index: Option<usize>,
    pub image: Arc<DecodedImage>,
    /// UV set used for lookup (after any texture transform override)
    pub tex_coord: u32,
    pub sampler: TextureSampler,
    pub transform: Option<TextureTransform>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

/// Shading workflow and its base-colour inputs
#[derive(Debug, Clone)]
pub enum Workflow {
    MetallicRoughness {
        base_color_factor: Vec4,
        base_color_texture: Option<TextureBinding>,
        metallic_factor: f32,
        roughness_factor: f32,
        metallic_roughness_texture: Option<TextureBinding>,
    },
    SpecularGlossiness {
        diffuse_factor: Vec4,
        diffuse_texture: Option<TextureBinding>,
        specular_factor: Vec3,
        glossiness_factor: f32,
        specular_glossiness_texture: Option<TextureBinding>,
    },
}

/// Renderer-neutral material
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub workflow: Workflow,
    pub normal_texture: Option<TextureBinding>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<TextureBinding>,
    pub occlusion_strength: f32,
    pub emissive_texture: Option<TextureBinding>,
    pub emissive_factor: Vec3,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub unlit: bool,
    /// Data contributed by extensions outside the built-in set
    pub custom: BTreeMap<String, serde_json::Value>,
}

impl Material {
    /// Material used for submeshes without a (resolvable) material
    pub fn fallback(config: &MaterialConfig) -> Self {
        Self {
            name: config.fallback_name.clone(),
            workflow: Workflow::MetallicRoughness {
                base_color_factor: Vec4::from(config.fallback_base_color),
                base_color_texture: None,
                metallic_factor: 1.0,
                roughness_factor: 1.0,
                metallic_roughness_texture: None,
            },
            normal_texture: None,
            normal_scale: 1.0,
            occlusion_texture: None,
            occlusion_strength: 1.0,
            emissive_texture: None,
            emissive_factor: Vec3::ZERO,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: config.default_alpha_cutoff,
            double_sided: false,
            unlit: false,
            custom: BTreeMap::new(),
        }
    }

    /// Base (or diffuse) colour factor
    pub fn base_color(&self) -> Vec4 {
        match &self.workflow {
            Workflow::MetallicRoughness {
                base_color_factor, ..
            } => *base_color_factor,
            Workflow::SpecularGlossiness { diffuse_factor, .. } => *diffuse_factor,
        }
    }

    /// Base (or diffuse) colour texture
    pub fn base_color_texture(&self) -> Option<&TextureBinding> {
        match &self.workflow {
            Workflow::MetallicRoughness {
                base_color_texture, ..
            } => base_color_texture.as_ref(),
            Workflow::SpecularGlossiness {
                diffuse_texture, ..
            } => diffuse_texture.as_ref(),
        }
    }
}

/// Builds [`Material`]s from document materials
#[derive(Debug, Clone, Copy)]
pub struct MaterialBuilder<'a> {
    config: &'a MaterialConfig,
    textures: &'a [ResolvedTexture],
}

impl<'a> MaterialBuilder<'a> {
    pub fn new(config: &'a MaterialConfig, textures: &'a [ResolvedTexture]) -> Self {
        Self { config, textures }
    }

    fn bind(&self, material: usize, slot: &str, info: Option<&TextureInfo>) -> Option<TextureBinding> {
        let info = info?;
        let Some(texture) = self.textures.get(info.index) else {
            tracing::warn!(
                "Material {} {} references missing texture {}",
                material,
                slot,
                info.index
            );
            return None;
        };
        let Some(image) = texture.image.clone() else {
            tracing::warn!(
                "Material {} {}: texture {} has no decoded image, leaving slot untextured",
                material,
                slot,
                info.index
            );
            return None;
        };

        let transform = info.extensions.get::<TextureTransform>().copied();
        let tex_coord = transform
            .and_then(|t| t.tex_coord)
            .unwrap_or(info.tex_coord);

        Some(TextureBinding {
            texture_index: info.index,
            image_index: texture.image_index,
            image,
            tex_coord,
            sampler: texture.sampler,
            transform,
        })
    }

    /// Build one material, then let its extensions contribute
    pub fn build(&self, index: usize, source: &document::Material) -> Material {
        let workflow = match source.extensions.get::<SpecularGlossiness>() {
            Some(sg) => Workflow::SpecularGlossiness {
                diffuse_factor: Vec4::from(sg.diffuse_factor),
                diffuse_texture: self.bind(index, "diffuse", sg.diffuse_texture.as_ref()),
                specular_factor: Vec3::from(sg.specular_factor),
                glossiness_factor: sg.glossiness_factor,
                specular_glossiness_texture: self.bind(
                    index,
                    "specularGlossiness",
                    sg.specular_glossiness_texture.as_ref(),
                ),
            },
            None => {
                let pbr = source.pbr_metallic_roughness.clone().unwrap_or_default();
                Workflow::MetallicRoughness {
                    base_color_factor: Vec4::from(pbr.base_color_factor.unwrap_or([1.0; 4])),
                    base_color_texture: self.bind(index, "baseColor", pbr.base_color_texture.as_ref()),
                    metallic_factor: pbr.metallic_factor.unwrap_or(1.0),
                    roughness_factor: pbr.roughness_factor.unwrap_or(1.0),
                    metallic_roughness_texture: self.bind(
                        index,
                        "metallicRoughness",
                        pbr.metallic_roughness_texture.as_ref(),
                    ),
                }
            }
        };

        let alpha_mode = match source.alpha_mode.as_deref() {
            None | Some("OPAQUE") => AlphaMode::Opaque,
            Some("MASK") => AlphaMode::Mask,
            Some("BLEND") => AlphaMode::Blend,
            Some(other) => {
                tracing::warn!("Material {} has unknown alphaMode '{}'", index, other);
                AlphaMode::Opaque
            }
        };

        let mut material = Material {
            name: source
                .name
                .clone()
                .unwrap_or_else(|| format!("material{}", index)),
            workflow,
            normal_texture: self.bind(index, "normal", source.normal_texture.as_ref()),
            normal_scale: source
                .normal_texture
                .as_ref()
                .and_then(|t| t.scale)
                .unwrap_or(1.0),
            occlusion_texture: self.bind(index, "occlusion", source.occlusion_texture.as_ref()),
            occlusion_strength: source
                .occlusion_texture
                .as_ref()
                .and_then(|t| t.strength)
                .unwrap_or(1.0),
            emissive_texture: self.bind(index, "emissive", source.emissive_texture.as_ref()),
            emissive_factor: Vec3::from(source.emissive_factor.unwrap_or([0.0; 3])),
            alpha_mode,
            alpha_cutoff: source.alpha_cutoff.unwrap_or(self.config.default_alpha_cutoff),
            double_sided: source.double_sided,
            unlit: false,
            custom: BTreeMap::new(),
        };

        for extension in source.extensions.resolved() {
            extension.contribute_material(&mut material);
        }

        material
    }

    pub fn build_all(&self, materials: &[document::Material]) -> Vec<Arc<Material>> {
        materials
            .iter()
            .enumerate()
            .map(|(index, material)| Arc::new(self.build(index, material)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::ExtensionRegistry;

    fn image() -> Arc<DecodedImage> {
        Arc::new(DecodedImage {
            name: None,
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        })
    }

    fn parse_materials(json: &str) -> document::Document {
        document::Document::from_json(json.as_bytes(), &ExtensionRegistry::with_builtin()).unwrap()
    }

    #[test]
    fn test_fallback_uses_config() {
        let config = MaterialConfig {
            fallback_name: "Missing".into(),
            fallback_base_color: [1.0, 0.0, 1.0, 1.0],
            default_alpha_cutoff: 0.25,
        };
        let material = Material::fallback(&config);
        assert_eq!(material.name, "Missing");
        assert_eq!(material.base_color(), Vec4::new(1.0, 0.0, 1.0, 1.0));
        assert_eq!(material.alpha_cutoff, 0.25);
    }

    #[test]
    fn test_metallic_roughness_with_textures() {
        let doc = parse_materials(
            r#"{
                "asset": {"version": "2.0"},
                "materials": [{
                    "name": "Body",
                    "pbrMetallicRoughness": {
                        "baseColorFactor": [0.5, 0.5, 0.5, 1.0],
                        "baseColorTexture": {
                            "index": 0,
                            "extensions": {"KHR_texture_transform": {"scale": [2.0, 2.0], "texCoord": 1}}
                        },
                        "metallicFactor": 0.0
                    },
                    "normalTexture": {"index": 1, "scale": 0.5},
                    "emissiveTexture": {"index": 5},
                    "emissiveFactor": [1.0, 0.5, 0.0],
                    "alphaMode": "MASK",
                    "doubleSided": true,
                    "extensions": {"KHR_materials_emissive_strength": {"emissiveStrength": 4.0}}
                }],
                "samplers": [{"wrapS": 33071, "magFilter": 9728}],
                "textures": [{"source": 0, "sampler": 0}, {"source": 1}]
            }"#,
        );
        let images = vec![Some(image()), None];
        let textures = resolve_textures(&doc.textures, &doc.samplers, &images);
        let config = MaterialConfig::default();
        let material = MaterialBuilder::new(&config, &textures).build(0, &doc.materials[0]);

        assert_eq!(material.name, "Body");
        assert_eq!(material.alpha_mode, AlphaMode::Mask);
        assert_eq!(material.alpha_cutoff, 0.5);
        assert!(material.double_sided);
        assert_eq!(material.emissive_factor, Vec3::new(4.0, 2.0, 0.0));

        let base = material.base_color_texture().unwrap();
        assert_eq!(base.tex_coord, 1);
        assert_eq!(base.sampler.wrap_s, WrapMode::ClampToEdge);
        assert_eq!(base.sampler.wrap_t, WrapMode::Repeat);
        assert_eq!(base.sampler.mag_filter, FilterMode::Nearest);
        assert!(base.transform.is_some());

        // Image 1 failed to decode; texture 5 does not exist
        assert!(material.normal_texture.is_none());
        assert_eq!(material.normal_scale, 0.5);
        assert!(material.emissive_texture.is_none());
    }

    #[test]
    fn test_specular_glossiness_and_unlit() {
        let doc = parse_materials(
            r#"{
                "asset": {"version": "2.0"},
                "materials": [{
                    "extensions": {
                        "KHR_materials_pbrSpecularGlossiness": {
                            "diffuseFactor": [0.2, 0.4, 0.6, 1.0],
                            "glossinessFactor": 0.3
                        },
                        "KHR_materials_unlit": {}
                    }
                }]
            }"#,
        );
        let config = MaterialConfig::default();
        let materials = MaterialBuilder::new(&config, &[]).build_all(&doc.materials);
        let material = &materials[0];

        assert_eq!(material.name, "material0");
        assert!(material.unlit);
        assert_eq!(material.base_color(), Vec4::new(0.2, 0.4, 0.6, 1.0));
        assert!(matches!(
            material.workflow,
            Workflow::SpecularGlossiness { glossiness_factor, specular_factor, .. }
                if glossiness_factor == 0.3 && specular_factor == Vec3::ONE
        ));
    }

    #[test]
    fn test_texture_transform_applies_to_both_workflows() {
        let transform = r#"{"KHR_texture_transform": {"offset": [0.5, 0.0], "texCoord": 1}}"#;
        let doc = parse_materials(&format!(
            r#"{{
                "asset": {{"version": "2.0"}},
                "materials": [
                    {{"pbrMetallicRoughness": {{"baseColorTexture": {{"index": 0, "extensions": {t}}}}}}},
                    {{"extensions": {{"KHR_materials_pbrSpecularGlossiness": {{
                        "diffuseTexture": {{"index": 0, "extensions": {t}}},
                        "specularGlossinessTexture": {{"index": 0, "texCoord": 2}}
                    }}}}}}
                ],
                "textures": [{{"source": 0}}]
            }}"#,
            t = transform
        ));
        let images = vec![Some(image())];
        let textures = resolve_textures(&doc.textures, &doc.samplers, &images);
        let config = MaterialConfig::default();
        let materials = MaterialBuilder::new(&config, &textures).build_all(&doc.materials);

        for material in &materials {
            let base = material.base_color_texture().unwrap();
            assert_eq!(base.tex_coord, 1);
            assert_eq!(base.transform.unwrap().offset, [0.5, 0.0]);
        }
        let Workflow::SpecularGlossiness {
            specular_glossiness_texture: Some(spec),
            ..
        } = &materials[1].workflow
        else {
            panic!("expected a bound specular-glossiness texture");
        };
        assert_eq!(spec.tex_coord, 2);
        assert!(spec.transform.is_none());
    }
}
