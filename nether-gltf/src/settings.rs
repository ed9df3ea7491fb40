//! Import settings (TOML)
//!
//! ```toml
//! materials = true
//!
//! [mesh]
//! generate_normals = true
//! generate_tangents = true
//!
//! [animation]
//! frame_rate = 30.0
//! interpolation = "linear"
//! compress_blend_shape_keyframes = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};

/// Top-level import configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Import materials and decode their images
    pub materials: bool,
    pub mesh: MeshSettings,
    pub animation: AnimationSettings,
    pub material: MaterialConfig,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            materials: true,
            mesh: MeshSettings::default(),
            animation: AnimationSettings::default(),
            material: MaterialConfig::default(),
        }
    }
}

impl ImportSettings {
    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ImportError::io(path, e))?;
        Self::from_toml_str(&text)
    }
}

/// Mesh assembly options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    /// Generate face-weighted normals when no primitive supplies them
    pub generate_normals: bool,
    /// Generate tangents when no primitive supplies them (needs normals + UV0)
    pub generate_tangents: bool,
    /// Store per-submesh bounds in addition to the mesh bounds
    pub submesh_bounds: bool,
    /// Import morph targets as blend shapes
    pub blend_shapes: bool,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            generate_normals: true,
            generate_tangents: true,
            submesh_bounds: false,
            blend_shapes: true,
        }
    }
}

/// Interpolation override applied to every animation sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationOverride {
    /// Use the sampler's own interpolation
    #[default]
    FromFile,
    Step,
    Linear,
}

/// Animation decoding options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSettings {
    /// Decode animations at all
    pub import: bool,
    /// Mark clips as looping
    pub looping: bool,
    /// Nominal clip frame rate (metadata only, keys are never resampled)
    pub frame_rate: f32,
    pub interpolation: InterpolationOverride,
    /// Drop morph-weight keys that do not change the sampled curve
    pub compress_blend_shape_keyframes: bool,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            import: true,
            looping: false,
            frame_rate: 24.0,
            interpolation: InterpolationOverride::FromFile,
            compress_blend_shape_keyframes: false,
        }
    }
}

/// Material defaults, owned by the import instead of living in statics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    /// Name given to the material used when none is assigned or resolvable
    pub fallback_name: String,
    /// Base colour of the fallback material (linear RGBA)
    pub fallback_base_color: [f32; 4],
    /// Alpha cutoff used when a MASK material omits `alphaCutoff`
    pub default_alpha_cutoff: f32,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            fallback_name: "Default".to_string(),
            fallback_base_color: [1.0, 1.0, 1.0, 1.0],
            default_alpha_cutoff: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let settings = ImportSettings::from_toml_str("").unwrap();
        assert_eq!(settings, ImportSettings::default());
    }

    #[test]
    fn test_partial_toml() {
        let settings = ImportSettings::from_toml_str(
            r#"
            materials = false

            [mesh]
            generate_tangents = false

            [animation]
            interpolation = "step"
            compress_blend_shape_keyframes = true
            "#,
        )
        .unwrap();

        assert!(!settings.materials);
        assert!(settings.mesh.generate_normals);
        assert!(!settings.mesh.generate_tangents);
        assert_eq!(settings.animation.interpolation, InterpolationOverride::Step);
        assert!(settings.animation.compress_blend_shape_keyframes);
        assert_eq!(settings.material.default_alpha_cutoff, 0.5);
    }

    #[test]
    fn test_invalid_toml() {
        let result = ImportSettings::from_toml_str("materials = \"yes\"");
        assert!(matches!(result, Err(ImportError::Settings(_))));
    }
}
