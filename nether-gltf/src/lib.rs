//! nether-gltf: glTF 2.0 / GLB scene importer
//!
//! Reconstructs a renderer-agnostic scene from a `.gltf` or `.glb` asset:
//! merged mesh buffers with submeshes and blend shapes, materials with decoded
//! textures, skins with bind poses, the node hierarchy and keyframe curves.
//! All geometry is converted from glTF's right-handed convention to a
//! left-handed one by mirroring X (see [`convert`]).
//!
//! # Pipeline
//!
//! ```text
//! Buffer -> BufferView -> Accessor -> Image -> Texture -> Material
//!                                  -> Skin
//!                                  -> Mesh (after Material) -> Node -> Animation
//! ```
//!
//! Stages are tasks in a dependency graph ([`task::TaskGraph`]). Malformed
//! containers abort the import; everything else degrades with a logged
//! warning and a fallback value.
//!
//! # Usage
//!
//! ```no_run
//! use nether_gltf::{ImportSettings, Importer};
//! use std::path::Path;
//!
//! let importer = Importer::new(ImportSettings::default());
//! let scene = importer.import_file(Path::new("model.glb"))?;
//! for mesh in &scene.meshes {
//!     println!("{}: {} vertices", mesh.name, mesh.vertex_count());
//! }
//! # Ok::<(), nether_gltf::ImportError>(())
//! ```

pub mod accessor;
pub mod animation;
pub mod convert;
pub mod document;
pub mod draco;
pub mod error;
pub mod extensions;
pub mod glb;
pub mod images;
pub mod import;
pub mod material;
pub mod mesh;
pub mod node;
pub mod settings;
pub mod skin;
pub mod source;
pub mod task;

// Re-export the import entry points
pub use error::{ImportError, Result};
pub use import::{ContainerKind, ImportJob, ImportedScene, Importer};
pub use settings::{AnimationSettings, ImportSettings, InterpolationOverride, MaterialConfig, MeshSettings};
pub use task::{CancellationToken, Progress};

// Re-export scene types
pub use animation::{AnimationClip, AnimationCurve, Curve, Keyframe, TargetProperty};
pub use material::{AlphaMode, Material, Workflow};
pub use mesh::{MeshBuffers, SubMesh, Topology};
pub use node::{SceneGraph, SceneNode, Transform};
pub use skin::BindPoseSet;

// Re-export extension points
pub use draco::DracoDecoder;
pub use extensions::{Extension, ExtensionRegistry};
pub use images::{DecodedImage, ImageCodec};
