//! Import orchestration
//!
//! An import is a fixed task graph over one [`ImportContext`]:
//!
//! ```text
//! buffers -> buffer views -> accessors -> images -> textures -> materials
//!                                      -> skins                   |
//!                                      -> meshes <----------------+
//!                              {meshes, skins} -> nodes -> animations
//! ```
//!
//! [`Importer::import_file`] runs the graph on the calling thread.
//! [`Importer::start_file`] returns an [`ImportJob`] whose stages run on the
//! rayon pool and which is driven by polling or by awaiting
//! [`ImportJob::finish`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use crate::accessor::AccessorTable;
use crate::animation::{AnimationClip, AnimationDecoder};
use crate::document::Document;
use crate::draco::DracoDecoder;
use crate::error::{ImportError, Result};
use crate::extensions::ExtensionRegistry;
use crate::glb::parse_glb;
use crate::images::{decode_images, DecodedImage, DefaultImageCodec, ImageCodec};
use crate::material::{resolve_textures, Material, MaterialBuilder, ResolvedTexture};
use crate::mesh::{MeshAssembler, MeshBuffers};
use crate::node::{Hierarchy, SceneGraph};
use crate::settings::ImportSettings;
use crate::skin::{BindPoseSet, SkinResolver};
use crate::source::{slice_buffer_views, BufferViewData, ByteSource};
use crate::task::{CancellationToken, Progress, TaskGraph};

/// Default polling cadence of [`ImportJob::finish`]
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Container the document was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Glb,
    Json,
}

/// Result of a successful import
#[derive(Debug)]
pub struct ImportedScene {
    pub source: Option<PathBuf>,
    pub container: ContainerKind,
    pub document: Document,
    pub meshes: Vec<MeshBuffers>,
    pub materials: Vec<Arc<Material>>,
    /// Material for submeshes without a resolvable one
    pub fallback_material: Arc<Material>,
    pub images: Vec<Option<Arc<DecodedImage>>>,
    pub textures: Vec<ResolvedTexture>,
    pub skins: Vec<BindPoseSet>,
    pub graph: SceneGraph,
    pub animations: Vec<AnimationClip>,
}

impl ImportedScene {
    /// Mesh instantiated by a node
    pub fn node_mesh(&self, node: usize) -> Option<&MeshBuffers> {
        let mesh = self.graph.node(node)?.mesh?;
        self.meshes.get(mesh)
    }

    pub fn generator(&self) -> Option<&str> {
        self.document.generator()
    }
}

/// Write-once stage outputs shared by the import tasks
struct ImportContext {
    document: Document,
    source: ByteSource,
    settings: ImportSettings,
    image_codec: Arc<dyn ImageCodec>,
    draco: Option<Arc<dyn DracoDecoder>>,
    fallback_material: Arc<Material>,
    empty_accessors: AccessorTable,

    buffers: OnceLock<Vec<Option<Arc<[u8]>>>>,
    views: OnceLock<Vec<Option<BufferViewData>>>,
    accessors: OnceLock<AccessorTable>,
    images: OnceLock<Vec<Option<Arc<DecodedImage>>>>,
    textures: OnceLock<Vec<ResolvedTexture>>,
    materials: OnceLock<Vec<Arc<Material>>>,
    skins: OnceLock<Vec<BindPoseSet>>,
    /// Written by the mesh stage, then completed by its material listener
    meshes: Mutex<Vec<MeshBuffers>>,
    graph: OnceLock<SceneGraph>,
    animations: OnceLock<Vec<AnimationClip>>,
}

fn store<T>(slot: &OnceLock<T>, value: T, stage: &str) {
    if slot.set(value).is_err() {
        tracing::error!("Stage '{}' produced its output twice", stage);
    }
}

fn slice<T>(slot: &OnceLock<Vec<T>>) -> &[T] {
    slot.get().map(Vec::as_slice).unwrap_or(&[])
}

impl ImportContext {
    fn accessors(&self) -> &AccessorTable {
        self.accessors.get().unwrap_or(&self.empty_accessors)
    }

    fn run_buffers(&self) {
        let buffers = self.source.resolve_buffers(&self.document.buffers);
        store(&self.buffers, buffers, "buffers");
    }

    fn run_views(&self) {
        let views = slice_buffer_views(&self.document.buffer_views, slice(&self.buffers));
        store(&self.views, views, "buffer views");
    }

    fn run_accessors(&self) {
        let table = AccessorTable::resolve(&self.document.accessors, slice(&self.views));
        store(&self.accessors, table, "accessors");
    }

    fn run_images(&self) {
        let images = if self.settings.materials {
            decode_images(
                &self.document.images,
                slice(&self.views),
                &self.source,
                self.image_codec.as_ref(),
            )
        } else {
            tracing::debug!("Material import disabled, skipping images");
            Vec::new()
        };
        store(&self.images, images, "images");
    }

    fn run_textures(&self) {
        let textures = if self.settings.materials {
            resolve_textures(
                &self.document.textures,
                &self.document.samplers,
                slice(&self.images),
            )
        } else {
            Vec::new()
        };
        store(&self.textures, textures, "textures");
    }

    fn run_materials(&self) {
        let materials = if self.settings.materials {
            MaterialBuilder::new(&self.settings.material, slice(&self.textures))
                .build_all(&self.document.materials)
        } else {
            Vec::new()
        };
        store(&self.materials, materials, "materials");
    }

    fn run_skins(&self) {
        let hierarchy = Hierarchy::build(&self.document.nodes);
        let skins = SkinResolver::new(self.accessors(), &hierarchy).resolve_all(&self.document.skins);
        store(&self.skins, skins, "skins");
    }

    fn run_meshes(&self) {
        let meshes = MeshAssembler::new(
            self.accessors(),
            slice(&self.views),
            self.document.materials.len(),
            &self.settings.mesh,
        )
        .with_draco(self.draco.as_deref())
        .assemble_all(&self.document.meshes);
        *self.meshes.lock().unwrap_or_else(PoisonError::into_inner) = meshes;
    }

    /// Attach one resolved material per submesh
    fn attach_materials(&self) {
        let materials = slice(&self.materials);
        let mut meshes = self.meshes.lock().unwrap_or_else(PoisonError::into_inner);
        for mesh in meshes.iter_mut() {
            mesh.materials = mesh
                .submeshes
                .iter()
                .map(|submesh| {
                    submesh
                        .material
                        .and_then(|m| materials.get(m))
                        .cloned()
                        .unwrap_or_else(|| Arc::clone(&self.fallback_material))
                })
                .collect();
        }
    }

    fn run_nodes(&self) {
        let mesh_count = self
            .meshes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let graph = SceneGraph::build(&self.document, mesh_count, slice(&self.skins).len());
        store(&self.graph, graph, "nodes");
    }

    fn run_animations(&self) {
        let animations = match (self.settings.animation.import, self.graph.get()) {
            (true, Some(graph)) => AnimationDecoder::new(
                self.accessors(),
                graph,
                &self.document.meshes,
                &self.settings.animation,
            )
            .decode_all(&self.document.animations),
            _ => Vec::new(),
        };
        store(&self.animations, animations, "animations");
    }

    fn into_scene(self, source: Option<PathBuf>, container: ContainerKind) -> ImportedScene {
        ImportedScene {
            source,
            container,
            document: self.document,
            meshes: self
                .meshes
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
            materials: self.materials.into_inner().unwrap_or_default(),
            fallback_material: self.fallback_material,
            images: self.images.into_inner().unwrap_or_default(),
            textures: self.textures.into_inner().unwrap_or_default(),
            skins: self.skins.into_inner().unwrap_or_default(),
            graph: self.graph.into_inner().unwrap_or_default(),
            animations: self.animations.into_inner().unwrap_or_default(),
        }
    }
}

/// Build the fixed stage graph over a context
fn build_graph(context: ImportContext, cancel: CancellationToken) -> TaskGraph<ImportContext> {
    let mut graph = TaskGraph::new(Arc::new(context), cancel);

    let buffers = graph.add("buffers", &[], ImportContext::run_buffers);
    let views = graph.add("buffer views", &[buffers], ImportContext::run_views);
    let accessors = graph.add("accessors", &[views], ImportContext::run_accessors);
    let images = graph.add("images", &[accessors], ImportContext::run_images);
    let textures = graph.add("textures", &[images], ImportContext::run_textures);
    let materials = graph.add("materials", &[textures], ImportContext::run_materials);
    let skins = graph.add("skins", &[accessors], ImportContext::run_skins);
    let meshes = graph.add("meshes", &[accessors, materials], ImportContext::run_meshes);
    let nodes = graph.add("nodes", &[meshes, skins], ImportContext::run_nodes);
    graph.add("animations", &[nodes], ImportContext::run_animations);

    graph.on_complete(meshes, ImportContext::attach_materials);
    graph
}

/// Skip a UTF-8 BOM and leading whitespace
fn looks_like_json(data: &[u8]) -> bool {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    data.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

/// Configured importer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Importer {
    settings: ImportSettings,
    registry: Arc<ExtensionRegistry>,
    image_codec: Arc<dyn ImageCodec>,
    draco: Option<Arc<dyn DracoDecoder>>,
    tick_interval: Duration,
}

impl Default for Importer {
    fn default() -> Self {
        Self::new(ImportSettings::default())
    }
}

impl Importer {
    /// Importer with the built-in extensions and the default codecs
    pub fn new(settings: ImportSettings) -> Self {
        Self {
            settings,
            registry: Arc::new(ExtensionRegistry::with_builtin()),
            image_codec: Arc::new(DefaultImageCodec),
            draco: default_draco(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Replace the extension registry. Registration must happen before the
    /// first import that needs it.
    pub fn with_registry(mut self, registry: ExtensionRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_image_codec(mut self, codec: impl ImageCodec + 'static) -> Self {
        self.image_codec = Arc::new(codec);
        self
    }

    pub fn with_draco(mut self, decoder: impl DracoDecoder + 'static) -> Self {
        self.draco = Some(Arc::new(decoder));
        self
    }

    /// Polling cadence used by [`ImportJob::finish`]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Import a `.gltf` or `.glb` file on the calling thread
    pub fn import_file(&self, path: &Path) -> Result<ImportedScene> {
        let bytes = read_file(path)?;
        self.import_slice_from(&bytes, path.parent(), Some(path.to_path_buf()))
    }

    /// Import from memory. Relative URIs resolve against `base_dir`.
    pub fn import_slice(&self, data: &[u8], base_dir: Option<&Path>) -> Result<ImportedScene> {
        self.import_slice_from(data, base_dir, None)
    }

    fn import_slice_from(
        &self,
        data: &[u8],
        base_dir: Option<&Path>,
        source: Option<PathBuf>,
    ) -> Result<ImportedScene> {
        let (context, container) = self.prepare(data, base_dir)?;
        let mut graph = build_graph(context, CancellationToken::new());
        graph.run_sync().inspect_err(|e| tracing::error!("Import failed: {}", e))?;
        finish_graph(graph, source, container)
    }

    /// Start a cooperative import of a file
    pub fn start_file(&self, path: &Path) -> Result<ImportJob> {
        let bytes = read_file(path)?;
        self.start_slice_from(&bytes, path.parent(), Some(path.to_path_buf()))
    }

    /// Start a cooperative import from memory
    pub fn start_slice(&self, data: &[u8], base_dir: Option<&Path>) -> Result<ImportJob> {
        self.start_slice_from(data, base_dir, None)
    }

    fn start_slice_from(
        &self,
        data: &[u8],
        base_dir: Option<&Path>,
        source: Option<PathBuf>,
    ) -> Result<ImportJob> {
        let (context, container) = self.prepare(data, base_dir)?;
        Ok(ImportJob {
            graph: build_graph(context, CancellationToken::new()),
            source,
            container,
            tick_interval: self.tick_interval,
        })
    }

    /// Parse the container and document. Failures here are fatal.
    fn prepare(&self, data: &[u8], base_dir: Option<&Path>) -> Result<(ImportContext, ContainerKind)> {
        self.parse(data, base_dir)
            .inspect_err(|e| tracing::error!("Import failed: {}", e))
    }

    fn parse(&self, data: &[u8], base_dir: Option<&Path>) -> Result<(ImportContext, ContainerKind)> {
        let (document, bin, container) = if looks_like_json(data) {
            (Document::from_json(data, &self.registry)?, None, ContainerKind::Json)
        } else {
            let glb = parse_glb(data)?;
            let document = Document::from_json(glb.json, &self.registry)?;
            let bin: Option<Arc<[u8]>> = glb.bin.map(Arc::from);
            (document, bin, ContainerKind::Glb)
        };

        tracing::info!(
            "Parsed {:?} document: {} meshes, {} nodes, {} animations",
            container,
            document.meshes.len(),
            document.nodes.len(),
            document.animations.len()
        );

        let context = ImportContext {
            source: ByteSource::new(base_dir.map(Path::to_path_buf), bin),
            settings: self.settings.clone(),
            image_codec: Arc::clone(&self.image_codec),
            draco: self.draco.clone(),
            fallback_material: Arc::new(Material::fallback(&self.settings.material)),
            empty_accessors: AccessorTable::default(),
            document,
            buffers: OnceLock::new(),
            views: OnceLock::new(),
            accessors: OnceLock::new(),
            images: OnceLock::new(),
            textures: OnceLock::new(),
            materials: OnceLock::new(),
            skins: OnceLock::new(),
            meshes: Mutex::new(Vec::new()),
            graph: OnceLock::new(),
            animations: OnceLock::new(),
        };
        Ok((context, container))
    }
}

#[cfg(feature = "draco-native")]
fn default_draco() -> Option<Arc<dyn DracoDecoder>> {
    Some(Arc::new(crate::draco::NativeDracoDecoder))
}

#[cfg(not(feature = "draco-native"))]
fn default_draco() -> Option<Arc<dyn DracoDecoder>> {
    None
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| ImportError::io(path, e))
        .inspect_err(|e| tracing::error!("Import failed: {}", e))
}

fn finish_graph(
    graph: TaskGraph<ImportContext>,
    source: Option<PathBuf>,
    container: ContainerKind,
) -> Result<ImportedScene> {
    let context = graph
        .into_context()
        .map_err(|_| ImportError::Stalled("import context still shared".into()))?;
    let scene = context.into_scene(source, container);
    tracing::info!(
        "Imported {} meshes, {} materials, {} skins, {} animations",
        scene.meshes.len(),
        scene.materials.len(),
        scene.skins.len(),
        scene.animations.len()
    );
    Ok(scene)
}

/// A running cooperative import
pub struct ImportJob {
    graph: TaskGraph<ImportContext>,
    source: Option<PathBuf>,
    container: ContainerKind,
    tick_interval: Duration,
}

impl ImportJob {
    pub fn progress(&self) -> Progress {
        self.graph.progress()
    }

    pub fn is_finished(&self) -> bool {
        self.graph.is_finished()
    }

    /// Token that stops new stages from starting
    pub fn cancellation(&self) -> CancellationToken {
        self.graph.cancellation().clone()
    }

    pub fn cancel(&self) {
        self.graph.cancellation().cancel();
    }

    /// One scheduling step; never blocks. `Ok(true)` once every stage is done.
    pub fn tick(&mut self) -> Result<bool> {
        Ok(self.graph.tick()?.is_some())
    }

    /// Take the result of a finished job
    pub fn into_scene(self) -> Result<ImportedScene> {
        if !self.graph.is_finished() {
            return Err(ImportError::Stalled("import job is still running".into()));
        }
        finish_graph(self.graph, self.source, self.container)
    }

    /// Poll the job at the configured cadence until it completes
    pub async fn finish(mut self) -> Result<ImportedScene> {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.tick() {
                Ok(true) => return self.into_scene(),
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("Import failed: {}", e);
                    return Err(e);
                }
            }
        }
    }
}
