//! nether-gltf - glTF/GLB import inspector
//!
//! Runs the nether-gltf import pipeline on a file and prints what it
//! reconstructed: scene hierarchy, meshes, materials, skins and animation
//! clips, or sampled curve values at a given time.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use nether_gltf::{ImportSettings, ImportedScene, Importer, Workflow};

#[derive(Parser)]
#[command(name = "nether-gltf")]
#[command(about = "glTF 2.0 / GLB import inspector")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a file and print a summary of the scene
    Inspect {
        /// Input glTF/GLB file
        input: PathBuf,

        /// Import settings (TOML)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Use the cooperative import job instead of a blocking import
        #[arg(long = "async")]
        cooperative: bool,

        /// Also list every node with its path
        #[arg(short, long)]
        verbose: bool,
    },

    /// Evaluate an animation clip's curves at a time
    Sample {
        /// Input glTF/GLB file
        input: PathBuf,

        /// Time in seconds
        #[arg(short, long, default_value_t = 0.0)]
        time: f32,

        /// Animation index (default: first animation)
        #[arg(short, long)]
        animation: Option<usize>,

        /// Only print curves whose node path contains this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Import settings (TOML)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            input,
            settings,
            cooperative,
            verbose,
        } => {
            let importer = Importer::new(load_settings(settings.as_deref())?);
            let scene = if cooperative {
                import_cooperative(&importer, &input)?
            } else {
                importer
                    .import_file(&input)
                    .with_context(|| format!("Failed to import {}", input.display()))?
            };
            print_summary(&scene, verbose);
        }

        Commands::Sample {
            input,
            time,
            animation,
            filter,
            settings,
        } => {
            let importer = Importer::new(load_settings(settings.as_deref())?);
            let scene = importer
                .import_file(&input)
                .with_context(|| format!("Failed to import {}", input.display()))?;
            print_samples(&scene, animation.unwrap_or(0), time, filter.as_deref())?;
        }
    }

    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<ImportSettings> {
    match path {
        Some(path) => ImportSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(ImportSettings::default()),
    }
}

/// Drive an [`nether_gltf::ImportJob`] to completion on a single-threaded runtime
fn import_cooperative(importer: &Importer, input: &Path) -> Result<ImportedScene> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start async runtime")?;

    let job = importer
        .start_file(input)
        .with_context(|| format!("Failed to start import of {}", input.display()))?;
    let progress = job.progress();
    tracing::info!("Started import job with {} stages", progress.total);

    runtime
        .block_on(job.finish())
        .with_context(|| format!("Failed to import {}", input.display()))
}

fn print_summary(scene: &ImportedScene, verbose: bool) {
    println!("Container: {:?}", scene.container);
    if let Some(generator) = scene.generator() {
        println!("Generator: {}", generator);
    }

    println!("\nScenes: {}", scene.graph.scenes.len());
    for (i, root) in scene.graph.scenes.iter().enumerate() {
        let marker = if scene.graph.default_scene == Some(i) { " (default)" } else { "" };
        println!(
            "  [{}] {}{} - {} root nodes",
            i,
            root.name.as_deref().unwrap_or("(unnamed)"),
            marker,
            root.nodes.len()
        );
    }

    println!("\nNodes: {} ({} cameras)", scene.graph.nodes.len(), scene.graph.cameras.len());
    if verbose {
        for node in &scene.graph.nodes {
            let path = scene.graph.path_of(node.index).unwrap_or_default();
            let mut attachments = Vec::new();
            if let Some(mesh) = node.mesh {
                attachments.push(format!("mesh {}", mesh));
            }
            if let Some(skin) = node.skin {
                attachments.push(format!("skin {}", skin));
            }
            if let Some(camera) = node.camera {
                attachments.push(format!("camera {}", camera));
            }
            println!(
                "  [{}] {} \"{}\" {}",
                node.index,
                node.name,
                path,
                attachments.join(", ")
            );
        }
    }

    println!("\nMeshes: {}", scene.meshes.len());
    for (i, mesh) in scene.meshes.iter().enumerate() {
        println!(
            "  [{}] {} - {} vertices, {} indices ({:?}), {} submeshes, {} blend shapes",
            i,
            mesh.name,
            mesh.vertex_count(),
            mesh.indices.len(),
            mesh.index_format,
            mesh.submeshes.len(),
            mesh.blend_shapes.len()
        );
        for (s, (submesh, material)) in mesh.submeshes.iter().zip(&mesh.materials).enumerate() {
            println!(
                "      submesh {}: {:?}, {} indices, material \"{}\"",
                s, submesh.topology, submesh.index_count, material.name
            );
        }
    }

    println!("\nMaterials: {}", scene.materials.len());
    for (i, material) in scene.materials.iter().enumerate() {
        let workflow = match material.workflow {
            Workflow::MetallicRoughness { .. } => "metallic-roughness",
            Workflow::SpecularGlossiness { .. } => "specular-glossiness",
        };
        println!(
            "  [{}] {} - {}, {:?}{}{}",
            i,
            material.name,
            workflow,
            material.alpha_mode,
            if material.double_sided { ", double-sided" } else { "" },
            if material.unlit { ", unlit" } else { "" }
        );
    }

    let decoded = scene.images.iter().flatten().count();
    println!("\nImages: {} ({} decoded)", scene.images.len(), decoded);

    println!("\nSkins: {}", scene.skins.len());
    for skin in &scene.skins {
        println!("  [{}] {} - {} joints", skin.index, skin.name, skin.joint_count());
    }

    println!("\nAnimations: {}", scene.animations.len());
    for (i, clip) in scene.animations.iter().enumerate() {
        println!(
            "  [{}] {} - {:.3}s, {} curves",
            i,
            clip.name,
            clip.duration,
            clip.curves.len()
        );
    }
}

fn print_samples(scene: &ImportedScene, index: usize, time: f32, filter: Option<&str>) -> Result<()> {
    let Some(clip) = scene.animations.get(index) else {
        bail!(
            "Animation index {} out of range (file has {} animations)",
            index,
            scene.animations.len()
        );
    };

    println!("{} @ {:.3}s (duration {:.3}s)", clip.name, time, clip.duration);
    for (curve, value) in clip.sample(time) {
        if filter.is_some_and(|f| !curve.path.contains(f)) {
            continue;
        }
        let path = if curve.path.is_empty() { "<root>" } else { curve.path.as_str() };
        println!("  {:<32} {:<20} {:>10.4}", path, curve.attribute, value);
    }
    Ok(())
}
