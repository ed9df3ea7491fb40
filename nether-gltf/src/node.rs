//! Scene hierarchy
//!
//! Parent links are established here, not during JSON decoding. A node that
//! appears in several `children` lists keeps its first parent, and edges that
//! would close a cycle are dropped, so the result is always a forest.

use glam::{Mat4, Quat, Vec3};

use crate::convert;
use crate::document::{self, Document};

/// Path separator for node-relative animation paths
pub const PATH_SEPARATOR: char = '/';

/// Local transform in the target convention
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Convert a node's matrix or TRS. A matrix takes precedence.
    pub fn from_node(node: &document::Node) -> Self {
        if let Some(m) = node.matrix {
            let m = convert::matrix(Mat4::from_cols_array(&m));
            let (scale, rotation, translation) = m.to_scale_rotation_translation();
            return Self {
                translation,
                rotation,
                scale,
            };
        }

        Self {
            translation: node
                .translation
                .map(|t| convert::vector(Vec3::from(t)))
                .unwrap_or(Vec3::ZERO),
            rotation: node
                .rotation
                .map(|r| convert::rotation(Quat::from_array(r)))
                .unwrap_or(Quat::IDENTITY),
            scale: node.scale.map(Vec3::from).unwrap_or(Vec3::ONE),
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Parent links, local and world matrices of every node
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    pub parents: Vec<Option<usize>>,
    pub children: Vec<Vec<usize>>,
    pub local: Vec<Transform>,
    /// Local-to-world matrices
    pub world: Vec<Mat4>,
}

impl Hierarchy {
    pub fn build(nodes: &[document::Node]) -> Self {
        let count = nodes.len();
        let mut parents: Vec<Option<usize>> = vec![None; count];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];

        for (parent, node) in nodes.iter().enumerate() {
            for &child in &node.children {
                if child >= count {
                    tracing::warn!("Node {} has missing child {}", parent, child);
                    continue;
                }
                if let Some(existing) = parents[child] {
                    tracing::warn!(
                        "Node {} is a child of both node {} and node {}, keeping the first",
                        child,
                        existing,
                        parent
                    );
                    continue;
                }
                // Walk up from the new parent; reaching the child means a cycle
                let mut cursor = Some(parent);
                let mut cycle = false;
                while let Some(n) = cursor {
                    if n == child {
                        cycle = true;
                        break;
                    }
                    cursor = parents[n];
                }
                if cycle {
                    tracing::warn!(
                        "Node {} -> {} would create a cycle, dropping the edge",
                        parent,
                        child
                    );
                    continue;
                }
                parents[child] = Some(parent);
                children[parent].push(child);
            }
        }

        let local: Vec<Transform> = nodes.iter().map(Transform::from_node).collect();

        // Breadth-first from the roots so parents are always computed first
        let mut world = vec![Mat4::IDENTITY; count];
        let mut queue: std::collections::VecDeque<usize> =
            (0..count).filter(|&i| parents[i].is_none()).collect();
        while let Some(i) = queue.pop_front() {
            let parent_world = parents[i].map(|p| world[p]).unwrap_or(Mat4::IDENTITY);
            world[i] = parent_world * local[i].to_matrix();
            queue.extend(children[i].iter().copied());
        }

        Self {
            parents,
            children,
            local,
            world,
        }
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Topmost ancestor of a node
    pub fn root_of(&self, mut index: usize) -> usize {
        while let Some(parent) = self.parents[index] {
            index = parent;
        }
        index
    }
}

/// Camera projection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        aspect_ratio: Option<f32>,
        yfov: f32,
        znear: f32,
        /// `None` for an infinite projection
        zfar: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub name: Option<String>,
    /// `None` when the camera type or its parameters are missing
    pub projection: Option<Projection>,
}

impl Camera {
    fn from_document(index: usize, camera: &document::Camera) -> Self {
        let projection = match (camera.camera_type.as_str(), &camera.perspective, &camera.orthographic) {
            ("perspective", Some(p), _) => Some(Projection::Perspective {
                aspect_ratio: p.aspect_ratio,
                yfov: p.yfov,
                znear: p.znear,
                zfar: p.zfar,
            }),
            ("orthographic", _, Some(o)) => Some(Projection::Orthographic {
                xmag: o.xmag,
                ymag: o.ymag,
                znear: o.znear,
                zfar: o.zfar,
            }),
            (other, _, _) => {
                tracing::warn!("Camera {} has unusable type '{}'", index, other);
                None
            }
        };
        Self {
            name: camera.name.clone(),
            projection,
        }
    }

    /// Left-handed projection matrix. `aspect` is used when the camera does
    /// not specify one.
    pub fn projection_matrix(&self, aspect: f32) -> Option<Mat4> {
        Some(match self.projection? {
            Projection::Perspective {
                aspect_ratio,
                yfov,
                znear,
                zfar,
            } => {
                let aspect = aspect_ratio.unwrap_or(aspect);
                match zfar {
                    Some(zfar) => Mat4::perspective_lh(yfov, aspect, znear, zfar),
                    None => Mat4::perspective_infinite_lh(yfov, aspect, znear),
                }
            }
            Projection::Orthographic {
                xmag,
                ymag,
                znear,
                zfar,
            } => Mat4::orthographic_lh(-xmag, xmag, -ymag, ymag, znear, zfar),
        })
    }
}

/// One node of the imported hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub index: usize,
    /// Never empty: unnamed nodes are called `node{index}`
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub local: Transform,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    pub camera: Option<usize>,
    /// Morph weights overriding the mesh defaults
    pub weights: Option<Vec<f32>>,
}

/// A scene: a named set of root nodes
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRoot {
    pub name: Option<String>,
    pub nodes: Vec<usize>,
}

/// The full node graph
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    pub nodes: Vec<SceneNode>,
    pub scenes: Vec<SceneRoot>,
    pub default_scene: Option<usize>,
    pub cameras: Vec<Camera>,
    world: Vec<Mat4>,
}

impl SceneGraph {
    /// Instantiate the hierarchy and validate mesh/skin/camera references
    /// against the number of meshes and skins that were produced.
    pub fn build(document: &Document, mesh_count: usize, skin_count: usize) -> Self {
        let hierarchy = Hierarchy::build(&document.nodes);
        let cameras: Vec<Camera> = document
            .cameras
            .iter()
            .enumerate()
            .map(|(i, c)| Camera::from_document(i, c))
            .collect();

        let checked = |kind: &str, node: usize, index: Option<usize>, len: usize| {
            index.filter(|&i| {
                let ok = i < len;
                if !ok {
                    tracing::warn!("Node {} references missing {} {}", node, kind, i);
                }
                ok
            })
        };

        let nodes = document
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| SceneNode {
                index,
                name: node
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| format!("node{}", index)),
                parent: hierarchy.parents[index],
                children: hierarchy.children[index].clone(),
                local: hierarchy.local[index],
                mesh: checked("mesh", index, node.mesh, mesh_count),
                skin: checked("skin", index, node.skin, skin_count),
                camera: checked("camera", index, node.camera, cameras.len()),
                weights: node.weights.clone(),
            })
            .collect();

        let node_count = document.nodes.len();
        let scenes = document
            .scenes
            .iter()
            .enumerate()
            .map(|(s, scene)| SceneRoot {
                name: scene.name.clone(),
                nodes: scene
                    .nodes
                    .iter()
                    .copied()
                    .filter(|&n| {
                        let ok = n < node_count;
                        if !ok {
                            tracing::warn!("Scene {} references missing node {}", s, n);
                        }
                        ok
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();

        let default_scene = document.scene.filter(|&s| {
            let ok = s < scenes.len();
            if !ok {
                tracing::warn!("Default scene {} does not exist", s);
            }
            ok
        });

        Self {
            nodes,
            scenes,
            default_scene,
            cameras,
            world: hierarchy.world,
        }
    }

    pub fn node(&self, index: usize) -> Option<&SceneNode> {
        self.nodes.get(index)
    }

    /// Nodes without a parent
    pub fn roots(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.iter().filter(|n| n.parent.is_none())
    }

    /// Local-to-world matrix
    pub fn world_matrix(&self, index: usize) -> Option<Mat4> {
        self.world.get(index).copied()
    }

    /// Path from the root (exclusive) down to the node, e.g. `Hips/Spine`.
    /// Root nodes have an empty path.
    pub fn path_of(&self, index: usize) -> Option<String> {
        let mut names = Vec::new();
        let mut cursor = self.nodes.get(index)?;
        while let Some(parent) = cursor.parent {
            names.push(cursor.name.as_str());
            cursor = &self.nodes[parent];
        }
        names.reverse();
        Some(names.join(&PATH_SEPARATOR.to_string()))
    }

    /// Find a node by its path
    pub fn find_by_path(&self, path: &str) -> Option<&SceneNode> {
        self.nodes
            .iter()
            .find(|n| self.path_of(n.index).as_deref() == Some(path))
    }
}
