//! Skin bind poses

use glam::Mat4;

use crate::accessor::AccessorTable;
use crate::convert;
use crate::document;
use crate::node::Hierarchy;

/// Joints of one skin with their inverse bind matrices.
///
/// Slots keep the order of `skin.joints` so `JOINTS_n` palette indices stay
/// valid. A slot whose node is missing holds `None` and an identity pose.
#[derive(Debug, Clone, PartialEq)]
pub struct BindPoseSet {
    pub index: usize,
    pub name: String,
    /// Node index per palette slot
    pub joints: Vec<Option<usize>>,
    /// Inverse bind matrices in the target convention, one per slot
    pub bind_poses: Vec<Mat4>,
    pub skeleton: Option<usize>,
}

impl BindPoseSet {
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Node and bind pose of a palette slot
    pub fn slot(&self, slot: usize) -> Option<(usize, Mat4)> {
        Some((self.joints.get(slot).copied().flatten()?, *self.bind_poses.get(slot)?))
    }
}

/// Resolves `skins[]` against decoded accessors and the node hierarchy
pub struct SkinResolver<'a> {
    accessors: &'a AccessorTable,
    hierarchy: &'a Hierarchy,
}

impl<'a> SkinResolver<'a> {
    pub fn new(accessors: &'a AccessorTable, hierarchy: &'a Hierarchy) -> Self {
        Self {
            accessors,
            hierarchy,
        }
    }

    pub fn resolve_all(&self, skins: &[document::Skin]) -> Vec<BindPoseSet> {
        skins
            .iter()
            .enumerate()
            .map(|(i, skin)| self.resolve(i, skin))
            .collect()
    }

    pub fn resolve(&self, index: usize, skin: &document::Skin) -> BindPoseSet {
        let node_count = self.hierarchy.len();
        let joints: Vec<Option<usize>> = skin
            .joints
            .iter()
            .enumerate()
            .map(|(slot, &j)| {
                if j < node_count {
                    Some(j)
                } else {
                    tracing::warn!(
                        "Skin {} joint slot {} references missing node {}",
                        index,
                        slot,
                        j
                    );
                    None
                }
            })
            .collect();

        let skeleton = skin.skeleton.filter(|&s| s < node_count);

        let ibm = skin
            .inverse_bind_matrices
            .and_then(|a| self.accessors.get(a));

        let bind_poses = match ibm {
            Some(accessor) => {
                // IBM i belongs to slot i whether or not its node exists
                let matrices = accessor.read_mat4();
                if matrices.len() != joints.len() {
                    tracing::warn!(
                        "Skin {} has {} joints but {} inverse bind matrices, padding with identity",
                        index,
                        joints.len(),
                        matrices.len()
                    );
                }
                joints
                    .iter()
                    .enumerate()
                    .map(|(slot, joint)| match (joint, matrices.get(slot)) {
                        (Some(_), Some(&m)) => convert::matrix(m),
                        _ => Mat4::IDENTITY,
                    })
                    .collect()
            }
            None => joints
                .iter()
                .map(|joint| match joint {
                    Some(j) => self.rest_pose(*j, skeleton),
                    None => Mat4::IDENTITY,
                })
                .collect(),
        };

        BindPoseSet {
            index,
            name: skin
                .name
                .clone()
                .unwrap_or_else(|| format!("skin{}", index)),
            joints,
            bind_poses,
            skeleton,
        }
    }

    /// World-to-joint times root-to-world at the current pose
    fn rest_pose(&self, joint: usize, skeleton: Option<usize>) -> Mat4 {
        let root = skeleton.unwrap_or_else(|| self.hierarchy.root_of(joint));
        self.hierarchy.world[joint].inverse() * self.hierarchy.world[root]
    }
}
