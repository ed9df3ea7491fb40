//! Animation channel decoding

use glam::{Quat, Vec3};

use super::curve::{Curve, Keyframe};
use crate::accessor::{AccessorData, AccessorTable};
use crate::convert;
use crate::document;
use crate::node::SceneGraph;
use crate::settings::{AnimationSettings, InterpolationOverride};

/// Tolerance used when dropping unchanged morph weight keys
const COMPRESS_EPSILON: f32 = 1e-6;

/// Animated node property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetProperty {
    Translation,
    Rotation,
    Scale,
    Weights,
}

impl TargetProperty {
    pub fn parse(path: &str) -> Option<Self> {
        Some(match path {
            "translation" => Self::Translation,
            "rotation" => Self::Rotation,
            "scale" => Self::Scale,
            "weights" => Self::Weights,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Translation => "translation",
            Self::Rotation => "rotation",
            Self::Scale => "scale",
            Self::Weights => "weights",
        }
    }
}

/// Sampler interpolation after applying the settings override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    CubicSpline,
}

impl Interpolation {
    fn parse(name: Option<&str>, label: &str) -> Self {
        match name.unwrap_or("LINEAR") {
            "STEP" => Self::Step,
            "LINEAR" => Self::Linear,
            "CUBICSPLINE" => Self::CubicSpline,
            other => {
                tracing::warn!("{} has unknown interpolation '{}', using LINEAR", label, other);
                Self::Linear
            }
        }
    }
}

/// One scalar curve of a node property
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationCurve {
    /// Node path relative to its root, see [`SceneGraph::path_of`]
    pub path: String,
    pub node: usize,
    pub property: TargetProperty,
    /// Vector component, or blend shape index for weights
    pub component: usize,
    /// Display name such as `translation.x` or `weights.Smile`
    pub attribute: String,
    pub interpolation: Interpolation,
    pub curve: Curve,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub curves: Vec<AnimationCurve>,
    /// Time of the last key over all curves
    pub duration: f32,
    pub frame_rate: f32,
    pub looping: bool,
}

impl AnimationClip {
    pub fn find(&self, path: &str, attribute: &str) -> Option<&AnimationCurve> {
        self.curves
            .iter()
            .find(|c| c.path == path && c.attribute == attribute)
    }

    /// Evaluate every curve at `time`
    pub fn sample(&self, time: f32) -> impl Iterator<Item = (&AnimationCurve, f32)> {
        self.curves.iter().map(move |c| (c, c.curve.sample(time)))
    }
}

/// Keyed values of one channel: the value plus optional spline tangents
struct ChannelKeys<T> {
    times: Vec<f32>,
    values: Vec<T>,
    tangents: Option<Vec<(T, T)>>,
}

/// Split sampler output into values and (for cubic splines) tangents
fn split_output<T: Copy>(
    times: Vec<f32>,
    output: Vec<T>,
    interpolation: Interpolation,
    elements_per_key: usize,
    label: &str,
) -> ChannelKeys<T> {
    let triplet = interpolation == Interpolation::CubicSpline;
    let stride = if triplet { 3 } else { 1 } * elements_per_key;
    let available = if stride == 0 { 0 } else { output.len() / stride };
    let count = times.len().min(available);
    if times.len() != available {
        tracing::warn!(
            "{} has {} key times but output for {} keys, using {}",
            label,
            times.len(),
            available,
            count
        );
    }

    let mut values = Vec::with_capacity(count * elements_per_key);
    let mut tangents = triplet.then(|| Vec::with_capacity(count * elements_per_key));
    for key in 0..count {
        let base = key * stride;
        for e in 0..elements_per_key {
            if let Some(tangents) = tangents.as_mut() {
                // glTF cubic layout: all in-tangents, then values, then out-tangents
                let a_in = output[base + e];
                let value = output[base + elements_per_key + e];
                let b_out = output[base + 2 * elements_per_key + e];
                values.push(value);
                tangents.push((a_in, b_out));
            } else {
                values.push(output[base + e]);
            }
        }
    }

    let mut times = times;
    times.truncate(count);
    ChannelKeys {
        times,
        values,
        tangents,
    }
}

/// Decodes `animations[]` into per-property scalar curves.
///
/// Requires the finished [`SceneGraph`] since curve paths are built from the
/// resolved node names and parent links.
pub struct AnimationDecoder<'a> {
    accessors: &'a AccessorTable,
    graph: &'a SceneGraph,
    meshes: &'a [document::Mesh],
    settings: &'a AnimationSettings,
}

impl<'a> AnimationDecoder<'a> {
    pub fn new(
        accessors: &'a AccessorTable,
        graph: &'a SceneGraph,
        meshes: &'a [document::Mesh],
        settings: &'a AnimationSettings,
    ) -> Self {
        Self {
            accessors,
            graph,
            meshes,
            settings,
        }
    }

    pub fn decode_all(&self, animations: &[document::Animation]) -> Vec<AnimationClip> {
        animations
            .iter()
            .enumerate()
            .map(|(i, a)| self.decode(i, a))
            .collect()
    }

    pub fn decode(&self, index: usize, animation: &document::Animation) -> AnimationClip {
        let mut curves = Vec::new();

        for (c, channel) in animation.channels.iter().enumerate() {
            let label = format!("animation {} channel {}", index, c);
            let Some(node) = channel.target.node else {
                tracing::debug!("{} has no target node, skipping", label);
                continue;
            };
            let Some(path) = self.graph.path_of(node) else {
                tracing::warn!("{} targets missing node {}", label, node);
                continue;
            };
            let Some(property) = TargetProperty::parse(&channel.target.path) else {
                tracing::warn!(
                    "{} has unsupported target path '{}', skipping",
                    label,
                    channel.target.path
                );
                continue;
            };
            let Some(sampler) = animation.samplers.get(channel.sampler) else {
                tracing::warn!("{} references missing sampler {}", label, channel.sampler);
                continue;
            };
            let (Some(input), Some(output)) = (
                self.accessors.get(sampler.input),
                self.accessors.get(sampler.output),
            ) else {
                continue;
            };

            let from_file = Interpolation::parse(sampler.interpolation.as_deref(), &label);
            let interpolation = match self.settings.interpolation {
                InterpolationOverride::FromFile => from_file,
                InterpolationOverride::Step => Interpolation::Step,
                InterpolationOverride::Linear => Interpolation::Linear,
            };
            // The output layout always follows the file
            let layout = from_file;

            let times = input.read_scalars();
            let target = ChannelTarget {
                node,
                path: &path,
                property,
                interpolation,
                layout,
                label: &label,
            };
            match property {
                TargetProperty::Translation | TargetProperty::Scale => {
                    self.vector_curves(&target, times, output, &mut curves)
                }
                TargetProperty::Rotation => {
                    self.rotation_curves(&target, times, output, &mut curves)
                }
                TargetProperty::Weights => self.weight_curves(&target, times, output, &mut curves),
            }
        }

        let duration = curves
            .iter()
            .map(|c| c.curve.duration())
            .fold(0.0f32, f32::max);

        tracing::debug!(
            "Decoded animation {} with {} curves over {:.3}s",
            index,
            curves.len(),
            duration
        );

        AnimationClip {
            name: animation
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("animation{}", index)),
            curves,
            duration,
            frame_rate: self.settings.frame_rate,
            looping: self.settings.looping,
        }
    }

    fn vector_curves(
        &self,
        target: &ChannelTarget<'_>,
        times: Vec<f32>,
        output: &AccessorData,
        curves: &mut Vec<AnimationCurve>,
    ) {
        let convert_values = target.property == TargetProperty::Translation;
        let keys = split_output(times, output.read_vec3(), target.layout, 1, target.label);
        let map = |v: Vec3| if convert_values { convert::vector(v) } else { v };

        let values: Vec<[f32; 3]> = keys.values.iter().map(|&v| map(v).to_array()).collect();
        let tangents: Option<Vec<([f32; 3], [f32; 3])>> = keys.tangents.as_ref().map(|t| {
            t.iter()
                .map(|&(a, b)| (map(a).to_array(), map(b).to_array()))
                .collect()
        });

        for (component, axis) in ["x", "y", "z"].into_iter().enumerate() {
            curves.push(target.curve(
                component,
                format!("{}.{}", target.property.as_str(), axis),
                &keys.times,
                |k| values[k][component],
                tangents
                    .as_ref()
                    .map(|t| move |k: usize| (t[k].0[component], t[k].1[component])),
            ));
        }
    }

    fn rotation_curves(
        &self,
        target: &ChannelTarget<'_>,
        times: Vec<f32>,
        output: &AccessorData,
        curves: &mut Vec<AnimationCurve>,
    ) {
        let keys = split_output(times, output.read_vec4(), target.layout, 1, target.label);
        let map = |v: glam::Vec4| convert::rotation(Quat::from_vec4(v)).to_array();

        let values: Vec<[f32; 4]> = keys.values.iter().map(|&v| map(v)).collect();
        let tangents: Option<Vec<([f32; 4], [f32; 4])>> = keys
            .tangents
            .as_ref()
            .map(|t| t.iter().map(|&(a, b)| (map(a), map(b))).collect());

        for (component, axis) in ["x", "y", "z", "w"].into_iter().enumerate() {
            curves.push(target.curve(
                component,
                format!("rotation.{}", axis),
                &keys.times,
                |k| values[k][component],
                tangents
                    .as_ref()
                    .map(|t| move |k: usize| (t[k].0[component], t[k].1[component])),
            ));
        }
    }

    fn weight_curves(
        &self,
        target: &ChannelTarget<'_>,
        times: Vec<f32>,
        output: &AccessorData,
        curves: &mut Vec<AnimationCurve>,
    ) {
        let mesh = self
            .graph
            .node(target.node)
            .and_then(|n| n.mesh)
            .and_then(|m| self.meshes.get(m));
        let Some(mesh) = mesh else {
            tracing::warn!("{} animates weights of a node without a mesh", target.label);
            return;
        };
        let target_count = mesh
            .primitives
            .iter()
            .map(|p| p.targets.len())
            .max()
            .unwrap_or(0)
            .max(mesh.weights.len());
        if target_count == 0 {
            tracing::warn!("{} animates weights of a mesh without morph targets", target.label);
            return;
        }

        let keys = split_output(
            times,
            output.read_scalars(),
            target.layout,
            target_count,
            target.label,
        );

        for shape in 0..target_count {
            let name = mesh.extras.target_name(shape);
            let mut curve = target.curve(
                shape,
                format!("weights.{}", name),
                &keys.times,
                |k| keys.values[k * target_count + shape],
                keys.tangents.as_ref().map(|t| {
                    move |k: usize| t[k * target_count + shape]
                }),
            );
            if self.settings.compress_blend_shape_keyframes {
                curve.curve.compress(COMPRESS_EPSILON);
            }
            curves.push(curve);
        }
    }
}

/// Everything about a channel needed to emit its curves
struct ChannelTarget<'a> {
    node: usize,
    path: &'a str,
    property: TargetProperty,
    interpolation: Interpolation,
    layout: Interpolation,
    label: &'a str,
}

impl ChannelTarget<'_> {
    fn curve<V, T>(
        &self,
        component: usize,
        attribute: String,
        times: &[f32],
        value: V,
        tangent: Option<T>,
    ) -> AnimationCurve
    where
        V: Fn(usize) -> f32,
        T: Fn(usize) -> (f32, f32),
    {
        let keys = times
            .iter()
            .enumerate()
            .map(|(k, &time)| match (self.interpolation, &tangent) {
                (Interpolation::Step, _) => Keyframe::step(time, value(k)),
                (Interpolation::CubicSpline, Some(tangent)) => {
                    let (in_tangent, out_tangent) = tangent(k);
                    Keyframe::cubic(time, value(k), in_tangent, out_tangent)
                }
                _ => Keyframe::linear(time, value(k)),
            })
            .collect();

        AnimationCurve {
            path: self.path.to_string(),
            node: self.node,
            property: self.property,
            component,
            attribute,
            interpolation: self.interpolation,
            curve: Curve::new(keys),
        }
    }
}
