//! Animation decoding (glTF channels -> per-property keyframe curves)

mod curve;
mod decode;

pub use curve::{Curve, Keyframe, TangentMode, WeightedMode};
pub use decode::{AnimationClip, AnimationCurve, AnimationDecoder, Interpolation, TargetProperty};
