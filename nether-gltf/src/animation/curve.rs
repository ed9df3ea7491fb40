//! Scalar keyframe curves

/// How the segment leaving a key is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TangentMode {
    /// Hold the key value until the next key
    Constant,
    /// Straight line to the next key
    Linear,
    /// Hermite spline using the stored tangents
    Free,
}

/// Which tangent weights are in effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightedMode {
    None,
    In,
    Out,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
    /// Slope arriving at the key, value per second
    pub in_tangent: f32,
    /// Slope leaving the key, value per second
    pub out_tangent: f32,
    pub in_weight: f32,
    pub out_weight: f32,
    pub weighted_mode: WeightedMode,
    pub tangent_mode: TangentMode,
    /// In and out tangents are independent
    pub broken: bool,
}

impl Keyframe {
    /// Discontinuous key: infinite tangents so the value holds until the next key
    pub fn step(time: f32, value: f32) -> Self {
        Self {
            time,
            value,
            in_tangent: f32::INFINITY,
            out_tangent: f32::INFINITY,
            in_weight: 0.0,
            out_weight: 0.0,
            weighted_mode: WeightedMode::Both,
            tangent_mode: TangentMode::Constant,
            broken: true,
        }
    }

    pub fn linear(time: f32, value: f32) -> Self {
        Self {
            time,
            value,
            in_tangent: 0.0,
            out_tangent: 0.0,
            in_weight: 0.0,
            out_weight: 0.0,
            weighted_mode: WeightedMode::None,
            tangent_mode: TangentMode::Linear,
            broken: true,
        }
    }

    /// Cubic spline key with glTF in/out tangents
    pub fn cubic(time: f32, value: f32, in_tangent: f32, out_tangent: f32) -> Self {
        Self {
            time,
            value,
            in_tangent,
            out_tangent,
            in_weight: 1.0 / 3.0,
            out_weight: 1.0 / 3.0,
            weighted_mode: WeightedMode::None,
            tangent_mode: TangentMode::Free,
            broken: true,
        }
    }
}

/// Keys sorted by time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Curve {
    pub keys: Vec<Keyframe>,
}

impl Curve {
    pub fn new(keys: Vec<Keyframe>) -> Self {
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Time of the last key
    pub fn duration(&self) -> f32 {
        self.keys.last().map(|k| k.time).unwrap_or(0.0)
    }

    /// Evaluate at `time`, clamping outside the key range
    pub fn sample(&self, time: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return 0.0;
        };
        if time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }

        // First key strictly after `time`; both neighbours exist after clamping
        let next = self.keys.partition_point(|k| k.time <= time);
        let k0 = &self.keys[next - 1];
        let k1 = &self.keys[next];
        let dt = k1.time - k0.time;
        if dt <= 0.0 {
            return k1.value;
        }
        let s = (time - k0.time) / dt;

        match k0.tangent_mode {
            TangentMode::Constant => k0.value,
            TangentMode::Linear => k0.value + (k1.value - k0.value) * s,
            TangentMode::Free => {
                if !k0.out_tangent.is_finite() || !k1.in_tangent.is_finite() {
                    return k0.value;
                }
                hermite(k0.value, k0.out_tangent * dt, k1.value, k1.in_tangent * dt, s)
            }
        }
    }

    /// Drop keys that do not change the sampled curve.
    ///
    /// A held key equal to the previously kept value is redundant. A linear
    /// key is redundant only when it also equals the next key, so the segment
    /// is flat on both sides. Spline keys, the first key and the last key are
    /// always kept.
    pub fn compress(&mut self, epsilon: f32) {
        if self.keys.len() < 3 {
            return;
        }
        let same = |a: f32, b: f32| (a - b).abs() <= epsilon;
        let last = self.keys.len() - 1;

        let mut kept: Vec<Keyframe> = Vec::with_capacity(self.keys.len());
        kept.push(self.keys[0]);
        for i in 1..last {
            let key = self.keys[i];
            let prev = kept[kept.len() - 1];
            let next = self.keys[i + 1];
            let redundant = prev.tangent_mode == key.tangent_mode
                && match key.tangent_mode {
                    TangentMode::Constant => same(key.value, prev.value),
                    TangentMode::Linear => same(key.value, prev.value) && same(key.value, next.value),
                    TangentMode::Free => false,
                };
            if !redundant {
                kept.push(key);
            }
        }
        kept.push(self.keys[last]);
        self.keys = kept;
    }
}

/// Cubic Hermite with tangents already scaled by the key interval
fn hermite(p0: f32, m0: f32, p1: f32, m1: f32, s: f32) -> f32 {
    let s2 = s * s;
    let s3 = s2 * s;
    (2.0 * s3 - 3.0 * s2 + 1.0) * p0
        + (s3 - 2.0 * s2 + s) * m0
        + (-2.0 * s3 + 3.0 * s2) * p1
        + (s3 - s2) * m1
}
