//! Binary buffer packing with matching bufferView/accessor JSON.

use bytemuck::Pod;
use serde_json::{json, Value};

pub(crate) const UNSIGNED_BYTE: u32 = 5121;
pub(crate) const UNSIGNED_SHORT: u32 = 5123;
pub(crate) const FLOAT: u32 = 5126;

pub(crate) const ARRAY_BUFFER: u32 = 34962;
pub(crate) const ELEMENT_ARRAY_BUFFER: u32 = 34963;

/// Accumulates one binary buffer plus its views and accessors.
///
/// Every pushed array gets its own 4-byte aligned buffer view and one
/// accessor; the returned index is the accessor index.
#[derive(Default)]
pub(crate) struct BufferBuilder {
    pub data: Vec<u8>,
    pub views: Vec<Value>,
    pub accessors: Vec<Value>,
}

fn align_buffer(buffer: &mut Vec<u8>) {
    while !buffer.len().is_multiple_of(4) {
        buffer.push(0);
    }
}

impl BufferBuilder {
    pub fn push<T: Pod>(
        &mut self,
        elements: &[T],
        component_type: u32,
        element_type: &str,
        target: Option<u32>,
    ) -> usize {
        align_buffer(&mut self.data);
        let offset = self.data.len();
        self.data.extend_from_slice(bytemuck::cast_slice(elements));

        let mut view = json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": self.data.len() - offset,
        });
        if let Some(target) = target {
            view["target"] = json!(target);
        }
        self.views.push(view);

        self.accessors.push(json!({
            "bufferView": self.views.len() - 1,
            "componentType": component_type,
            "count": elements.len(),
            "type": element_type,
        }));
        self.accessors.len() - 1
    }

    /// VEC3 float positions with the min/max bounds glTF requires
    pub fn push_positions(&mut self, positions: &[[f32; 3]]) -> usize {
        let index = self.push(positions, FLOAT, "VEC3", Some(ARRAY_BUFFER));
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for p in positions {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        self.accessors[index]["min"] = json!(min);
        self.accessors[index]["max"] = json!(max);
        index
    }

    /// Animation sampler input with min/max
    pub fn push_times(&mut self, times: &[f32]) -> usize {
        let index = self.push(times, FLOAT, "SCALAR", None);
        let first = times.first().copied().unwrap_or(0.0);
        let last = times.last().copied().unwrap_or(0.0);
        self.accessors[index]["min"] = json!([first]);
        self.accessors[index]["max"] = json!([last]);
        index
    }

    pub fn push_indices(&mut self, indices: &[u16]) -> usize {
        self.push(indices, UNSIGNED_SHORT, "SCALAR", Some(ELEMENT_ARRAY_BUFFER))
    }

    /// Final buffer, padded to 4 bytes
    pub fn finish(mut self) -> (Vec<u8>, Vec<Value>, Vec<Value>) {
        align_buffer(&mut self.data);
        (self.data, self.views, self.accessors)
    }
}
