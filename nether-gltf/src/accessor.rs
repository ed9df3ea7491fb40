//! Typed accessor decoding
//!
//! An accessor reinterprets a buffer view as `count` elements of a shape
//! (SCALAR .. MAT4) made of one component type. Decoding never fails: a shape
//! mismatch or unreadable data logs a warning and yields zero-filled elements,
//! so every reader returns exactly `count` elements.
//!
//! `count` is bounded when the accessor is resolved: a count whose byte span
//! overflows, or runs past the end of its buffer view, is clamped to the
//! elements the view actually holds.

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::document::Accessor;
use crate::source::BufferViewData;

/// Component type (GL enum values)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            5120 => Some(Self::I8),
            5121 => Some(Self::U8),
            5122 => Some(Self::I16),
            5123 => Some(Self::U16),
            5125 => Some(Self::U32),
            5126 => Some(Self::F32),
            _ => None,
        }
    }

    /// Size of one component in bytes
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::U32 | Self::F32 => 4,
        }
    }

    pub fn is_integer(self) -> bool {
        self != Self::F32
    }

    /// Read one component as float, optionally applying the glTF
    /// normalisation rules (`max(c / MAX, -1)` for signed types).
    fn read_f32(self, b: &[u8], normalized: bool) -> f32 {
        match self {
            Self::I8 => {
                let v = b[0] as i8 as f32;
                if normalized { (v / 127.0).max(-1.0) } else { v }
            }
            Self::U8 => {
                let v = b[0] as f32;
                if normalized { v / 255.0 } else { v }
            }
            Self::I16 => {
                let v = i16::from_le_bytes([b[0], b[1]]) as f32;
                if normalized { (v / 32767.0).max(-1.0) } else { v }
            }
            Self::U16 => {
                let v = u16::from_le_bytes([b[0], b[1]]) as f32;
                if normalized { v / 65535.0 } else { v }
            }
            Self::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
            Self::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        }
    }

    /// Read one component as an unsigned integer
    fn read_u32(self, b: &[u8]) -> u32 {
        match self {
            Self::I8 => (b[0] as i8).max(0) as u32,
            Self::U8 => b[0] as u32,
            Self::I16 => i16::from_le_bytes([b[0], b[1]]).max(0) as u32,
            Self::U16 => u16::from_le_bytes([b[0], b[1]]) as u32,
            Self::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            Self::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]).max(0.0) as u32,
        }
    }
}

/// Element shape (`type` in the JSON)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementShape {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl ElementShape {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SCALAR" => Some(Self::Scalar),
            "VEC2" => Some(Self::Vec2),
            "VEC3" => Some(Self::Vec3),
            "VEC4" => Some(Self::Vec4),
            "MAT2" => Some(Self::Mat2),
            "MAT3" => Some(Self::Mat3),
            "MAT4" => Some(Self::Mat4),
            _ => None,
        }
    }

    /// Number of components per element
    pub fn components(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }

    /// (columns, rows) of a matrix shape; vectors are a single column
    fn columns(self) -> (usize, usize) {
        match self {
            Self::Mat2 => (2, 2),
            Self::Mat3 => (3, 3),
            Self::Mat4 => (4, 4),
            other => (1, other.components()),
        }
    }

    fn is_matrix(self) -> bool {
        matches!(self, Self::Mat2 | Self::Mat3 | Self::Mat4)
    }
}

/// Byte layout of one element: matrix columns start on 4-byte boundaries
fn column_stride(shape: ElementShape, component: ComponentType) -> usize {
    let (_, rows) = shape.columns();
    let len = rows * component.size();
    if shape.is_matrix() { len.div_ceil(4) * 4 } else { len }
}

fn element_size(shape: ElementShape, component: ComponentType) -> usize {
    shape.columns().0 * column_stride(shape, component)
}

/// Largest zero-filled accessor decoded without a backing buffer view
const MAX_UNBACKED_BYTES: usize = 256 << 20;

/// Number of `elem_size` elements, `stride` apart from `offset`, that fit in
/// `available` bytes
fn elements_in(available: usize, offset: usize, stride: usize, elem_size: usize) -> usize {
    match available.checked_sub(offset).and_then(|rest| rest.checked_sub(elem_size)) {
        Some(rest) => rest / stride.max(1) + 1,
        None => 0,
    }
}

/// Clamp a declared element count to what `available` bytes can back
fn bounded_count(
    index: usize,
    what: &str,
    count: usize,
    offset: usize,
    stride: usize,
    elem_size: usize,
    available: usize,
) -> usize {
    if count == 0 {
        return 0;
    }
    let span = (count - 1)
        .checked_mul(stride)
        .and_then(|s| s.checked_add(elem_size))
        .and_then(|s| s.checked_add(offset));
    match span {
        Some(span) if span <= available => count,
        _ => {
            let fit = elements_in(available, offset, stride, elem_size).min(count);
            tracing::warn!(
                "Accessor {} {} declares {} elements but only {} fit in {} bytes, clamping",
                index,
                what,
                count,
                fit,
                available
            );
            fit
        }
    }
}

#[derive(Debug, Clone)]
struct SparseData {
    count: usize,
    index_type: ComponentType,
    indices: BufferViewData,
    index_offset: usize,
    values: BufferViewData,
    value_offset: usize,
}

/// An accessor with its buffer views resolved, ready to decode
#[derive(Debug, Clone)]
pub struct AccessorData {
    pub index: usize,
    pub name: Option<String>,
    pub component_type: ComponentType,
    pub shape: ElementShape,
    pub normalized: bool,
    pub count: usize,
    view: Option<BufferViewData>,
    byte_offset: usize,
    sparse: Option<SparseData>,
}

impl AccessorData {
    /// Resolve one accessor against the sliced buffer views
    pub fn resolve(index: usize, accessor: &Accessor, views: &[Option<BufferViewData>]) -> Self {
        let component_type = ComponentType::from_code(accessor.component_type).unwrap_or_else(|| {
            tracing::warn!(
                "Accessor {} has unsupported componentType {}, reading as float32",
                index,
                accessor.component_type
            );
            ComponentType::F32
        });
        let shape = ElementShape::parse(&accessor.element_type).unwrap_or_else(|| {
            tracing::warn!(
                "Accessor {} has unknown type '{}', reading as SCALAR",
                index,
                accessor.element_type
            );
            ElementShape::Scalar
        });

        let lookup = |view_index: usize, what: &str| -> Option<BufferViewData> {
            let view = views.get(view_index).cloned().flatten();
            if view.is_none() {
                tracing::warn!(
                    "Accessor {} {} buffer view {} is unavailable, zero-filling",
                    index,
                    what,
                    view_index
                );
            }
            view
        };

        let view = accessor.buffer_view.and_then(|v| lookup(v, "data"));
        let elem_size = element_size(shape, component_type);

        let sparse = accessor.sparse.as_ref().and_then(|sparse| {
            let index_type = ComponentType::from_code(sparse.indices.component_type)
                .filter(|t| matches!(t, ComponentType::U8 | ComponentType::U16 | ComponentType::U32));
            let Some(index_type) = index_type else {
                tracing::warn!(
                    "Accessor {} sparse indices have invalid componentType {}, ignoring overlay",
                    index,
                    sparse.indices.component_type
                );
                return None;
            };
            let indices = lookup(sparse.indices.buffer_view, "sparse index")?;
            let values = lookup(sparse.values.buffer_view, "sparse value")?;
            let index_size = index_type.size();
            let count = bounded_count(
                index,
                "sparse indices",
                sparse.count,
                sparse.indices.byte_offset,
                index_size,
                index_size,
                indices.len(),
            );
            let count = bounded_count(
                index,
                "sparse values",
                count,
                sparse.values.byte_offset,
                elem_size,
                elem_size,
                values.len(),
            );
            Some(SparseData {
                count,
                index_type,
                indices,
                index_offset: sparse.indices.byte_offset,
                values,
                value_offset: sparse.values.byte_offset,
            })
        });

        let count = match &view {
            Some(view) => bounded_count(
                index,
                "data",
                accessor.count,
                accessor.byte_offset,
                view.stride.filter(|&s| s > 0).unwrap_or(elem_size),
                elem_size,
                view.len(),
            ),
            None => bounded_count(
                index,
                "zero-filled data",
                accessor.count,
                0,
                elem_size,
                elem_size,
                MAX_UNBACKED_BYTES,
            ),
        };

        Self {
            index,
            name: accessor.name.clone(),
            component_type,
            shape,
            normalized: accessor.normalized,
            count,
            view,
            byte_offset: accessor.byte_offset,
            sparse,
        }
    }

    /// Decode every component with `read`, honouring stride, matrix column
    /// padding and the sparse overlay. Output is `count * components` long.
    fn decode_with<T: Copy + Default>(&self, read: impl Fn(&[u8]) -> T) -> Vec<T> {
        let components = self.shape.components();
        let mut out = vec![T::default(); self.count * components];

        if let Some(view) = &self.view {
            let elem_size = element_size(self.shape, self.component_type);
            let stride = view.stride.filter(|&s| s > 0).unwrap_or(elem_size);
            let oob = read_elements(
                view.bytes(),
                self.byte_offset,
                stride,
                self.count,
                self.shape,
                self.component_type,
                &read,
                &mut out,
            );
            if oob > 0 {
                tracing::warn!(
                    "Accessor {}: {} of {} elements lie outside buffer view, zero-filled",
                    self.index,
                    oob,
                    self.count
                );
            }
        }

        if let Some(sparse) = &self.sparse {
            self.apply_sparse(sparse, &read, &mut out);
        }

        out
    }

    fn apply_sparse<T: Copy + Default>(
        &self,
        sparse: &SparseData,
        read: &impl Fn(&[u8]) -> T,
        out: &mut [T],
    ) {
        let components = self.shape.components();

        let mut indices = vec![0u32; sparse.count];
        let index_size = sparse.index_type.size();
        let oob = read_elements(
            sparse.indices.bytes(),
            sparse.index_offset,
            index_size,
            sparse.count,
            ElementShape::Scalar,
            sparse.index_type,
            &|b: &[u8]| sparse.index_type.read_u32(b),
            &mut indices,
        );

        let mut values = vec![T::default(); sparse.count * components];
        let elem_size = element_size(self.shape, self.component_type);
        let oob = oob
            + read_elements(
                sparse.values.bytes(),
                sparse.value_offset,
                elem_size,
                sparse.count,
                self.shape,
                self.component_type,
                read,
                &mut values,
            );
        if oob > 0 {
            tracing::warn!(
                "Accessor {}: sparse overlay truncated by {} elements",
                self.index,
                oob
            );
        }

        // Ascending index order; the stable sort keeps duplicates in source
        // order so the later entry wins.
        let mut order: Vec<usize> = (0..sparse.count).collect();
        order.sort_by_key(|&i| indices[i]);

        for i in order {
            let target = indices[i] as usize;
            if target >= self.count {
                tracing::warn!(
                    "Accessor {}: sparse index {} out of range (count {})",
                    self.index,
                    target,
                    self.count
                );
                continue;
            }
            out[target * components..(target + 1) * components]
                .copy_from_slice(&values[i * components..(i + 1) * components]);
        }
    }

    fn check_shape(&self, expected: &[ElementShape]) -> bool {
        if expected.contains(&self.shape) {
            return true;
        }
        tracing::warn!(
            "Accessor {} is {:?}, expected {:?}; returning {} zeroed elements",
            self.index,
            self.shape,
            expected,
            self.count
        );
        false
    }

    /// Flat float components with the accessor's own `normalized` flag
    pub fn read_floats(&self) -> Vec<f32> {
        let normalized = self.normalized;
        let ty = self.component_type;
        self.decode_with(|b| ty.read_f32(b, normalized))
    }

    fn read_floats_normalized(&self) -> Vec<f32> {
        let ty = self.component_type;
        self.decode_with(|b| ty.read_f32(b, ty.is_integer()))
    }

    pub fn read_scalars(&self) -> Vec<f32> {
        if !self.check_shape(&[ElementShape::Scalar]) {
            return vec![0.0; self.count];
        }
        self.read_floats()
    }

    pub fn read_vec2(&self) -> Vec<Vec2> {
        if !self.check_shape(&[ElementShape::Vec2]) {
            return vec![Vec2::ZERO; self.count];
        }
        self.read_floats()
            .chunks_exact(2)
            .map(Vec2::from_slice)
            .collect()
    }

    pub fn read_vec3(&self) -> Vec<Vec3> {
        if !self.check_shape(&[ElementShape::Vec3]) {
            return vec![Vec3::ZERO; self.count];
        }
        self.read_floats()
            .chunks_exact(3)
            .map(Vec3::from_slice)
            .collect()
    }

    pub fn read_vec4(&self) -> Vec<Vec4> {
        if !self.check_shape(&[ElementShape::Vec4]) {
            return vec![Vec4::ZERO; self.count];
        }
        self.read_floats()
            .chunks_exact(4)
            .map(Vec4::from_slice)
            .collect()
    }

    /// Vertex colours: VEC3 or VEC4, integer components always normalised.
    /// VEC3 colours get alpha 1.
    pub fn read_colors(&self) -> Vec<Vec4> {
        if !self.check_shape(&[ElementShape::Vec3, ElementShape::Vec4]) {
            return vec![Vec4::ZERO; self.count];
        }
        let floats = self.read_floats_normalized();
        match self.shape {
            ElementShape::Vec3 => floats
                .chunks_exact(3)
                .map(|c| Vec3::from_slice(c).extend(1.0))
                .collect(),
            _ => floats.chunks_exact(4).map(Vec4::from_slice).collect(),
        }
    }

    /// Skin weights: VEC4, integer components always normalised
    pub fn read_weights(&self) -> Vec<Vec4> {
        if !self.check_shape(&[ElementShape::Vec4]) {
            return vec![Vec4::ZERO; self.count];
        }
        self.read_floats_normalized()
            .chunks_exact(4)
            .map(Vec4::from_slice)
            .collect()
    }

    /// Skin joint indices: VEC4 of unsigned integers
    pub fn read_joints(&self) -> Vec<[u16; 4]> {
        if !self.check_shape(&[ElementShape::Vec4]) {
            return vec![[0; 4]; self.count];
        }
        let ty = self.component_type;
        self.decode_with(|b| ty.read_u32(b).min(u16::MAX as u32) as u16)
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect()
    }

    /// Index buffer contents
    pub fn read_indices(&self) -> Vec<u32> {
        if !self.check_shape(&[ElementShape::Scalar]) {
            return vec![0; self.count];
        }
        if !matches!(
            self.component_type,
            ComponentType::U8 | ComponentType::U16 | ComponentType::U32
        ) {
            tracing::warn!(
                "Accessor {} used as indices has component type {:?}",
                self.index,
                self.component_type
            );
        }
        let ty = self.component_type;
        self.decode_with(|b| ty.read_u32(b))
    }

    /// Column-major 4x4 matrices. No axis conversion is applied here.
    pub fn read_mat4(&self) -> Vec<Mat4> {
        if !self.check_shape(&[ElementShape::Mat4]) {
            return vec![Mat4::ZERO; self.count];
        }
        self.read_floats()
            .chunks_exact(16)
            .map(Mat4::from_cols_slice)
            .collect()
    }
}

/// Read `count` elements starting at `offset` with the given stride.
/// Returns the number of elements that did not fit and were left untouched.
#[allow(clippy::too_many_arguments)]
fn read_elements<T: Copy>(
    bytes: &[u8],
    offset: usize,
    stride: usize,
    count: usize,
    shape: ElementShape,
    component: ComponentType,
    read: &impl Fn(&[u8]) -> T,
    out: &mut [T],
) -> usize {
    let (columns, rows) = shape.columns();
    let col_stride = column_stride(shape, component);
    let csize = component.size();
    let elem_size = element_size(shape, component);
    let components = shape.components();

    let mut oob = 0;
    for i in 0..count {
        let start = offset + i * stride;
        let Some(element) = bytes.get(start..start + elem_size) else {
            oob += 1;
            continue;
        };
        let dst = &mut out[i * components..(i + 1) * components];
        for col in 0..columns {
            for row in 0..rows {
                let at = col * col_stride + row * csize;
                dst[col * rows + row] = read(&element[at..at + csize]);
            }
        }
    }
    oob
}

/// Every accessor of a document, resolved
#[derive(Debug, Clone, Default)]
pub struct AccessorTable {
    accessors: Vec<AccessorData>,
}

impl AccessorTable {
    pub fn resolve(accessors: &[Accessor], views: &[Option<BufferViewData>]) -> Self {
        Self {
            accessors: accessors
                .iter()
                .enumerate()
                .map(|(index, accessor)| AccessorData::resolve(index, accessor, views))
                .collect(),
        }
    }

    /// Look up an accessor, warning when the index is out of range
    pub fn get(&self, index: usize) -> Option<&AccessorData> {
        let accessor = self.accessors.get(index);
        if accessor.is_none() {
            tracing::warn!(
                "Accessor {} does not exist ({} accessors)",
                index,
                self.accessors.len()
            );
        }
        accessor
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}
