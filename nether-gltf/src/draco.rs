//! Draco codec boundary
//!
//! The mesh assembler hands compressed primitive bytes to a [`DracoDecoder`]
//! and receives plain attribute streams back. With the `draco-native`
//! feature, [`NativeDracoDecoder`] binds the draco C ABI used by the Unity
//! glTF importers; every native allocation is owned by a [`ScopedHandle`]
//! that releases it on drop, so an early return never leaks.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::extensions::DracoMeshCompression;

/// One decoded attribute, flattened to floats
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DracoStream {
    pub components: usize,
    /// `vertex_count * components` values
    pub values: Vec<f32>,
}

impl DracoStream {
    pub fn vertex_count(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.values.len() / self.components
        }
    }
}

/// Decoded draco geometry, still in glTF conventions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DracoGeometry {
    pub vertex_count: usize,
    /// Triangle list
    pub indices: Vec<u32>,
    /// glTF attribute semantic (`POSITION`, `TEXCOORD_0`, ...) -> stream
    pub attributes: BTreeMap<String, DracoStream>,
}

/// Decodes `KHR_draco_mesh_compression` payloads
pub trait DracoDecoder: Send + Sync + fmt::Debug {
    fn decode(&self, bytes: &[u8], extension: &DracoMeshCompression) -> Result<DracoGeometry>;
}

/// Owns a pointer handed out by native code and releases it exactly once
pub struct ScopedHandle<T> {
    ptr: *mut T,
    release: unsafe extern "C" fn(*mut *mut T),
}

impl<T> ScopedHandle<T> {
    /// Take ownership of `ptr`.
    ///
    /// # Safety
    /// `ptr` must be null or a live allocation that `release` frees.
    pub unsafe fn new(ptr: *mut T, release: unsafe extern "C" fn(*mut *mut T)) -> Self {
        Self { ptr, release }
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    pub fn as_ptr(&self) -> *mut T {
        self.ptr
    }

    /// Borrow the pointee, `None` when null
    pub fn get(&self) -> Option<&T> {
        // SAFETY: non-null pointers are live until drop per `new`'s contract
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Drop for ScopedHandle<T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: `release` is the matching free function for `ptr`
            unsafe { (self.release)(&mut self.ptr) };
            self.ptr = std::ptr::null_mut();
        }
    }
}

impl<T> fmt::Debug for ScopedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopedHandle").field(&self.ptr).finish()
    }
}

/// Draco `DataType` codes
pub mod data_type {
    pub const INT8: i32 = 1;
    pub const UINT8: i32 = 2;
    pub const INT16: i32 = 3;
    pub const UINT16: i32 = 4;
    pub const INT32: i32 = 5;
    pub const UINT32: i32 = 6;
    pub const FLOAT32: i32 = 9;
}

/// Convert a raw native array to floats.
///
/// # Safety
/// `data` must point to `len` elements of the type named by `ty`.
pub unsafe fn read_native_values(ty: i32, data: *const std::ffi::c_void, len: usize) -> Option<Vec<f32>> {
    if data.is_null() {
        return None;
    }
    // SAFETY: forwarded from the caller
    unsafe {
        Some(match ty {
            data_type::INT8 => std::slice::from_raw_parts(data as *const i8, len)
                .iter()
                .map(|&v| v as f32)
                .collect(),
            data_type::UINT8 => std::slice::from_raw_parts(data as *const u8, len)
                .iter()
                .map(|&v| v as f32)
                .collect(),
            data_type::INT16 => std::slice::from_raw_parts(data as *const i16, len)
                .iter()
                .map(|&v| v as f32)
                .collect(),
            data_type::UINT16 => std::slice::from_raw_parts(data as *const u16, len)
                .iter()
                .map(|&v| v as f32)
                .collect(),
            data_type::INT32 => std::slice::from_raw_parts(data as *const i32, len)
                .iter()
                .map(|&v| v as f32)
                .collect(),
            data_type::UINT32 => std::slice::from_raw_parts(data as *const u32, len)
                .iter()
                .map(|&v| v as f32)
                .collect(),
            data_type::FLOAT32 => std::slice::from_raw_parts(data as *const f32, len).to_vec(),
            _ => return None,
        })
    }
}

#[cfg(feature = "draco-native")]
pub use native::NativeDracoDecoder;

#[cfg(feature = "draco-native")]
mod native {
    use std::ffi::{c_char, c_int, c_void};

    use super::{data_type, read_native_values, DracoDecoder, DracoGeometry, DracoStream, ScopedHandle};
    use crate::error::{ImportError, Result};
    use crate::extensions::DracoMeshCompression;

    #[repr(C)]
    struct DracoMesh {
        num_faces: c_int,
        num_vertices: c_int,
        num_attributes: c_int,
        is_point_cloud: bool,
    }

    #[repr(C)]
    struct DracoAttribute {
        attribute_type: c_int,
        data_type: c_int,
        num_components: c_int,
        unique_id: c_int,
    }

    #[repr(C)]
    struct DracoData {
        data_type: c_int,
        data: *mut c_void,
    }

    #[link(name = "draco_unity")]
    unsafe extern "C" {
        fn DecodeDracoMesh(data: *const c_char, length: u32, mesh: *mut *mut DracoMesh) -> c_int;
        fn ReleaseDracoMesh(mesh: *mut *mut DracoMesh);
        fn ReleaseDracoAttribute(attr: *mut *mut DracoAttribute);
        fn ReleaseDracoData(data: *mut *mut DracoData);
        fn GetAttributeByUniqueId(
            mesh: *const DracoMesh,
            unique_id: c_int,
            attr: *mut *mut DracoAttribute,
        ) -> bool;
        fn GetAttributeData(
            mesh: *const DracoMesh,
            attr: *const DracoAttribute,
            data: *mut *mut DracoData,
        ) -> bool;
        fn GetMeshIndices(mesh: *const DracoMesh, indices: *mut *mut DracoData) -> bool;
    }

    /// Decoder backed by the native draco library
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NativeDracoDecoder;

    impl DracoDecoder for NativeDracoDecoder {
        fn decode(&self, bytes: &[u8], extension: &DracoMeshCompression) -> Result<DracoGeometry> {
            let length = u32::try_from(bytes.len())
                .map_err(|_| ImportError::Draco("payload larger than 4 GiB".into()))?;

            let mut raw_mesh: *mut DracoMesh = std::ptr::null_mut();
            // SAFETY: `bytes` is valid for `length` bytes; the out pointer is
            // owned by the guard below
            let status = unsafe { DecodeDracoMesh(bytes.as_ptr().cast(), length, &mut raw_mesh) };
            let mesh = unsafe { ScopedHandle::new(raw_mesh, ReleaseDracoMesh) };
            let header = match mesh.get() {
                Some(header) if status > 0 => header,
                _ => return Err(ImportError::Draco(format!("decode status {}", status))),
            };
            if header.is_point_cloud {
                return Err(ImportError::Draco("point clouds are not supported".into()));
            }

            let vertex_count = header.num_vertices.max(0) as usize;
            let index_count = header.num_faces.max(0) as usize * 3;

            let mut raw_indices: *mut DracoData = std::ptr::null_mut();
            // SAFETY: mesh is live; the data is owned by the guard
            let ok = unsafe { GetMeshIndices(mesh.as_ptr(), &mut raw_indices) };
            let indices_data = unsafe { ScopedHandle::new(raw_indices, ReleaseDracoData) };
            let indices = match indices_data.get() {
                Some(data) if ok => {
                    // SAFETY: the library returns `num_faces * 3` indices
                    unsafe { read_native_values(data.data_type, data.data, index_count) }
                }
                _ => None,
            }
            .ok_or_else(|| ImportError::Draco("missing index data".into()))?
            .into_iter()
            .map(|i| i.max(0.0) as u32)
            .collect();

            let mut geometry = DracoGeometry {
                vertex_count,
                indices,
                attributes: Default::default(),
            };

            for (semantic, &unique_id) in &extension.attributes {
                let mut raw_attr: *mut DracoAttribute = std::ptr::null_mut();
                // SAFETY: mesh is live; the attribute is owned by the guard
                let found = unsafe {
                    GetAttributeByUniqueId(mesh.as_ptr(), unique_id as c_int, &mut raw_attr)
                };
                let attr = unsafe { ScopedHandle::new(raw_attr, ReleaseDracoAttribute) };
                let Some(info) = attr.get().filter(|_| found) else {
                    tracing::warn!("Draco attribute {} ({}) not found", semantic, unique_id);
                    continue;
                };
                let components = info.num_components.max(0) as usize;

                let mut raw_data: *mut DracoData = std::ptr::null_mut();
                // SAFETY: mesh and attribute are live
                let ok = unsafe { GetAttributeData(mesh.as_ptr(), attr.as_ptr(), &mut raw_data) };
                let data = unsafe { ScopedHandle::new(raw_data, ReleaseDracoData) };
                let values = match data.get() {
                    Some(d) if ok => {
                        let ty = if d.data_type > 0 { d.data_type } else { data_type::FLOAT32 };
                        // SAFETY: one value per component per vertex
                        unsafe { read_native_values(ty, d.data, vertex_count * components) }
                    }
                    _ => None,
                };
                match values {
                    Some(values) => {
                        geometry
                            .attributes
                            .insert(semantic.clone(), DracoStream { components, values });
                    }
                    None => tracing::warn!("Draco attribute {} has no readable data", semantic),
                }
            }

            Ok(geometry)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static RELEASED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn release_counter(ptr: *mut *mut u32) {
        // SAFETY: test pointers come from Box::into_raw
        unsafe {
            drop(Box::from_raw(*ptr));
            *ptr = std::ptr::null_mut();
        }
        RELEASED.fetch_add(1, Ordering::SeqCst);
    }

    fn decode_with_failure(fail: bool) -> std::result::Result<u32, ()> {
        let handle = unsafe { ScopedHandle::new(Box::into_raw(Box::new(7u32)), release_counter) };
        let value = *handle.get().ok_or(())?;
        if fail {
            return Err(());
        }
        Ok(value)
    }

    #[test]
    fn test_scoped_handle_releases_on_every_path() {
        let before = RELEASED.load(Ordering::SeqCst);
        assert_eq!(decode_with_failure(false), Ok(7));
        assert_eq!(decode_with_failure(true), Err(()));
        assert_eq!(RELEASED.load(Ordering::SeqCst) - before, 2);

        // Null handles are never released
        drop(unsafe { ScopedHandle::<u32>::new(std::ptr::null_mut(), release_counter) });
        assert_eq!(RELEASED.load(Ordering::SeqCst) - before, 2);
    }

    #[test]
    fn test_read_native_values() {
        let shorts = [1u16, 2, 65535];
        let floats = unsafe { read_native_values(data_type::UINT16, shorts.as_ptr().cast(), 3) };
        assert_eq!(floats, Some(vec![1.0, 2.0, 65535.0]));

        let unknown = unsafe { read_native_values(42, shorts.as_ptr().cast(), 3) };
        assert_eq!(unknown, None);
        assert_eq!(unsafe { read_native_values(data_type::FLOAT32, std::ptr::null(), 0) }, None);
    }

    #[test]
    fn test_stream_vertex_count() {
        let stream = DracoStream {
            components: 3,
            values: vec![0.0; 12],
        };
        assert_eq!(stream.vertex_count(), 4);
        assert_eq!(DracoStream::default().vertex_count(), 0);
    }
}
