//! Data store abstraction.
//!
//! The explorer core never talks to a file format directly. Everything it
//! needs from a file — child enumeration, metadata, attributes, chunked
//! value iteration, and the write/delete primitives behind renames — goes
//! through the [`DataStore`] trait. The in-memory implementation backs the
//! test suite; the `hdf5` feature provides the native adapter.

mod memory;

#[cfg(feature = "hdf5")]
mod hdf5_store;

pub use memory::MemoryStore;

#[cfg(feature = "hdf5")]
pub use hdf5_store::Hdf5Store;

use crate::error::Result;

/// Kind of an entry in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A container that may hold children and attributes.
    Group,
    /// A leaf holding a typed, shaped array.
    Dataset,
}

/// Element type tag for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    /// Fixed or variable-length strings; not reducible.
    Text,
}

impl Dtype {
    /// Whether values of this type can feed a numeric reduction.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Dtype::Text)
    }

    /// Short display name, matching what HDF5 tools print.
    pub fn name(self) -> &'static str {
        match self {
            Dtype::F32 => "float32",
            Dtype::F64 => "float64",
            Dtype::I8 => "int8",
            Dtype::I16 => "int16",
            Dtype::I32 => "int32",
            Dtype::I64 => "int64",
            Dtype::U8 => "uint8",
            Dtype::U16 => "uint16",
            Dtype::U32 => "uint32",
            Dtype::U64 => "uint64",
            Dtype::Text => "string",
        }
    }
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A small named metadata value attached to a group or dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Text(v) => write!(f, "{}", v),
            AttrValue::IntArray(v) => write!(f, "{:?}", v),
            AttrValue::FloatArray(v) => write!(f, "{:?}", v),
        }
    }
}

/// Attribute mapping in discovery order.
pub type Attrs = Vec<(String, AttrValue)>;

/// One child of a group, in discovery order.
#[derive(Debug, Clone)]
pub struct ChildEntry {
    pub name: String,
    pub kind: NodeKind,
}

/// Shape, type and storage metadata for one dataset.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    /// Dimension sizes, outermost first.
    pub shape: Vec<usize>,
    /// Element type tag.
    pub dtype: Dtype,
    /// Chunk shape; `None` means contiguous (unchunked) storage.
    pub chunk_shape: Option<Vec<usize>>,
    /// Compression filter name, if any.
    pub compression: Option<String>,
    /// On-disk (compressed) byte size.
    pub stored_bytes: u64,
}

impl DatasetInfo {
    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of chunks the dataset is stored in, 1 when contiguous.
    pub fn chunk_count(&self) -> usize {
        match &self.chunk_shape {
            None => 1,
            Some(chunks) => self
                .shape
                .iter()
                .zip(chunks)
                .map(|(&s, &c)| s.div_ceil(c.max(1)))
                .product::<usize>()
                .max(1),
        }
    }
}

/// A lazy sequence of chunk buffers, flattened to row-major `f64`.
pub type ChunkIter<'a> = Box<dyn Iterator<Item = Result<Vec<f64>>> + Send + 'a>;

/// The file-format boundary.
///
/// Implementations must be shareable across the worker pool; all methods
/// take `&self` and any interior state is synchronized internally.
pub trait DataStore: Send + Sync {
    /// Enumerate the children of a group, in discovery order.
    fn list_children(&self, path: &str) -> Result<Vec<ChildEntry>>;

    /// Fetch the attributes of a group or dataset.
    fn attributes(&self, path: &str) -> Result<Attrs>;

    /// Fetch shape/dtype/storage metadata for a dataset.
    fn dataset_info(&self, path: &str) -> Result<DatasetInfo>;

    /// Iterate the dataset's native chunks. For contiguous datasets this
    /// yields a single buffer; callers wanting bounded memory on those
    /// should slice via [`DataStore::read_range`] instead.
    fn iter_chunks<'a>(&'a self, path: &str) -> Result<ChunkIter<'a>>;

    /// Read raw elements for the half-open flat index range `[start, end)`.
    fn read_range(&self, path: &str, start: usize, end: usize) -> Result<Vec<f64>>;

    /// Whether a path exists at all.
    fn exists(&self, path: &str) -> bool;

    /// Create an empty group (rename support).
    fn create_group(&self, path: &str) -> Result<()>;

    /// Create an empty dataset with the same shape, dtype, chunking and
    /// compression as `info` (rename support).
    fn create_dataset_like(&self, path: &str, info: &DatasetInfo) -> Result<()>;

    /// Write attributes onto an existing node (rename support).
    fn write_attributes(&self, path: &str, attrs: &Attrs) -> Result<()>;

    /// Write elements at the half-open flat index range starting at
    /// `start` (rename support).
    fn write_range(&self, path: &str, start: usize, values: &[f64]) -> Result<()>;

    /// Delete a node and, for groups, its whole subtree (rename support).
    fn delete(&self, path: &str) -> Result<()>;
}

/// Join a parent path and a child name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// The parent of a path, or `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// The final component of a path.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a", "b"), "/a/b");
        assert_eq!(parent_path("/a/b"), Some("/a"));
        assert_eq!(parent_path("/a"), Some("/"));
        assert_eq!(parent_path("/"), None);
        assert_eq!(base_name("/a/b"), "b");
        assert_eq!(base_name("/"), "");
    }

    #[test]
    fn chunk_count_rounds_up() {
        let info = DatasetInfo {
            shape: vec![10, 7],
            dtype: Dtype::F64,
            chunk_shape: Some(vec![4, 4]),
            compression: None,
            stored_bytes: 560,
        };
        // ceil(10/4) * ceil(7/4) = 3 * 2
        assert_eq!(info.chunk_count(), 6);

        let contiguous = DatasetInfo {
            chunk_shape: None,
            ..info
        };
        assert_eq!(contiguous.chunk_count(), 1);
    }
}
