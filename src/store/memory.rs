//! In-memory data store.
//!
//! A reference [`DataStore`] used by the test suite and fixtures. Values
//! are held as `ndarray` arrays; chunked iteration slices the array along
//! the declared chunk grid so reductions see exactly the buffers a native
//! backend would hand them.

use std::collections::HashMap;
use std::sync::Mutex;

use ndarray::{ArrayD, Slice};

use super::{
    join_path, parent_path, AttrValue, Attrs, ChildEntry, ChunkIter, DataStore, DatasetInfo,
    Dtype, NodeKind,
};
use crate::error::{Result, TaigaError};

#[derive(Debug)]
enum Entry {
    Group {
        attrs: Attrs,
    },
    Dataset {
        data: ArrayD<f64>,
        info: DatasetInfo,
        attrs: Attrs,
    },
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Child names per group, in insertion order.
    children: HashMap<String, Vec<String>>,
}

/// An in-memory hierarchy of groups and datasets.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store containing only the root group.
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner
            .entries
            .insert("/".to_string(), Entry::Group { attrs: Vec::new() });
        inner.children.insert("/".to_string(), Vec::new());
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn register_child(inner: &mut Inner, path: &str) -> Result<()> {
        let parent = parent_path(path)
            .ok_or_else(|| TaigaError::store("cannot add a second root"))?
            .to_string();
        let name = super::base_name(path).to_string();
        let siblings = inner
            .children
            .get_mut(&parent)
            .ok_or_else(|| TaigaError::path_not_found(&parent))?;
        if siblings.iter().any(|s| *s == name) {
            return Err(TaigaError::store(format!("{} already exists", path)));
        }
        siblings.push(name);
        Ok(())
    }

    /// Add an empty group at `path`. The parent must already exist.
    pub fn add_group(&self, path: &str) -> &Self {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        Self::register_child(&mut inner, path).expect("add_group");
        inner
            .entries
            .insert(path.to_string(), Entry::Group { attrs: Vec::new() });
        inner.children.insert(path.to_string(), Vec::new());
        drop(inner);
        self
    }

    /// Add a contiguous dataset holding `data`.
    pub fn add_dataset(&self, path: &str, data: ArrayD<f64>) -> &Self {
        self.add_dataset_with(path, data, None, None)
    }

    /// Add a dataset with an explicit chunk shape and optional compression.
    pub fn add_dataset_with(
        &self,
        path: &str,
        data: ArrayD<f64>,
        chunk_shape: Option<Vec<usize>>,
        compression: Option<String>,
    ) -> &Self {
        let info = DatasetInfo {
            shape: data.shape().to_vec(),
            dtype: Dtype::F64,
            chunk_shape,
            compression,
            stored_bytes: (data.len() * std::mem::size_of::<f64>()) as u64,
        };
        let mut inner = self.inner.lock().expect("store lock poisoned");
        Self::register_child(&mut inner, path).expect("add_dataset");
        inner.entries.insert(
            path.to_string(),
            Entry::Dataset {
                data,
                info,
                attrs: Vec::new(),
            },
        );
        drop(inner);
        self
    }

    /// Add a string-typed dataset; reductions on it must fail.
    pub fn add_text_dataset(&self, path: &str, len: usize) -> &Self {
        let info = DatasetInfo {
            shape: vec![len],
            dtype: Dtype::Text,
            chunk_shape: None,
            compression: None,
            stored_bytes: 0,
        };
        let mut inner = self.inner.lock().expect("store lock poisoned");
        Self::register_child(&mut inner, path).expect("add_text_dataset");
        inner.entries.insert(
            path.to_string(),
            Entry::Dataset {
                data: ArrayD::zeros(ndarray::IxDyn(&[0])),
                info,
                attrs: Vec::new(),
            },
        );
        drop(inner);
        self
    }

    /// Attach an attribute to an existing node.
    pub fn set_attr(&self, path: &str, name: &str, value: AttrValue) -> &Self {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        match inner.entries.get_mut(path) {
            Some(Entry::Group { attrs }) | Some(Entry::Dataset { attrs, .. }) => {
                attrs.push((name.to_string(), value));
            }
            None => panic!("set_attr: no such path {}", path),
        }
        drop(inner);
        self
    }

    fn chunk_ranges(shape: &[usize], chunks: &[usize]) -> Vec<Vec<(usize, usize)>> {
        // Odometer over the chunk grid, outermost axis slowest.
        let grid: Vec<usize> = shape
            .iter()
            .zip(chunks)
            .map(|(&s, &c)| s.div_ceil(c.max(1)))
            .collect();
        let total: usize = grid.iter().product();
        let mut out = Vec::with_capacity(total);
        let mut index = vec![0usize; shape.len()];
        for _ in 0..total {
            let ranges: Vec<(usize, usize)> = index
                .iter()
                .zip(chunks)
                .zip(shape)
                .map(|((&i, &c), &s)| (i * c, ((i + 1) * c).min(s)))
                .collect();
            out.push(ranges);
            for axis in (0..index.len()).rev() {
                index[axis] += 1;
                if index[axis] < grid[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        out
    }
}

impl DataStore for MemoryStore {
    fn list_children(&self, path: &str) -> Result<Vec<ChildEntry>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        match inner.entries.get(path) {
            Some(Entry::Group { .. }) => {}
            Some(Entry::Dataset { .. }) => return Err(TaigaError::not_a_group(path)),
            None => return Err(TaigaError::path_not_found(path)),
        }
        let names = inner.children.get(path).cloned().unwrap_or_default();
        names
            .into_iter()
            .map(|name| {
                let child_path = join_path(path, &name);
                let kind = match inner.entries.get(&child_path) {
                    Some(Entry::Group { .. }) => NodeKind::Group,
                    Some(Entry::Dataset { .. }) => NodeKind::Dataset,
                    None => return Err(TaigaError::path_not_found(&child_path)),
                };
                Ok(ChildEntry { name, kind })
            })
            .collect()
    }

    fn attributes(&self, path: &str) -> Result<Attrs> {
        let inner = self.inner.lock().expect("store lock poisoned");
        match inner.entries.get(path) {
            Some(Entry::Group { attrs }) | Some(Entry::Dataset { attrs, .. }) => Ok(attrs.clone()),
            None => Err(TaigaError::path_not_found(path)),
        }
    }

    fn dataset_info(&self, path: &str) -> Result<DatasetInfo> {
        let inner = self.inner.lock().expect("store lock poisoned");
        match inner.entries.get(path) {
            Some(Entry::Dataset { info, .. }) => Ok(info.clone()),
            Some(Entry::Group { .. }) => Err(TaigaError::store(format!("{} is a group", path))),
            None => Err(TaigaError::path_not_found(path)),
        }
    }

    fn iter_chunks<'a>(&'a self, path: &str) -> Result<ChunkIter<'a>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let (data, info) = match inner.entries.get(path) {
            Some(Entry::Dataset { data, info, .. }) => (data, info),
            Some(Entry::Group { .. }) => return Err(TaigaError::store(format!("{} is a group", path))),
            None => return Err(TaigaError::path_not_found(path)),
        };
        // Materialize the chunk buffers up front; this store exists for
        // tests and fixtures, not for out-of-core data.
        let buffers: Vec<Vec<f64>> = match &info.chunk_shape {
            None => vec![data.iter().copied().collect()],
            Some(chunks) => Self::chunk_ranges(&info.shape, chunks)
                .into_iter()
                .map(|ranges| {
                    data.slice_each_axis(|ax| {
                        let (start, end) = ranges[ax.axis.index()];
                        Slice::from(start..end)
                    })
                    .iter()
                    .copied()
                    .collect()
                })
                .collect(),
        };
        Ok(Box::new(buffers.into_iter().map(Ok)))
    }

    fn read_range(&self, path: &str, start: usize, end: usize) -> Result<Vec<f64>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        match inner.entries.get(path) {
            Some(Entry::Dataset { data, .. }) => {
                Ok(data.iter().copied().skip(start).take(end.saturating_sub(start)).collect())
            }
            Some(Entry::Group { .. }) => Err(TaigaError::store(format!("{} is a group", path))),
            None => Err(TaigaError::path_not_found(path)),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .entries
            .contains_key(path)
    }

    fn create_group(&self, path: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        Self::register_child(&mut inner, path)?;
        inner
            .entries
            .insert(path.to_string(), Entry::Group { attrs: Vec::new() });
        inner.children.insert(path.to_string(), Vec::new());
        Ok(())
    }

    fn create_dataset_like(&self, path: &str, info: &DatasetInfo) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        Self::register_child(&mut inner, path)?;
        inner.entries.insert(
            path.to_string(),
            Entry::Dataset {
                data: ArrayD::zeros(ndarray::IxDyn(&info.shape)),
                info: info.clone(),
                attrs: Vec::new(),
            },
        );
        Ok(())
    }

    fn write_attributes(&self, path: &str, attrs: &Attrs) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        match inner.entries.get_mut(path) {
            Some(Entry::Group { attrs: dst }) | Some(Entry::Dataset { attrs: dst, .. }) => {
                *dst = attrs.clone();
                Ok(())
            }
            None => Err(TaigaError::path_not_found(path)),
        }
    }

    fn write_range(&self, path: &str, start: usize, values: &[f64]) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        match inner.entries.get_mut(path) {
            Some(Entry::Dataset { data, .. }) => {
                let slice = data
                    .as_slice_memory_order_mut()
                    .ok_or_else(|| TaigaError::store("non-contiguous target"))?;
                let end = start + values.len();
                if end > slice.len() {
                    return Err(TaigaError::store(format!(
                        "write past end of {} ({} > {})",
                        path,
                        end,
                        slice.len()
                    )));
                }
                slice[start..end].copy_from_slice(values);
                Ok(())
            }
            Some(Entry::Group { .. }) => Err(TaigaError::store(format!("{} is a group", path))),
            None => Err(TaigaError::path_not_found(path)),
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        if !inner.entries.contains_key(path) {
            return Err(TaigaError::path_not_found(path));
        }
        // Drop the whole subtree.
        let prefix = format!("{}/", path);
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|p| *p == path || p.starts_with(&prefix))
            .cloned()
            .collect();
        for p in doomed {
            inner.entries.remove(&p);
            inner.children.remove(&p);
        }
        if let Some(parent) = parent_path(path) {
            let name = super::base_name(path).to_string();
            if let Some(siblings) = inner.children.get_mut(parent) {
                siblings.retain(|s| *s != name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn array1(values: &[f64]) -> ArrayD<f64> {
        ArrayD::from_shape_vec(ndarray::IxDyn(&[values.len()]), values.to_vec()).unwrap()
    }

    #[test]
    fn children_in_insertion_order() {
        let store = MemoryStore::new();
        store.add_group("/b");
        store.add_dataset("/a", array1(&[1.0]));
        let names: Vec<String> = store
            .list_children("/")
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn list_children_on_dataset_fails() {
        let store = MemoryStore::new();
        store.add_dataset("/d", array1(&[1.0, 2.0]));
        assert!(matches!(
            store.list_children("/d"),
            Err(TaigaError::NotAGroup { .. })
        ));
    }

    #[test]
    fn chunk_iteration_covers_every_element() {
        let store = MemoryStore::new();
        let data =
            ArrayD::from_shape_vec(ndarray::IxDyn(&[5, 3]), (0..15).map(f64::from).collect())
                .unwrap();
        store.add_dataset_with("/d", data, Some(vec![2, 2]), None);

        let mut seen: Vec<f64> = Vec::new();
        for chunk in store.iter_chunks("/d").unwrap() {
            seen.extend(chunk.unwrap());
        }
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, (0..15).map(f64::from).collect::<Vec<_>>());
    }

    #[test]
    fn read_range_is_half_open() {
        let store = MemoryStore::new();
        store.add_dataset("/d", array1(&[10.0, 11.0, 12.0, 13.0]));
        assert_eq!(store.read_range("/d", 1, 3).unwrap(), vec![11.0, 12.0]);
        assert_eq!(store.read_range("/d", 3, 3).unwrap(), Vec::<f64>::new());
    }

    #[test]
    fn delete_removes_subtree() {
        let store = MemoryStore::new();
        store.add_group("/g");
        store.add_dataset("/g/d", array1(&[1.0]));
        store.delete("/g").unwrap();
        assert!(!store.exists("/g"));
        assert!(!store.exists("/g/d"));
        assert!(store.list_children("/").unwrap().is_empty());
    }
}
