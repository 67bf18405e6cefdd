//! Validated copy-then-delete renames.
//!
//! Validation runs synchronously before any job is created; the copy itself
//! runs on the job engine. The original is deleted only after the whole
//! subtree has been copied, so a failure or cancellation mid-copy never
//! loses data. The tree is rewritten by the interaction loop once the job
//! reports `Done`.

use std::sync::Arc;

use tracing::info;

use crate::error::{Result, TaigaError};
use crate::jobs::{JobCtx, JobValue};
use crate::store::{base_name, join_path, parent_path, DataStore, NodeKind};

/// Datasets at or above this element count are copied slice by slice.
pub const CHUNK_THRESHOLD: usize = 1_000_000;

/// Slice length for a chunked copy of `size` elements.
pub fn copy_slice_len(size: usize) -> usize {
    (size / 100).clamp(1, 100_000)
}

/// Check `new_name` against the store before any work is queued. Returns
/// the destination path on success.
pub fn validate(store: &dyn DataStore, old_path: &str, new_name: &str) -> Result<String> {
    let Some(parent) = parent_path(old_path) else {
        return Err(TaigaError::InvalidName {
            reason: "the root group cannot be renamed".to_string(),
        });
    };
    if new_name.is_empty() {
        return Err(TaigaError::InvalidName {
            reason: "name is empty".to_string(),
        });
    }
    if new_name.contains('/') {
        return Err(TaigaError::InvalidName {
            reason: format!("'{}' contains a path separator", new_name),
        });
    }
    if new_name == base_name(old_path) {
        return Err(TaigaError::NameUnchanged);
    }
    let new_path = join_path(parent, new_name);
    if store.exists(&new_path) {
        return Err(TaigaError::NameExists {
            parent: parent.to_string(),
            name: new_name.to_string(),
        });
    }
    Ok(new_path)
}

struct CopyItem {
    old: String,
    new: String,
    kind: NodeKind,
}

fn plan(store: &dyn DataStore, old_path: &str, new_path: &str) -> Result<Vec<CopyItem>> {
    let kind = match store.dataset_info(old_path) {
        Ok(_) => NodeKind::Dataset,
        Err(_) => NodeKind::Group,
    };
    let mut items = vec![CopyItem {
        old: old_path.to_string(),
        new: new_path.to_string(),
        kind,
    }];
    let mut at = 0;
    while at < items.len() {
        if matches!(items[at].kind, NodeKind::Group) {
            let (old_parent, new_parent) = (items[at].old.clone(), items[at].new.clone());
            for entry in store.list_children(&old_parent)? {
                items.push(CopyItem {
                    old: join_path(&old_parent, &entry.name),
                    new: join_path(&new_parent, &entry.name),
                    kind: entry.kind,
                });
            }
        }
        at += 1;
    }
    Ok(items)
}

fn copy_dataset(
    store: &dyn DataStore,
    old: &str,
    new: &str,
    ctx: &JobCtx,
    done: usize,
    total: usize,
) -> Result<bool> {
    let info = store.dataset_info(old)?;
    store.create_dataset_like(new, &info)?;
    store.write_attributes(new, &store.attributes(old)?)?;
    let size = info.size();
    if size < CHUNK_THRESHOLD {
        let buffer = store.read_range(old, 0, size)?;
        store.write_range(new, 0, &buffer)?;
        return Ok(true);
    }
    // Large payloads move in bounded slices with per-dataset progress.
    let slice = copy_slice_len(size);
    let mut start = 0;
    while start < size {
        if ctx.cancelled() {
            return Ok(false);
        }
        let end = (start + slice).min(size);
        let buffer = store.read_range(old, start, end)?;
        store.write_range(new, start, &buffer)?;
        let within = end as f64 / size as f64;
        ctx.progress(
            (done as f64 + within) / total as f64,
            format!("{}/{} elements [copy {}]", end, size, base_name(old)),
        );
        start = end;
    }
    Ok(true)
}

/// Copy `old_path` (recursively, for groups) to its already-validated
/// destination, then delete the original. Runs as job work.
pub fn execute(
    store: &Arc<dyn DataStore>,
    old_path: &str,
    new_name: &str,
    ctx: &JobCtx,
) -> Result<Option<JobValue>> {
    let parent = parent_path(old_path).unwrap_or("/");
    let new_path = join_path(parent, new_name);
    let items = plan(store.as_ref(), old_path, &new_path)?;
    let total = items.len();
    for (done, item) in items.iter().enumerate() {
        if ctx.cancelled() {
            return Ok(None);
        }
        match item.kind {
            NodeKind::Group => {
                store.create_group(&item.new)?;
                store.write_attributes(&item.new, &store.attributes(&item.old)?)?;
            }
            NodeKind::Dataset => {
                if !copy_dataset(store.as_ref(), &item.old, &item.new, ctx, done, total)? {
                    return Ok(None);
                }
            }
        }
        ctx.progress(
            (done + 1) as f64 / total as f64,
            format!("{}/{} nodes [rename]", done + 1, total),
        );
    }
    // Copy verified complete; only now does the original go away.
    store.delete(old_path)?;
    info!(old = old_path, new = %new_path, "rename finished");
    Ok(Some(JobValue::Renamed {
        old_path: old_path.to_string(),
        new_name: new_name.to_string(),
    }))
}
