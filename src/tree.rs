//! Lazily materialized tree over a [`DataStore`] hierarchy.
//!
//! Children of a group are fetched on the first `expand` and never silently
//! re-fetched; `reset` discards the whole forest and rebuilds from the root
//! listing. The cursor moves over *visible* rows, which are either the
//! depth-first walk of expanded groups or a frozen search-filter view.

use std::collections::HashMap;

use crate::error::{Result, TaigaError};
use crate::store::{base_name, join_path, parent_path, Attrs, DataStore, DatasetInfo, NodeKind};

/// One element of the hierarchy, group or dataset.
#[derive(Debug, Clone)]
pub struct Node {
    pub path: String,
    pub name: String,
    pub kind: NodeKind,
    pub depth: usize,
    /// Child paths in discovery order. Empty until the node is expanded.
    pub children: Vec<String>,
    pub expanded: bool,
    /// Known child count, set when the group is first listed.
    pub nr_children: Option<usize>,
    pub dataset: Option<DatasetInfo>,
    attrs: Option<Attrs>,
}

impl Node {
    fn new(path: String, kind: NodeKind, depth: usize) -> Self {
        let name = if path == "/" {
            "/".to_string()
        } else {
            base_name(&path).to_string()
        };
        Self {
            path,
            name,
            kind,
            depth,
            children: Vec::new(),
            expanded: false,
            nr_children: None,
            dataset: None,
            attrs: None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group)
    }

    /// Label/value rows for the metadata panel.
    pub fn meta_rows(&self) -> Vec<(String, String)> {
        let mut rows = vec![("Name".to_string(), self.name.clone())];
        match &self.dataset {
            Some(info) => {
                rows.push(("Dtype".to_string(), info.dtype.to_string()));
                rows.push(("Shape".to_string(), format!("{:?}", info.shape)));
                rows.push((
                    "Chunks".to_string(),
                    match &info.chunk_shape {
                        Some(c) => format!("{:?}", c),
                        None => "contiguous".to_string(),
                    },
                ));
                rows.push((
                    "Compression".to_string(),
                    info.compression.clone().unwrap_or_else(|| "none".to_string()),
                ));
                rows.push(("Stored size".to_string(), human_bytes(info.stored_bytes)));
            }
            None => {
                rows.push((
                    "Children".to_string(),
                    self.nr_children
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                ));
                rows.push((
                    "Attributes".to_string(),
                    self.attrs
                        .as_ref()
                        .map(|a| a.len().to_string())
                        .unwrap_or_else(|| "?".to_string()),
                ));
            }
        }
        rows
    }
}

/// Format a byte count with a binary unit suffix.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// The materialized forest plus cursor and visible-row bookkeeping.
pub struct Tree {
    nodes: HashMap<String, Node>,
    root: String,
    pub cursor: usize,
    visible: Vec<String>,
    /// Frozen search view, replacing the expansion-derived rows until reset.
    filter: Option<Vec<String>>,
}

impl Tree {
    /// Build a tree with the root group listed and expanded.
    pub fn open(store: &dyn DataStore) -> Result<Self> {
        let root = "/".to_string();
        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), Node::new(root.clone(), NodeKind::Group, 0));
        let mut tree = Self {
            nodes,
            root,
            cursor: 0,
            visible: Vec::new(),
            filter: None,
        };
        tree.expand(store, "/")?;
        Ok(tree)
    }

    pub fn node(&self, path: &str) -> Option<&Node> {
        self.nodes.get(path)
    }

    pub fn visible_rows(&self) -> &[String] {
        &self.visible
    }

    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    pub fn current_path(&self) -> &str {
        self.visible
            .get(self.cursor)
            .map(String::as_str)
            .unwrap_or(&self.root)
    }

    pub fn current(&self) -> &Node {
        let path = self.current_path().to_string();
        &self.nodes[&path]
    }

    /// Materialize the children of the group at `path`. Idempotent.
    pub fn expand(&mut self, store: &dyn DataStore, path: &str) -> Result<()> {
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| TaigaError::path_not_found(path))?;
        if !node.is_group() {
            return Err(TaigaError::not_a_group(path));
        }
        if node.expanded {
            return Ok(());
        }
        // Children fetched once; a later collapse/expand cycle reuses them.
        if node.nr_children.is_none() {
            let entries = store.list_children(path)?;
            let depth = node.depth + 1;
            let mut child_paths = Vec::with_capacity(entries.len());
            for entry in entries {
                let child_path = join_path(path, &entry.name);
                let mut child = Node::new(child_path.clone(), entry.kind, depth);
                if matches!(entry.kind, NodeKind::Dataset) {
                    child.dataset = Some(store.dataset_info(&child_path)?);
                }
                self.nodes.insert(child_path.clone(), child);
                child_paths.push(child_path);
            }
            let node = self.nodes.get_mut(path).expect("node vanished during expand");
            node.nr_children = Some(child_paths.len());
            node.children = child_paths;
        }
        self.nodes
            .get_mut(path)
            .expect("node vanished during expand")
            .expanded = true;
        self.rebuild_visible();
        Ok(())
    }

    /// Hide the children of `path` without discarding them.
    pub fn collapse(&mut self, path: &str) {
        if let Some(node) = self.nodes.get_mut(path) {
            node.expanded = false;
            self.rebuild_visible();
        }
    }

    /// Expand a collapsed group under the cursor, collapse an expanded one.
    pub fn toggle_current(&mut self, store: &dyn DataStore) -> Result<()> {
        let path = self.current_path().to_string();
        let expanded = self
            .nodes
            .get(&path)
            .map(|n| n.expanded)
            .unwrap_or(false);
        if expanded {
            self.collapse(&path);
            Ok(())
        } else {
            self.expand(store, &path)
        }
    }

    /// Discard the whole forest and any filter, rebuilding from the root
    /// listing as if freshly opened.
    pub fn reset(&mut self, store: &dyn DataStore) -> Result<()> {
        *self = Self::open(store)?;
        Ok(())
    }

    fn rebuild_visible(&mut self) {
        let current = self.visible.get(self.cursor).cloned();
        self.visible = match &self.filter {
            Some(view) => view.clone(),
            None => {
                let mut rows = Vec::new();
                self.walk(&self.root.clone(), &mut rows);
                rows
            }
        };
        self.cursor = current
            .and_then(|p| self.visible.iter().position(|row| *row == p))
            .unwrap_or(0)
            .min(self.visible.len().saturating_sub(1));
    }

    fn walk(&self, path: &str, rows: &mut Vec<String>) {
        rows.push(path.to_string());
        if let Some(node) = self.nodes.get(path) {
            if node.expanded {
                for child in &node.children {
                    self.walk(child, rows);
                }
            }
        }
    }

    /// Every materialized path in depth-first discovery order, expanded or
    /// not. This is the search domain.
    pub fn materialized_paths(&self) -> Vec<String> {
        fn descend(nodes: &HashMap<String, Node>, path: &str, out: &mut Vec<String>) {
            out.push(path.to_string());
            if let Some(node) = nodes.get(path) {
                for child in &node.children {
                    descend(nodes, child, out);
                }
            }
        }
        let mut out = Vec::new();
        descend(&self.nodes, &self.root, &mut out);
        out
    }

    pub fn move_cursor(&mut self, delta: isize) {
        if self.visible.is_empty() {
            return;
        }
        let last = self.visible.len() - 1;
        let next = self.cursor as isize + delta;
        self.cursor = next.clamp(0, last as isize) as usize;
    }

    pub fn jump_to_top(&mut self) {
        self.cursor = 0;
    }

    pub fn jump_to_bottom(&mut self) {
        self.cursor = self.visible.len().saturating_sub(1);
    }

    pub fn jump_to_parent(&mut self) {
        let path = self.current_path().to_string();
        if let Some(parent) = parent_path(&path) {
            if let Some(row) = self.visible.iter().position(|p| p == parent) {
                self.cursor = row;
            }
        }
    }

    /// Move to the next sibling, wrapping past the last back to the first.
    pub fn jump_to_next_sibling(&mut self) {
        let path = self.current_path().to_string();
        let Some(parent) = parent_path(&path) else {
            return;
        };
        let Some(siblings) = self.nodes.get(parent).map(|n| n.children.as_slice()) else {
            return;
        };
        let Some(at) = siblings.iter().position(|p| *p == path) else {
            return;
        };
        let next = siblings[(at + 1) % siblings.len()].clone();
        if let Some(row) = self.visible.iter().position(|p| *p == next) {
            self.cursor = row;
        }
    }

    /// Jump to the next visible row after the cursor whose name contains
    /// `text`, wrapping past the end. Returns false when nothing matches.
    pub fn jump_to_key(&mut self, text: &str) -> bool {
        let n = self.visible.len();
        for step in 1..=n {
            let row = (self.cursor + step) % n;
            let matched = self
                .nodes
                .get(&self.visible[row])
                .is_some_and(|node| node.name.contains(text));
            if matched {
                self.cursor = row;
                return true;
            }
        }
        false
    }

    /// Expand every ancestor of `path` and move the cursor onto it.
    pub fn goto_path(&mut self, store: &dyn DataStore, path: &str) -> Result<()> {
        let target = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        let mut prefix = String::new();
        let components: Vec<&str> = target.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            self.cursor = 0;
            return Ok(());
        }
        self.expand(store, "/")?;
        for component in &components[..components.len() - 1] {
            prefix.push('/');
            prefix.push_str(component);
            self.expand(store, &prefix)?;
        }
        match self.visible.iter().position(|p| *p == target) {
            Some(row) => {
                self.cursor = row;
                Ok(())
            }
            None => Err(TaigaError::path_not_found(&target)),
        }
    }

    /// Freeze `view` as the visible rows until reset or clear.
    pub fn set_filter(&mut self, view: Vec<String>) {
        self.filter = Some(view);
        self.rebuild_visible();
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
        self.rebuild_visible();
    }

    /// Cached attribute lookup for the node at `path`.
    pub fn attributes(&mut self, store: &dyn DataStore, path: &str) -> Result<&Attrs> {
        let node = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| TaigaError::path_not_found(path))?;
        if node.attrs.is_none() {
            node.attrs = Some(store.attributes(path)?);
        }
        Ok(node.attrs.as_ref().expect("attrs just populated"))
    }

    /// Rewrite the forest after a completed rename of `old_path`. The moved
    /// subtree keeps its expansion state and its position among siblings.
    pub fn apply_rename(&mut self, old_path: &str, new_name: &str) {
        let Some(parent) = parent_path(old_path).map(str::to_string) else {
            return;
        };
        let new_path = join_path(&parent, new_name);
        let old_prefix = format!("{}/", old_path);

        let moved: Vec<String> = self
            .nodes
            .keys()
            .filter(|p| *p == old_path || p.starts_with(&old_prefix))
            .cloned()
            .collect();
        for key in moved {
            let mut node = self.nodes.remove(&key).expect("moved key present");
            let rewritten = format!("{}{}", new_path, &key[old_path.len()..]);
            node.path = rewritten.clone();
            node.name = base_name(&rewritten).to_string();
            for child in &mut node.children {
                *child = format!("{}{}", new_path, &child[old_path.len()..]);
            }
            self.nodes.insert(rewritten, node);
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            for child in &mut parent_node.children {
                if child == old_path {
                    *child = new_path.clone();
                }
            }
        }
        if let Some(view) = &mut self.filter {
            for row in view.iter_mut() {
                if *row == old_path || row.starts_with(&old_prefix) {
                    *row = format!("{}{}", new_path, &row[old_path.len()..]);
                }
            }
        }
        self.rebuild_visible();
        if let Some(row) = self.visible.iter().position(|p| *p == new_path) {
            self.cursor = row;
        }
    }

    pub fn dataset_info(&self, path: &str) -> Result<&DatasetInfo> {
        self.nodes
            .get(path)
            .and_then(|n| n.dataset.as_ref())
            .ok_or_else(|| TaigaError::path_not_found(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn fixture() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .add_group("/grp")
            .add_dataset("/grp/inner", ndarray::arr1(&[1.0, 2.0]).into_dyn())
            .add_dataset("/data", ndarray::arr1(&[1.0, 2.0, 3.0]).into_dyn())
            .add_group("/zoo");
        store
    }

    #[test]
    fn open_lists_root_in_discovery_order() {
        let store = fixture();
        let tree = Tree::open(&store).unwrap();
        assert_eq!(tree.visible_rows(), &["/", "/grp", "/data", "/zoo"]);
    }

    #[test]
    fn expand_is_idempotent() {
        let store = fixture();
        let mut tree = Tree::open(&store).unwrap();
        tree.expand(&store, "/grp").unwrap();
        let once = tree.visible_rows().to_vec();
        tree.expand(&store, "/grp").unwrap();
        assert_eq!(tree.visible_rows(), once.as_slice());
    }

    #[test]
    fn expand_on_dataset_fails() {
        let store = fixture();
        let mut tree = Tree::open(&store).unwrap();
        assert!(matches!(
            tree.expand(&store, "/data"),
            Err(TaigaError::NotAGroup { .. })
        ));
    }

    #[test]
    fn collapse_retains_children() {
        let store = fixture();
        let mut tree = Tree::open(&store).unwrap();
        tree.expand(&store, "/grp").unwrap();
        tree.collapse("/grp");
        assert!(tree.node("/grp/inner").is_some());
        assert!(!tree.visible_rows().contains(&"/grp/inner".to_string()));
        // Re-expand shows the retained children again.
        tree.expand(&store, "/grp").unwrap();
        assert!(tree.visible_rows().contains(&"/grp/inner".to_string()));
    }

    #[test]
    fn reset_matches_fresh_open() {
        let store = fixture();
        let mut tree = Tree::open(&store).unwrap();
        tree.expand(&store, "/grp").unwrap();
        tree.set_filter(vec!["/data".to_string()]);
        tree.reset(&store).unwrap();
        let fresh = Tree::open(&store).unwrap();
        assert_eq!(tree.visible_rows(), fresh.visible_rows());
        assert!(!tree.is_filtered());
    }

    #[test]
    fn cursor_moves_clamp_at_edges() {
        let store = fixture();
        let mut tree = Tree::open(&store).unwrap();
        tree.move_cursor(-5);
        assert_eq!(tree.cursor, 0);
        tree.move_cursor(10);
        assert_eq!(tree.current_path(), "/zoo");
        tree.move_cursor(-1);
        assert_eq!(tree.current_path(), "/data");
    }

    #[test]
    fn next_sibling_wraps() {
        let store = fixture();
        let mut tree = Tree::open(&store).unwrap();
        tree.move_cursor(1);
        assert_eq!(tree.current_path(), "/grp");
        tree.jump_to_next_sibling();
        assert_eq!(tree.current_path(), "/data");
        tree.jump_to_next_sibling();
        assert_eq!(tree.current_path(), "/zoo");
        tree.jump_to_next_sibling();
        assert_eq!(tree.current_path(), "/grp");
    }

    #[test]
    fn jump_to_key_wraps_and_reports_misses() {
        let store = fixture();
        let mut tree = Tree::open(&store).unwrap();
        assert!(tree.jump_to_key("zoo"));
        assert_eq!(tree.current_path(), "/zoo");
        // Wraps past the end back to the first match.
        assert!(tree.jump_to_key("grp"));
        assert_eq!(tree.current_path(), "/grp");
        assert!(!tree.jump_to_key("nope"));
        assert_eq!(tree.current_path(), "/grp");
    }

    #[test]
    fn goto_expands_ancestors() {
        let store = fixture();
        let mut tree = Tree::open(&store).unwrap();
        tree.goto_path(&store, "/grp/inner").unwrap();
        assert_eq!(tree.current_path(), "/grp/inner");
        assert!(tree.node("/grp").unwrap().expanded);
    }

    #[test]
    fn rename_rewrites_subtree_in_place() {
        let store = fixture();
        let mut tree = Tree::open(&store).unwrap();
        tree.expand(&store, "/grp").unwrap();
        tree.apply_rename("/grp", "renamed");
        assert!(tree.node("/renamed").is_some());
        assert!(tree.node("/renamed/inner").is_some());
        assert!(tree.node("/grp").is_none());
        // Position among siblings is preserved.
        assert_eq!(
            tree.visible_rows(),
            &["/", "/renamed", "/renamed/inner", "/data", "/zoo"]
        );
        assert_eq!(tree.current_path(), "/renamed");
    }

    #[test]
    fn filter_freezes_view() {
        let store = fixture();
        let mut tree = Tree::open(&store).unwrap();
        tree.set_filter(vec!["/data".to_string(), "/zoo".to_string()]);
        assert_eq!(tree.visible_rows(), &["/data", "/zoo"]);
        tree.clear_filter();
        assert_eq!(tree.visible_rows(), &["/", "/grp", "/data", "/zoo"]);
    }

    #[test]
    fn human_bytes_scales() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.00 KB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.00 MB");
    }
}
