use std::fmt;

use crate::fs::path::TargetKind;
use crate::providers::tree_data::TreeNodeData;

/// Label of the placeholder shown under a directory that listed no children.
pub const EMPTY_LABEL: &str = "<empty>";
/// Label of the placeholder shown under a directory that failed to list.
pub const ERROR_LABEL: &str = "<error>";

/// Load status of a node's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Children not requested yet.
    Null,
    /// Request in flight.
    Loading,
    /// Children materialized (possibly a single placeholder).
    Loaded,
}

/// Real backend entry or display-only placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Normal,
    /// Non-expandable placeholder carrying no backend data.
    Fake,
}

/// Stable reference to a tree node.
///
/// A removed node's slot may be reused, but its generation changes, so a
/// stale id never resolves to the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Per-node state: kind, status and either backend data or a fake label.
#[derive(Debug, Clone)]
pub struct ExtNodeData {
    kind: NodeKind,
    status: NodeStatus,
    data: Option<TreeNodeData>,
    label: String,
}

impl ExtNodeData {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Backend data; `None` for fake nodes.
    pub fn node_data(&self) -> Option<&TreeNodeData> {
        self.data.as_ref()
    }

    pub fn label(&self) -> &str {
        match &self.data {
            Some(data) => data.label(),
            None => &self.label,
        }
    }
}

impl fmt::Display for ExtNodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug)]
struct TreeNode {
    children: Vec<NodeId>,
    ext: ExtNodeData,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<TreeNode>,
}

/// A visible row of the tree, in depth-first order.
#[derive(Debug, Clone)]
pub struct FlatItem {
    pub label: String,
    pub depth: usize,
    pub status: NodeStatus,
    /// `None` for fake nodes.
    pub target: Option<TargetKind>,
    pub is_last_sibling: bool,
}

/// Lazily populated tree backed by an arena of generation-checked slots.
///
/// All mutation happens on the interactive thread; a callback holding a
/// `NodeId` checks [`DirTreeModel::contains_node`] before touching the node.
#[derive(Debug)]
pub struct DirTreeModel {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Default for DirTreeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DirTreeModel {
    /// Create a model holding only a fake, loaded root.
    pub fn new() -> Self {
        let mut model = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        model.root = model.alloc(TreeNode {
            children: Vec::new(),
            ext: fake_data(""),
        });
        model
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Whether `id` still refers to a node attached to this tree.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn ext_data(&self, id: NodeId) -> Option<&ExtNodeData> {
        self.node(id).map(|n| &n.ext)
    }

    /// Children of `id`; empty for unknown ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Update a node's status. Returns false if the node is gone.
    pub fn set_status(&mut self, id: NodeId, status: NodeStatus) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.ext.status = status;
                true
            }
            None => false,
        }
    }

    /// Append an unloaded directory-like child with one placeholder below it.
    pub fn add_null_dir_child(&mut self, parent: NodeId, data: TreeNodeData) -> Option<NodeId> {
        let ext = ExtNodeData {
            kind: NodeKind::Normal,
            status: NodeStatus::Null,
            data: Some(data),
            label: String::new(),
        };
        let dir = self.add_child(parent, ext)?;
        self.add_child(dir, fake_data(""));
        Some(dir)
    }

    /// Append a loaded leaf for a file.
    pub fn add_file_child(&mut self, parent: NodeId, data: TreeNodeData) -> Option<NodeId> {
        let ext = ExtNodeData {
            kind: NodeKind::Normal,
            status: NodeStatus::Loaded,
            data: Some(data),
            label: String::new(),
        };
        self.add_child(parent, ext)
    }

    /// Append a placeholder such as [`EMPTY_LABEL`] or [`ERROR_LABEL`].
    pub fn add_fake_child(&mut self, parent: NodeId, label: &str) -> Option<NodeId> {
        self.add_child(parent, fake_data(label))
    }

    /// Detach and free every descendant of `id`.
    pub fn remove_all_children(&mut self, id: NodeId) {
        let children = match self.node_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        let mut stack = children;
        while let Some(child) = stack.pop() {
            if let Some(node) = self.release(child) {
                stack.extend(node.children);
            }
        }
    }

    /// Depth-first visible rows below the root.
    ///
    /// The root itself and placeholders under not-yet-loaded nodes are
    /// skipped; depth 0 is a direct child of the root.
    pub fn flatten(&self) -> Vec<FlatItem> {
        let mut items = Vec::new();
        let children = self.children(self.root);
        for (i, child) in children.iter().enumerate() {
            self.flatten_node(*child, 0, i == children.len() - 1, &mut items);
        }
        items
    }

    fn flatten_node(&self, id: NodeId, depth: usize, is_last: bool, items: &mut Vec<FlatItem>) {
        let Some(node) = self.node(id) else {
            return;
        };
        items.push(FlatItem {
            label: node.ext.label().to_string(),
            depth,
            status: node.ext.status,
            target: node.ext.data.as_ref().map(|d| d.target_kind()),
            is_last_sibling: is_last,
        });
        if node.ext.status != NodeStatus::Loaded {
            return;
        }
        for (i, child) in node.children.iter().enumerate() {
            self.flatten_node(*child, depth + 1, i == node.children.len() - 1, items);
        }
    }

    /// Find a direct child of `parent` by its display label.
    pub fn find_child(&self, parent: NodeId, label: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.ext_data(*c).is_some_and(|ext| ext.label() == label))
    }

    fn add_child(&mut self, parent: NodeId, ext: ExtNodeData) -> Option<NodeId> {
        if !self.contains_node(parent) {
            return None;
        }
        let id = self.alloc(TreeNode {
            children: Vec::new(),
            ext,
        });
        if let Some(node) = self.node_mut(parent) {
            node.children.push(id);
        }
        Some(id)
    }

    fn alloc(&mut self, node: TreeNode) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    fn release(&mut self, id: NodeId) -> Option<TreeNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }
}

fn fake_data(label: &str) -> ExtNodeData {
    ExtNodeData {
        kind: NodeKind::Fake,
        status: NodeStatus::Loaded,
        data: None,
        label: label.to_string(),
    }
}
