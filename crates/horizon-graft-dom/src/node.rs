//! Element storage for the host document.
//!
//! Nodes live in a [`SlotMap`] arena keyed by [`NodeId`]. Parent and child
//! links are plain keys, so a destroyed node leaves no dangling references:
//! lookups through a stale key simply fail.

use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::error::{DomError, Result};

new_key_type! {
    /// A unique identifier for an element in a [`Document`](crate::Document).
    pub struct NodeId;
}

impl NodeId {
    /// Get the raw u64 representation of this ID.
    pub fn as_raw(&self) -> u64 {
        self.data().as_ffi()
    }

    /// Create a NodeId from a raw u64 value.
    pub fn from_raw(raw: u64) -> Self {
        Self::from(KeyData::from_ffi(raw))
    }
}

/// Per-element data.
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    /// Lowercase tag name.
    pub tag: String,
    /// Attributes in insertion order.
    pub attributes: Vec<(String, String)>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl NodeData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, returning the previous value.
    pub fn set_attribute(&mut self, name: &str, value: String) -> Option<String> {
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.attributes.push((name.to_string(), value));
                None
            }
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(key, _)| key == name)?;
        Some(self.attributes.remove(index).1)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attribute("class")
            .unwrap_or_default()
            .split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }
}

/// The element arena.
pub(crate) struct Tree {
    nodes: SlotMap<NodeId, NodeData>,
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }

    pub fn insert(&mut self, data: NodeData) -> NodeId {
        self.nodes.insert(data)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: NodeId) -> Result<&NodeData> {
        self.nodes.get(id).ok_or(DomError::NodeNotFound(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.nodes.get_mut(id).ok_or(DomError::NodeNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    /// The node followed by each of its ancestors, nearest first.
    pub fn inclusive_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut current = self.parent(id);
        while let Some(ancestor) = current {
            chain.push(ancestor);
            current = self.parent(ancestor);
        }
        chain
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Zero-based position among siblings, and the sibling count.
    ///
    /// A node without a parent is treated as the only child of nothing.
    pub fn sibling_position(&self, id: NodeId) -> (usize, usize) {
        let Some(parent) = self.parent(id).and_then(|p| self.nodes.get(p)) else {
            return (0, 1);
        };
        let index = parent
            .children
            .iter()
            .position(|&child| child == id)
            .unwrap_or(0);
        (index, parent.children.len())
    }

    /// Siblings before `id`, nearest first.
    pub fn previous_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent(id).and_then(|p| self.nodes.get(p)) else {
            return Vec::new();
        };
        let index = parent
            .children
            .iter()
            .position(|&child| child == id)
            .unwrap_or(0);
        parent.children[..index].iter().rev().copied().collect()
    }

    /// Descendants of `scope` (excluding `scope`) in document order.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(scope) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Detach `child` from its parent, if it has one.
    ///
    /// Returns the former parent and the index the child occupied.
    pub fn detach(&mut self, child: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.nodes.get_mut(child)?.parent.take()?;
        let siblings = &mut self.nodes.get_mut(parent)?.children;
        let index = siblings.iter().position(|&c| c == child)?;
        siblings.remove(index);
        Some((parent, index))
    }

    /// Free `id` and all of its descendants. The node must already be
    /// detached.
    pub fn free_subtree(&mut self, id: NodeId) -> usize {
        let mut freed = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
                freed += 1;
            }
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> (Tree, NodeId, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new();
        let root = tree.insert(NodeData::new("DIV"));
        let a = tree.insert(NodeData::new("span"));
        let b = tree.insert(NodeData::new("span"));
        let c = tree.insert(NodeData::new("em"));
        for (parent, child) in [(root, a), (root, b), (a, c)] {
            tree.get_mut(child).unwrap().parent = Some(parent);
            tree.get_mut(parent).unwrap().children.push(child);
        }
        (tree, root, a, b, c)
    }

    #[test]
    fn test_tag_is_lowercased() {
        let (tree, root, ..) = small_tree();
        assert_eq!(tree.get(root).unwrap().tag, "div");
    }

    #[test]
    fn test_descendants_in_document_order() {
        let (tree, root, a, b, c) = small_tree();
        assert_eq!(tree.descendants(root), vec![a, c, b]);
        assert!(tree.descendants(b).is_empty());
    }

    #[test]
    fn test_ancestry_helpers() {
        let (tree, root, a, b, c) = small_tree();
        assert_eq!(tree.inclusive_ancestors(c), vec![c, a, root]);
        assert!(tree.is_inclusive_ancestor(root, c));
        assert!(!tree.is_inclusive_ancestor(b, c));
        assert_eq!(tree.sibling_position(b), (1, 2));
        assert_eq!(tree.previous_siblings(b), vec![a]);
    }

    #[test]
    fn test_detach_and_free() {
        let (mut tree, root, a, _b, c) = small_tree();
        assert_eq!(tree.detach(a), Some((root, 0)));
        assert_eq!(tree.detach(a), None);
        assert_eq!(tree.free_subtree(a), 2);
        assert!(tree.get(c).is_err());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_attributes_and_classes() {
        let mut node = NodeData::new("tr");
        assert_eq!(node.set_attribute("class", "zA  x7".into()), None);
        assert_eq!(node.set_attribute("class", "zA x7 yO".into()).as_deref(), Some("zA  x7"));
        assert!(node.has_class("x7"));
        assert!(!node.has_class("x"));
        assert_eq!(node.remove_attribute("class").as_deref(), Some("zA x7 yO"));
        assert_eq!(node.attribute("class"), None);
    }

    #[test]
    fn test_node_id_raw_roundtrip() {
        let (_, root, ..) = small_tree();
        assert_eq!(NodeId::from_raw(root.as_raw()), root);
    }
}
