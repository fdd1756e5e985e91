//! The host document.
//!
//! A [`Document`] is a headless element tree standing in for the live page
//! the reconciliation engine is injected into. It supports just what the
//! engine reads and writes: structure, attributes, classes, inline style,
//! selector queries, and change notification through
//! [`MutationObserver`](crate::MutationObserver)s.
//!
//! # Thread Safety
//!
//! `Document` is a cheap, clonable handle. The tree sits behind a
//! `parking_lot::RwLock`; no lock is held while observers are notified.
//!
//! # Example
//!
//! ```
//! use horizon_graft_core::EventLoop;
//! use horizon_graft_dom::Document;
//!
//! let doc = Document::new(EventLoop::new());
//! let table = doc.create_element("table");
//! doc.set_attribute(table, "class", "cf").unwrap();
//! doc.append_child(doc.body(), table).unwrap();
//!
//! let found = doc.query_selector(doc.root(), "body > table.cf").unwrap();
//! assert_eq!(found, Some(table));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use horizon_graft_core::EventLoop;
use parking_lot::{Mutex, RwLock};

use crate::error::{DomError, Result};
use crate::node::{NodeData, NodeId, Tree};
use crate::observer::{self, ObserverRegistry, PendingMutation};
use crate::selector::{matches_list, parse_selector_list, SelectorList};
use crate::style;

struct DocumentInner {
    tree: RwLock<Tree>,
    observers: Mutex<ObserverRegistry>,
    /// Parsed selectors by source text.
    selectors: Mutex<HashMap<String, Arc<SelectorList>>>,
    event_loop: EventLoop,
    root: NodeId,
    body: NodeId,
}

/// A headless host document.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl Document {
    /// Create an empty document (`<html><body></body></html>`) driven by
    /// `event_loop`.
    pub fn new(event_loop: EventLoop) -> Self {
        let mut tree = Tree::new();
        let root = tree.insert(NodeData::new("html"));
        let mut body_data = NodeData::new("body");
        body_data.parent = Some(root);
        let body = tree.insert(body_data);
        if let Ok(root_data) = tree.get_mut(root) {
            root_data.children.push(body);
        }

        Self {
            inner: Arc::new(DocumentInner {
                tree: RwLock::new(tree),
                observers: Mutex::new(ObserverRegistry::default()),
                selectors: Mutex::new(HashMap::new()),
                event_loop,
                root,
                body,
            }),
        }
    }

    /// The event loop observers deliver on.
    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    /// The document element.
    pub fn root(&self) -> NodeId {
        self.inner.root
    }

    /// The body element.
    pub fn body(&self) -> NodeId {
        self.inner.body
    }

    pub(crate) fn observers(&self) -> &Mutex<ObserverRegistry> {
        &self.inner.observers
    }

    /// Whether two handles refer to the same document.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run a closure with read access to the tree.
    fn with_tree<R>(&self, f: impl FnOnce(&Tree) -> Result<R>) -> Result<R> {
        let tree = self.inner.tree.read();
        f(&tree)
    }

    fn dispatch(&self, mutations: Vec<PendingMutation>) {
        observer::dispatch(&self.inner.observers, mutations);
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.inner.tree.write().insert(NodeData::new(tag))
    }

    /// Create a detached element with attributes already set.
    ///
    /// No mutation records are produced.
    pub fn create_element_with(&self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let mut data = NodeData::new(tag);
        for (name, value) in attributes {
            data.set_attribute(&name.to_ascii_lowercase(), value.to_string());
        }
        self.inner.tree.write().insert(data)
    }

    /// Whether the node exists.
    pub fn exists(&self, node: NodeId) -> bool {
        self.inner.tree.read().contains_node(node)
    }

    /// Number of live elements, attached or not.
    pub fn node_count(&self) -> usize {
        self.inner.tree.read().len()
    }

    /// Lowercase tag name.
    pub fn tag_name(&self, node: NodeId) -> Result<String> {
        self.with_tree(|tree| Ok(tree.get(node)?.tag.clone()))
    }

    /// Append `child` as the last child of `parent`, moving it if it is
    /// already attached somewhere.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` into `parent` before `reference` (or last, if `None`).
    pub fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<()> {
        let mutations = {
            let mut tree = self.inner.tree.write();
            tree.get(parent)?;
            tree.get(child)?;
            if tree.is_inclusive_ancestor(child, parent) {
                return Err(DomError::HierarchyRequest { parent, child });
            }
            if let Some(reference) = reference {
                if tree.parent(reference) != Some(parent) {
                    return Err(DomError::NotAChild {
                        parent,
                        child: reference,
                    });
                }
                if reference == child {
                    return Ok(());
                }
            }

            let mut mutations = Vec::with_capacity(2);
            if let Some((old_parent, _)) = tree.detach(child) {
                mutations.push(PendingMutation::child_list(
                    &tree,
                    old_parent,
                    Vec::new(),
                    vec![child],
                ));
            }

            let siblings = &mut tree.get_mut(parent)?.children;
            let index = reference
                .and_then(|reference| siblings.iter().position(|&c| c == reference))
                .unwrap_or(siblings.len());
            siblings.insert(index, child);
            tree.get_mut(child)?.parent = Some(parent);

            mutations.push(PendingMutation::child_list(&tree, parent, vec![child], Vec::new()));
            mutations
        };

        tracing::trace!(target: "horizon_graft_dom::document", ?parent, ?child, "inserted element");
        self.dispatch(mutations);
        Ok(())
    }

    /// Remove `child` from `parent`.
    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let mutation = {
            let mut tree = self.inner.tree.write();
            tree.get(parent)?;
            tree.get(child)?;
            if tree.parent(child) != Some(parent) {
                return Err(DomError::NotAChild { parent, child });
            }
            tree.detach(child);
            PendingMutation::child_list(&tree, parent, Vec::new(), vec![child])
        };

        tracing::trace!(target: "horizon_graft_dom::document", ?parent, ?child, "removed element");
        self.dispatch(vec![mutation]);
        Ok(())
    }

    /// Detach `node` from its parent. Detached nodes are left alone.
    pub fn remove(&self, node: NodeId) -> Result<()> {
        match self.parent(node)? {
            Some(parent) => self.remove_child(parent, node),
            None => Ok(()),
        }
    }

    /// Detach `node` and free it along with its whole subtree.
    ///
    /// Later lookups through any freed ID fail with
    /// [`DomError::NodeNotFound`].
    pub fn destroy(&self, node: NodeId) -> Result<()> {
        self.remove(node)?;
        let freed = self.inner.tree.write().free_subtree(node);
        tracing::trace!(target: "horizon_graft_dom::document", ?node, freed, "destroyed subtree");
        Ok(())
    }

    /// The parent element, if attached.
    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>> {
        self.with_tree(|tree| Ok(tree.get(node)?.parent))
    }

    /// Child elements in order.
    pub fn children(&self, node: NodeId) -> Result<Vec<NodeId>> {
        self.with_tree(|tree| Ok(tree.get(node)?.children.clone()))
    }

    /// The first child element.
    pub fn first_element_child(&self, node: NodeId) -> Result<Option<NodeId>> {
        self.with_tree(|tree| Ok(tree.get(node)?.children.first().copied()))
    }

    /// The ancestor `depth` levels up (`0` is the node itself, `1` its
    /// parent).
    pub fn ancestor(&self, node: NodeId, depth: usize) -> Result<Option<NodeId>> {
        self.with_tree(|tree| {
            tree.get(node)?;
            Ok(tree.inclusive_ancestors(node).get(depth).copied())
        })
    }

    /// Whether the node is attached to the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let tree = self.inner.tree.read();
        tree.contains_node(node) && tree.is_inclusive_ancestor(self.inner.root, node)
    }

    /// Whether `node` is `ancestor` or lies below it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let tree = self.inner.tree.read();
        tree.contains_node(node) && tree.is_inclusive_ancestor(ancestor, node)
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Get an attribute value.
    pub fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>> {
        let name = name.to_ascii_lowercase();
        self.with_tree(|tree| Ok(tree.get(node)?.attribute(&name).map(str::to_string)))
    }

    /// All attributes, in the order they were first set.
    pub fn attributes(&self, node: NodeId) -> Result<Vec<(String, String)>> {
        self.with_tree(|tree| Ok(tree.get(node)?.attributes.clone()))
    }

    /// Set an attribute value.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: impl Into<String>) -> Result<()> {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        let mutation = {
            let mut tree = self.inner.tree.write();
            let old_value = tree.get_mut(node)?.set_attribute(&name, value.clone());
            PendingMutation::attribute(&tree, node, name, old_value, Some(value))
        };
        self.dispatch(vec![mutation]);
        Ok(())
    }

    /// Remove an attribute. Removing an absent attribute changes nothing.
    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<()> {
        let name = name.to_ascii_lowercase();
        let mutation = {
            let mut tree = self.inner.tree.write();
            match tree.get_mut(node)?.remove_attribute(&name) {
                Some(old_value) => Some(PendingMutation::attribute(
                    &tree,
                    node,
                    name,
                    Some(old_value),
                    None,
                )),
                None => None,
            }
        };
        if let Some(mutation) = mutation {
            self.dispatch(vec![mutation]);
        }
        Ok(())
    }

    /// The element's classes, in attribute order.
    pub fn class_list(&self, node: NodeId) -> Result<Vec<String>> {
        self.with_tree(|tree| Ok(tree.get(node)?.classes().map(str::to_string).collect()))
    }

    /// Whether the element carries `class`.
    pub fn has_class(&self, node: NodeId, class: &str) -> Result<bool> {
        self.with_tree(|tree| Ok(tree.get(node)?.has_class(class)))
    }

    /// Add a class. Returns `true` if it was not already present.
    pub fn add_class(&self, node: NodeId, class: &str) -> Result<bool> {
        self.update_classes(node, |classes| {
            if classes.iter().any(|c| c == class) {
                false
            } else {
                classes.push(class.to_string());
                true
            }
        })
    }

    /// Remove a class. Returns `true` if it was present.
    pub fn remove_class(&self, node: NodeId, class: &str) -> Result<bool> {
        self.update_classes(node, |classes| {
            let before = classes.len();
            classes.retain(|c| c != class);
            classes.len() != before
        })
    }

    /// Toggle a class, or force it on/off. Returns whether the class is
    /// present afterwards.
    pub fn toggle_class(&self, node: NodeId, class: &str, force: Option<bool>) -> Result<bool> {
        let present = self.has_class(node, class)?;
        let wanted = force.unwrap_or(!present);
        if wanted {
            self.add_class(node, class)?;
        } else {
            self.remove_class(node, class)?;
        }
        Ok(wanted)
    }

    /// Rewrite the class attribute if `update` reports a change.
    fn update_classes(
        &self,
        node: NodeId,
        update: impl FnOnce(&mut Vec<String>) -> bool,
    ) -> Result<bool> {
        let mut classes = self.class_list(node)?;
        if !update(&mut classes) {
            return Ok(false);
        }
        self.set_attribute(node, "class", classes.join(" "))?;
        Ok(true)
    }

    // =========================================================================
    // Inline style
    // =========================================================================

    /// Get one property from the inline `style` attribute, without its
    /// `!important` priority.
    pub fn style_property(&self, node: NodeId, property: &str) -> Result<Option<String>> {
        let property = property.to_ascii_lowercase();
        let css = self.attribute(node, "style")?.unwrap_or_default();
        Ok(style::parse_declarations(&css)
            .into_iter()
            .find(|declaration| declaration.name == property)
            .map(|declaration| declaration.value))
    }

    /// Set one property in the inline `style` attribute. Any priority the
    /// property had is dropped.
    pub fn set_style_property(&self, node: NodeId, property: &str, value: &str) -> Result<()> {
        let css = self.attribute(node, "style")?.unwrap_or_default();
        let mut declarations = style::parse_declarations(&css);
        style::upsert(
            &mut declarations,
            style::Declaration::new(property.to_ascii_lowercase(), value.trim()),
        );
        self.set_attribute(node, "style", style::serialize_declarations(&declarations))
    }

    /// Remove one property from the inline `style` attribute.
    pub fn remove_style_property(&self, node: NodeId, property: &str) -> Result<()> {
        let property = property.to_ascii_lowercase();
        let Some(css) = self.attribute(node, "style")? else {
            return Ok(());
        };
        let mut declarations = style::parse_declarations(&css);
        let before = declarations.len();
        declarations.retain(|declaration| declaration.name != property);
        if declarations.len() == before {
            return Ok(());
        }
        if declarations.is_empty() {
            self.remove_attribute(node, "style")
        } else {
            self.set_attribute(node, "style", style::serialize_declarations(&declarations))
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Parse a selector, reusing an earlier parse of the same text.
    pub fn parse_selector(&self, selector: &str) -> Result<Arc<SelectorList>> {
        if let Some(parsed) = self.inner.selectors.lock().get(selector) {
            return Ok(parsed.clone());
        }
        let parsed = Arc::new(parse_selector_list(selector)?);
        self.inner
            .selectors
            .lock()
            .insert(selector.to_string(), parsed.clone());
        Ok(parsed)
    }

    /// All descendants of `scope` matching `selector`, in document order.
    pub fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        let list = self.parse_selector(selector)?;
        self.with_tree(|tree| {
            tree.get(scope)?;
            Ok(tree
                .descendants(scope)
                .into_iter()
                .filter(|&node| matches_list(tree, node, &list))
                .collect())
        })
    }

    /// The first descendant of `scope` matching `selector`.
    pub fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>> {
        let list = self.parse_selector(selector)?;
        self.with_tree(|tree| {
            tree.get(scope)?;
            Ok(tree
                .descendants(scope)
                .into_iter()
                .find(|&node| matches_list(tree, node, &list)))
        })
    }

    /// Like [`query_selector`](Self::query_selector), but a missing match is
    /// [`DomError::NoMatch`].
    pub fn query_selector_or_fail(&self, scope: NodeId, selector: &str) -> Result<NodeId> {
        self.query_selector(scope, selector)?
            .ok_or_else(|| DomError::no_match(selector))
    }

    /// Whether `node` itself matches `selector`.
    pub fn matches(&self, node: NodeId, selector: &str) -> Result<bool> {
        let list = self.parse_selector(selector)?;
        self.with_tree(|tree| {
            tree.get(node)?;
            Ok(matches_list(tree, node, &list))
        })
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.inner.root)
            .field("nodes", &self.node_count())
            .field("observers", &self.inner.observers.lock().len())
            .finish()
    }
}

static_assertions::assert_impl_all!(Document: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(EventLoop::new())
    }

    #[test]
    fn test_new_document_shape() {
        let doc = doc();
        assert_eq!(doc.tag_name(doc.root()).unwrap(), "html");
        assert_eq!(doc.children(doc.root()).unwrap(), vec![doc.body()]);
        assert!(doc.is_connected(doc.body()));
    }

    #[test]
    fn test_insert_before_and_move() {
        let doc = doc();
        let list = doc.create_element("ul");
        let a = doc.create_element("li");
        let b = doc.create_element("li");
        let c = doc.create_element("li");
        doc.append_child(list, a).unwrap();
        doc.append_child(list, c).unwrap();
        doc.insert_before(list, b, Some(c)).unwrap();
        assert_eq!(doc.children(list).unwrap(), vec![a, b, c]);

        // Moving within the same parent
        doc.insert_before(list, c, Some(a)).unwrap();
        assert_eq!(doc.children(list).unwrap(), vec![c, a, b]);

        let other = doc.create_element("ol");
        doc.append_child(other, a).unwrap();
        assert_eq!(doc.children(list).unwrap(), vec![c, b]);
        assert_eq!(doc.parent(a).unwrap(), Some(other));
    }

    #[test]
    fn test_hierarchy_errors() {
        let doc = doc();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner).unwrap();

        assert_eq!(
            doc.append_child(inner, outer),
            Err(DomError::HierarchyRequest {
                parent: inner,
                child: outer
            })
        );
        assert!(matches!(
            doc.append_child(outer, outer),
            Err(DomError::HierarchyRequest { .. })
        ));

        let stranger = doc.create_element("span");
        assert_eq!(
            doc.remove_child(outer, stranger),
            Err(DomError::NotAChild {
                parent: outer,
                child: stranger
            })
        );
        assert!(matches!(
            doc.insert_before(outer, stranger, Some(stranger)),
            Err(DomError::NotAChild { .. })
        ));
    }

    #[test]
    fn test_destroy_frees_subtree() {
        let doc = doc();
        let table = doc.create_element("table");
        let body = doc.create_element("tbody");
        doc.append_child(doc.body(), table).unwrap();
        doc.append_child(table, body).unwrap();
        let before = doc.node_count();

        doc.destroy(table).unwrap();

        assert_eq!(doc.node_count(), before - 2);
        assert!(doc.children(doc.body()).unwrap().is_empty());
        assert_eq!(doc.parent(body), Err(DomError::NodeNotFound(body)));
        assert!(!doc.exists(table));
    }

    #[test]
    fn test_ancestor_and_contains() {
        let doc = doc();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        doc.append_child(doc.body(), a).unwrap();
        doc.append_child(a, b).unwrap();

        assert_eq!(doc.ancestor(b, 0).unwrap(), Some(b));
        assert_eq!(doc.ancestor(b, 2).unwrap(), Some(doc.body()));
        assert_eq!(doc.ancestor(b, 3).unwrap(), Some(doc.root()));
        assert_eq!(doc.ancestor(b, 4).unwrap(), None);
        assert!(doc.contains(a, b));
        assert!(!doc.contains(b, a));

        let loose = doc.create_element("p");
        assert!(!doc.is_connected(loose));
    }

    #[test]
    fn test_classes() {
        let doc = doc();
        let row = doc.create_element_with("tr", &[("class", "zA yO")]);

        assert!(doc.add_class(row, "x7").unwrap());
        assert!(!doc.add_class(row, "x7").unwrap());
        assert_eq!(doc.class_list(row).unwrap(), vec!["zA", "yO", "x7"]);

        assert!(doc.remove_class(row, "yO").unwrap());
        assert!(!doc.remove_class(row, "yO").unwrap());
        assert_eq!(doc.attribute(row, "class").unwrap().as_deref(), Some("zA x7"));

        assert!(!doc.toggle_class(row, "x7", None).unwrap());
        assert!(doc.toggle_class(row, "x7", Some(true)).unwrap());
        assert!(doc.has_class(row, "x7").unwrap());
    }

    #[test]
    fn test_style_properties() {
        let doc = doc();
        let col = doc.create_element_with("col", &[("style", "width: 20px")]);

        assert_eq!(doc.style_property(col, "width").unwrap().as_deref(), Some("20px"));
        doc.set_style_property(col, "width", "50px").unwrap();
        doc.set_style_property(col, "display", "none").unwrap();
        assert_eq!(
            doc.attribute(col, "style").unwrap().as_deref(),
            Some("width: 50px; display: none;")
        );

        doc.remove_style_property(col, "width").unwrap();
        doc.remove_style_property(col, "display").unwrap();
        assert_eq!(doc.attribute(col, "style").unwrap(), None);
        assert_eq!(doc.style_property(col, "width").unwrap(), None);
    }

    #[test]
    fn test_style_priority_kept_apart_from_value() {
        let doc = doc();
        let col = doc.create_element_with("col", &[("style", "width: 80px !important; top: 0")]);

        assert_eq!(doc.style_property(col, "width").unwrap().as_deref(), Some("80px"));
        doc.set_style_property(col, "top", "4px").unwrap();
        assert_eq!(
            doc.attribute(col, "style").unwrap().as_deref(),
            Some("width: 80px !important; top: 4px;")
        );
        doc.set_style_property(col, "width", "90px").unwrap();
        assert_eq!(
            doc.attribute(col, "style").unwrap().as_deref(),
            Some("width: 90px; top: 4px;")
        );
    }

    #[test]
    fn test_queries_scoped_to_descendants() {
        let doc = doc();
        let section = doc.create_element_with("div", &[("class", "Cp")]);
        let table = doc.create_element("table");
        let tbody = doc.create_element("tbody");
        doc.append_child(doc.body(), section).unwrap();
        doc.append_child(section, table).unwrap();
        doc.append_child(table, tbody).unwrap();

        assert_eq!(
            doc.query_selector(section, "table > tbody").unwrap(),
            Some(tbody)
        );
        // The left-hand part may match above the scope.
        assert_eq!(
            doc.query_selector_all(table, "div.Cp tbody").unwrap(),
            vec![tbody]
        );
        // The scope itself is never a result.
        assert_eq!(doc.query_selector(table, "table").unwrap(), None);

        assert_eq!(
            doc.query_selector_or_fail(tbody, "tr"),
            Err(DomError::no_match("tr"))
        );
        assert!(doc.matches(section, "div.Cp").unwrap());
        assert!(matches!(
            doc.query_selector(section, "div >"),
            Err(DomError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_selector_cache_returns_same_parse() {
        let doc = doc();
        let first = doc.parse_selector("tr.zA").unwrap();
        let second = doc.parse_selector("tr.zA").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
