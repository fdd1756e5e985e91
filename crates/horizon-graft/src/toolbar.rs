//! Toolbar discovery and binding.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use horizon_graft_dom::{Document, NodeId};

use crate::config::ToolbarConfig;
use crate::error::Result;

/// The toolbar that belongs to a row list.
///
/// While bound, the toolbar element carries the configured marker class.
/// Clones share the binding.
#[derive(Clone)]
pub struct ToolbarBinding {
    inner: Arc<ToolbarInner>,
}

struct ToolbarInner {
    document: Document,
    element: NodeId,
    marker_class: String,
    destroyed: AtomicBool,
}

impl ToolbarBinding {
    /// Find the toolbar for the row list rooted at `container`.
    ///
    /// The toolbar is looked up inside the container first. Failing that,
    /// every toolbar container in the document is considered whose
    /// grandparent is either the container's parent or the container's
    /// ancestor `ancestor_depth` levels up. Finding nothing is not an error.
    pub(crate) fn discover(
        document: &Document,
        container: NodeId,
        config: &ToolbarConfig,
    ) -> Result<Option<Self>> {
        let found = match document.query_selector(container, &config.toolbar_selector)? {
            Some(toolbar) => Some(toolbar),
            None => find_near(document, container, config)?,
        };
        let Some(element) = found else {
            tracing::debug!(target: "horizon_graft::row_list", ?container, "no toolbar found");
            return Ok(None);
        };

        document.add_class(element, &config.marker_class)?;
        tracing::debug!(target: "horizon_graft::row_list", ?element, "toolbar bound");
        Ok(Some(Self {
            inner: Arc::new(ToolbarInner {
                document: document.clone(),
                element,
                marker_class: config.marker_class.clone(),
                destroyed: AtomicBool::new(false),
            }),
        }))
    }

    /// The toolbar element.
    pub fn element(&self) -> NodeId {
        self.inner.element
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Release the toolbar, removing the marker class. Safe to call more
    /// than once, and after the host page has removed the element.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = &self.inner;
        if inner.document.exists(inner.element) {
            if let Err(err) = inner.document.remove_class(inner.element, &inner.marker_class) {
                tracing::warn!(target: "horizon_graft::row_list", error = %err, "failed to unmark toolbar");
            }
        }
    }
}

impl std::fmt::Debug for ToolbarBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolbarBinding")
            .field("element", &self.inner.element)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

fn find_near(
    document: &Document,
    container: NodeId,
    config: &ToolbarConfig,
) -> Result<Option<NodeId>> {
    let anchors = [
        document.ancestor(container, config.ancestor_depth)?,
        document.parent(container)?,
    ];
    for candidate in document.query_selector_all(document.root(), &config.toolbar_container_selector)? {
        let grandparent = document.ancestor(candidate, 2)?;
        if grandparent.is_none() || !anchors.contains(&grandparent) {
            continue;
        }
        if let Some(toolbar) = document.query_selector(candidate, &config.toolbar_selector)? {
            return Ok(Some(toolbar));
        }
    }
    Ok(None)
}
