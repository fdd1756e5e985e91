//! The row list driver.
//!
//! A [`RowListDriver`] attaches to one row list element of the host page and
//! wires the whole pipeline:
//!
//! ```text
//! table section blocks ──watch_children──▶ table sections
//!     table section ──harmonize widths, find body──▶ watch_children(body)
//!         row element ──filter, construct──▶ RowHandle (pending)
//!             ──readiness──▶ row_ready
//! selection bridge (class changes) ──▶ selected set ──▶ selection_changed
//! expand_column requests ──▶ one column pass per animation frame
//! ```
//!
//! Every subscription created along the way is gated on the driver's
//! [`Stopper`], so [`RowListDriver::destroy`] leaves nothing running.
//!
//! # Example
//!
//! ```
//! use horizon_graft::{RowListConfig, RowListDriver};
//! use horizon_graft_core::EventLoop;
//! use horizon_graft_dom::Document;
//!
//! let event_loop = EventLoop::new();
//! let doc = Document::new(event_loop.clone());
//! let list = doc.create_element("div");
//! let block = doc.create_element_with("div", &[("class", "Cp")]);
//! doc.append_child(doc.body(), list).unwrap();
//! doc.append_child(list, block).unwrap();
//!
//! let driver = RowListDriver::new(&doc, list, RowListConfig::default()).unwrap();
//! driver.row_ready().connect(|row| println!("row {} is ready", row.id()));
//!
//! event_loop.run_until_idle().unwrap();
//! driver.destroy();
//! assert!(driver.is_destroyed());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use horizon_graft_core::{Signal, Stopper};
use horizon_graft_dom::{Document, DomError, NodeId};
use parking_lot::Mutex;

use crate::bridge::{MutationBridge, MutationEvent, WatchOptions};
use crate::child_stream::{ChildEvent, watch_children};
use crate::columns::ColumnCoordinator;
use crate::config::RowListConfig;
use crate::error::{GraftError, Result};
use crate::lifecycle::RowLifecycle;
use crate::row::{RowHandle, RowState};
use crate::selection::SelectionTracker;
use crate::toolbar::ToolbarBinding;

/// Reconciles one row list element of the host page with a live set of
/// [`RowHandle`]s.
///
/// Dropping the driver destroys it.
pub struct RowListDriver {
    inner: Arc<DriverInner>,
}

pub(crate) struct DriverInner {
    document: Document,
    element: NodeId,
    config: Arc<RowListConfig>,
    stopper: Stopper,
    lifecycle: RowLifecycle,
    selection: SelectionTracker,
    columns: ColumnCoordinator,
    selection_bridge: MutationBridge,
    toolbar: Mutex<Option<ToolbarBinding>>,
    destroyed: AtomicBool,
    row_ready: Signal<RowHandle>,
    row_removed: Signal<RowHandle>,
    destroyed_signal: Signal<()>,
}

impl RowListDriver {
    /// Attach to `element` and start watching it.
    ///
    /// Rows already on the page are picked up right away; they become ready
    /// no earlier than the next microtask, so signals connected right after
    /// this returns see every row.
    #[tracing::instrument(skip_all, target = "horizon_graft::row_list", level = "debug", fields(element = ?element))]
    pub fn new(document: &Document, element: NodeId, config: RowListConfig) -> Result<Self> {
        config.validate()?;
        if !document.exists(element) {
            return Err(DomError::NodeNotFound(element).into());
        }
        let config = Arc::new(config);
        let stopper = Stopper::new();

        let inner = Arc::new_cyclic(|weak: &Weak<DriverInner>| {
            // Registered before any component so that stopping the driver's
            // stopper directly tears down in the same order as `destroy`.
            let teardown = weak.clone();
            stopper.on_stop(move || {
                if let Some(driver) = teardown.upgrade() {
                    driver.destroy();
                }
            });

            let weak = weak.clone();
            let selection_bridge = MutationBridge::new(document, move |events| {
                if let Some(driver) = weak.upgrade() {
                    driver.on_selection_events(&events);
                }
            });
            DriverInner {
                document: document.clone(),
                element,
                lifecycle: RowLifecycle::new(document, config.clone()),
                selection: SelectionTracker::new(
                    document.event_loop().clone(),
                    &config.selected_class,
                    &stopper,
                ),
                columns: ColumnCoordinator::new(document, element, config.clone(), &stopper),
                selection_bridge,
                toolbar: Mutex::new(None),
                destroyed: AtomicBool::new(false),
                row_ready: Signal::new(),
                row_removed: Signal::new(),
                destroyed_signal: Signal::new(),
                config,
                stopper,
            }
        });
        inner.selection_bridge.gate(&inner.stopper);

        let driver = Self { inner };
        let toolbar = ToolbarBinding::discover(document, element, &driver.inner.config.toolbar)?;
        *driver.inner.toolbar.lock() = toolbar;
        driver.inner.watch_sections()?;
        tracing::debug!(
            target: "horizon_graft::row_list",
            rows = driver.inner.lifecycle.len(),
            "row list attached"
        );
        Ok(driver)
    }

    /// The row list element.
    pub fn element(&self) -> NodeId {
        self.inner.element
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn config(&self) -> &RowListConfig {
        &self.inner.config
    }

    /// Ready rows in the order they were delivered.
    pub fn rows(&self) -> Vec<RowHandle> {
        self.inner.lifecycle.ready_rows()
    }

    /// Selected rows in construction order.
    pub fn selected_rows(&self) -> Vec<RowHandle> {
        self.inner.selection.rows()
    }

    pub fn selected_count(&self) -> usize {
        self.inner.selection.len()
    }

    pub fn is_selected(&self, row: &RowHandle) -> bool {
        self.inner.selection.contains(row)
    }

    /// The live handle for `node`, whether or not it is ready yet.
    pub fn row_for_node(&self, node: NodeId) -> Option<RowHandle> {
        self.inner.lifecycle.row_for_node(node)
    }

    /// The bound toolbar, if one was found.
    pub fn toolbar(&self) -> Option<ToolbarBinding> {
        self.inner.toolbar.lock().clone()
    }

    /// Fires when the driver is destroyed. Stopping it destroys the driver.
    pub fn stopper(&self) -> &Stopper {
        &self.inner.stopper
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Widen columns matching `selector` (relative to the configured column
    /// scope) to at least `width` pixels on the next animation frame.
    pub fn expand_column(&self, selector: &str, width: u32) {
        self.inner.columns.request_expand(selector, width);
    }

    /// Emitted once for every row that finished rendering.
    pub fn row_ready(&self) -> &Signal<RowHandle> {
        &self.inner.row_ready
    }

    /// Emitted when a delivered row leaves the live set.
    pub fn row_removed(&self) -> &Signal<RowHandle> {
        &self.inner.row_removed
    }

    /// Emitted after the selected set changed, at most once per batch of
    /// host page changes.
    pub fn selection_changed(&self) -> &Signal<()> {
        self.inner.selection.changed()
    }

    /// Emitted once, at the end of the first [`destroy`](Self::destroy).
    pub fn destroyed(&self) -> &Signal<()> {
        &self.inner.destroyed_signal
    }

    /// Tear everything down.
    ///
    /// Closes the selection subscription, destroys every row, cancels all
    /// streams and pending flushes, releases the toolbar, and empties the
    /// selected set. If the set was non-empty `selection_changed` fires once
    /// before this returns. Later calls do nothing.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl Drop for RowListDriver {
    fn drop(&mut self) {
        self.inner.destroy();
    }
}

impl std::fmt::Debug for RowListDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowListDriver")
            .field("element", &self.inner.element)
            .field("rows", &self.inner.lifecycle.len())
            .field("selected", &self.inner.selection.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

static_assertions::assert_impl_all!(RowListDriver: Send, Sync);

impl DriverInner {
    pub(crate) fn selection(&self) -> &SelectionTracker {
        &self.selection
    }

    pub(crate) fn columns(&self) -> &ColumnCoordinator {
        &self.columns
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn watch_sections(self: &Arc<Self>) -> Result<()> {
        let blocks = self
            .document
            .query_selector_all(self.element, &self.config.table_section_selector)?;
        for block in blocks {
            let weak = Arc::downgrade(self);
            watch_children(&self.document, block, &self.stopper, move |event| {
                if let Some(driver) = weak.upgrade() {
                    driver.on_section(event);
                }
            })?;
        }
        Ok(())
    }

    fn on_section(self: &Arc<Self>, event: ChildEvent) {
        if let Err(err) = self.columns.harmonize_section(event.node) {
            tracing::warn!(target: "horizon_graft::columns", error = %err, "cannot harmonize table section");
        }

        let body = match self
            .document
            .query_selector(event.node, &self.config.row_body_selector)
        {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::warn!(
                    target: "horizon_graft::row_list",
                    section = ?event.node,
                    selector = %self.config.row_body_selector,
                    "table section has no row body"
                );
                return;
            }
            Err(err) => {
                tracing::warn!(target: "horizon_graft::row_list", error = %err, "cannot find row body");
                return;
            }
        };

        let scope = self.stopper.child_until(&event.removal);
        let weak = Arc::downgrade(self);
        let rows_scope = scope.clone();
        let result = watch_children(&self.document, body, &scope, move |row_event| {
            if let Some(driver) = weak.upgrade() {
                driver.on_row_element(row_event, &rows_scope);
            }
        });
        if let Err(err) = result {
            tracing::warn!(target: "horizon_graft::row_list", error = %err, "cannot watch row body");
        }
    }

    /// A child element appeared in a row body.
    fn on_row_element(self: &Arc<Self>, event: ChildEvent, scope: &Stopper) {
        if self.is_destroyed() {
            return;
        }
        let node = event.node;
        let stopper = scope.child_until(&event.removal);
        let row = match self.lifecycle.construct(node, stopper, Arc::downgrade(self)) {
            Ok(Some(row)) => row,
            Ok(None) => return,
            Err(GraftError::Dom(DomError::NodeNotFound(_))) => {
                tracing::debug!(target: "horizon_graft::lifecycle", ?node, "row element freed before construction");
                return;
            }
            Err(err) => {
                tracing::warn!(target: "horizon_graft::lifecycle", ?node, error = %err, "cannot construct row");
                return;
            }
        };

        let watch = WatchOptions::attributes(["class"]);
        if let Err(err) = self.selection_bridge.observe(node, &watch) {
            tracing::warn!(target: "horizon_graft::selection", id = row.id(), error = %err, "cannot watch row selection");
        }
        let selected = self
            .document
            .has_class(node, &self.config.selected_class)
            .unwrap_or(false);
        self.selection.register(&row, selected);

        let weak = Arc::downgrade(self);
        let stopped_row = row.clone();
        row.stopper().on_stop(move || match weak.upgrade() {
            Some(driver) => driver.on_row_stopped(&stopped_row),
            None => {
                stopped_row.mark_destroyed();
            }
        });

        let weak = Arc::downgrade(self);
        self.lifecycle.await_ready(&row, move |row| {
            if let Some(driver) = weak.upgrade() {
                driver.on_row_ready(row);
            }
        });
    }

    fn on_row_ready(&self, row: &RowHandle) {
        if self.is_destroyed() || !self.lifecycle.mark_ready(row) {
            return;
        }
        tracing::debug!(target: "horizon_graft::row_list", id = row.id(), "row ready");
        self.row_ready.emit(row.clone());
    }

    /// A row's stopper fired: its element was removed, its section went
    /// away, or the driver is being destroyed.
    fn on_row_stopped(&self, row: &RowHandle) {
        self.lifecycle.remove(row);
        self.selection_bridge.unobserve(row.element());
        if !self.is_destroyed() {
            self.selection.forget(row);
        }
        let previous = row.mark_destroyed();
        tracing::debug!(target: "horizon_graft::lifecycle", id = row.id(), ?previous, "row destroyed");
        if previous == RowState::Ready {
            self.row_removed.emit(row.clone());
        }
    }

    fn on_selection_events(&self, events: &[MutationEvent]) {
        if self.is_destroyed() {
            return;
        }
        self.selection
            .process_batch(events, |node| self.lifecycle.row_for_node(node));
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(target: "horizon_graft::row_list", element = ?self.element, "destroying row list");

        self.selection_bridge.unsubscribe();
        for row in self.lifecycle.live_rows() {
            row.destroy();
        }
        self.stopper.stop();

        let toolbar = self.toolbar.lock().take();
        if let Some(toolbar) = toolbar {
            toolbar.destroy();
        }
        self.selection.clear_and_notify();
        self.destroyed_signal.emit(());
    }
}
