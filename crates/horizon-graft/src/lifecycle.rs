//! Row construction, readiness and the node-to-row table.
//!
//! [`RowLifecycle`] owns the one table mapping row elements to their
//! [`RowHandle`]s. Handles enter it when built and leave it when their
//! element goes away; nothing else inserts or removes entries.
//!
//! A built row is not handed out immediately. It first waits for its
//! content to render (a descendant matching the ready selector), and a row
//! whose element was already processed once waits out the reprocess delay
//! before the first check. Both waits are cancelled by the row's stopper, so
//! a row removed while pending is never delivered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use horizon_graft_core::Stopper;
use horizon_graft_dom::{Document, NodeId};
use parking_lot::Mutex;

use crate::bridge::{MutationBridge, WatchOptions};
use crate::config::RowListConfig;
use crate::error::Result;
use crate::row::RowHandle;
use crate::row_list::DriverInner;

#[derive(Default)]
struct RowTable {
    by_node: HashMap<NodeId, RowHandle>,
    /// Ready rows in delivery order.
    ready: Vec<RowHandle>,
}

pub(crate) struct RowLifecycle {
    document: Document,
    config: Arc<RowListConfig>,
    table: Mutex<RowTable>,
}

impl RowLifecycle {
    pub(crate) fn new(document: &Document, config: Arc<RowListConfig>) -> Self {
        Self {
            document: document.clone(),
            config,
            table: Mutex::new(RowTable::default()),
        }
    }

    /// The identity of `node` if it should become a row.
    ///
    /// Rows need a non-empty identity attribute and must carry neither the
    /// ignore class nor the placeholder class.
    pub(crate) fn qualifying_id(&self, node: NodeId) -> Result<Option<String>> {
        let config = &self.config;
        let id = match self.document.attribute(node, &config.identity_attribute)? {
            Some(id) if !id.is_empty() => id,
            _ => return Ok(None),
        };
        if self.document.has_class(node, &config.ignore_class)?
            || self.document.has_class(node, &config.placeholder_class)?
        {
            return Ok(None);
        }
        Ok(Some(id))
    }

    /// Build and register a handle for `node`, replacing any handle still
    /// registered for it.
    ///
    /// `stopper` becomes the row's own stopper. It is stopped here if no
    /// row is built, including when reading the node fails.
    #[tracing::instrument(skip_all, target = "horizon_graft::lifecycle", level = "trace", fields(node = ?node))]
    pub(crate) fn construct(
        &self,
        node: NodeId,
        stopper: Stopper,
        driver: Weak<DriverInner>,
    ) -> Result<Option<RowHandle>> {
        let built = self.build(node, stopper.clone(), driver);
        if !matches!(built, Ok(Some(_))) {
            stopper.stop();
        }
        built
    }

    fn build(
        &self,
        node: NodeId,
        stopper: Stopper,
        driver: Weak<DriverInner>,
    ) -> Result<Option<RowHandle>> {
        let Some(id) = self.qualifying_id(node)? else {
            return Ok(None);
        };
        // The element moved here from another watched body before its old
        // removal was processed.
        let stale = self.table.lock().by_node.get(&node).cloned();
        if let Some(stale) = stale {
            tracing::debug!(target: "horizon_graft::lifecycle", id, "replacing stale row");
            stale.destroy();
            self.remove(&stale);
        }

        let already_had_modifications = self.document.has_class(node, &self.config.processed_class)?;
        self.document.add_class(node, &self.config.processed_class)?;

        let row = RowHandle::new(id, node, already_had_modifications, stopper, driver);
        self.table.lock().by_node.insert(node, row.clone());
        tracing::debug!(
            target: "horizon_graft::lifecycle",
            id = row.id(),
            already_had_modifications,
            "row constructed"
        );
        Ok(Some(row))
    }

    /// Wait for `row` to render, then call `on_ready` once.
    ///
    /// Nothing is called if the row's stopper fires first.
    pub(crate) fn await_ready<F>(&self, row: &RowHandle, on_ready: F)
    where
        F: Fn(&RowHandle) + Send + Sync + 'static,
    {
        let watch = Arc::new(ReadinessWatch {
            document: self.document.clone(),
            selector: self.config.row_ready_selector.clone(),
            row: row.clone(),
            on_ready: Box::new(on_ready),
            done: AtomicBool::new(false),
            watcher: Mutex::new(None),
        });

        let event_loop = self.document.event_loop().clone();
        let delay = self.config.reprocess_delay();
        if row.already_had_modifications() && !delay.is_zero() {
            let timer = event_loop.set_timeout(delay, move || watch.start());
            row.stopper().on_stop(move || {
                // Fails only if the timer already fired.
                let _ = event_loop.clear_timeout(timer);
            });
        } else {
            let task = event_loop.queue_microtask(move || watch.start());
            row.stopper().on_stop(move || {
                event_loop.cancel_microtask(task);
            });
        }
    }

    /// Record `row` as delivered. Returns `false` if it is no longer live
    /// or was already ready.
    pub(crate) fn mark_ready(&self, row: &RowHandle) -> bool {
        let mut table = self.table.lock();
        if table.by_node.get(&row.element()) != Some(row) || !row.mark_ready() {
            return false;
        }
        table.ready.push(row.clone());
        true
    }

    /// Drop `row` from the table. Returns `true` if it was registered.
    pub(crate) fn remove(&self, row: &RowHandle) -> bool {
        let mut table = self.table.lock();
        if table.by_node.get(&row.element()) != Some(row) {
            return false;
        }
        table.by_node.remove(&row.element());
        table.ready.retain(|ready| ready != row);
        true
    }

    pub(crate) fn row_for_node(&self, node: NodeId) -> Option<RowHandle> {
        self.table.lock().by_node.get(&node).cloned()
    }

    /// Ready rows in delivery order.
    pub(crate) fn ready_rows(&self) -> Vec<RowHandle> {
        self.table.lock().ready.clone()
    }

    /// Every registered row, ready or pending, in construction order.
    pub(crate) fn live_rows(&self) -> Vec<RowHandle> {
        let mut rows: Vec<RowHandle> = self.table.lock().by_node.values().cloned().collect();
        rows.sort_by_key(RowHandle::serial);
        rows
    }

    pub(crate) fn len(&self) -> usize {
        self.table.lock().by_node.len()
    }
}

type ReadyCallback = Box<dyn Fn(&RowHandle) + Send + Sync>;

struct ReadinessWatch {
    document: Document,
    selector: Option<String>,
    row: RowHandle,
    on_ready: ReadyCallback,
    done: AtomicBool,
    watcher: Mutex<Option<MutationBridge>>,
}

impl ReadinessWatch {
    fn start(self: &Arc<Self>) {
        if self.row.stopper().is_stopped() {
            return;
        }
        match self.check() {
            Ok(true) => self.finish(),
            Ok(false) => self.observe_content(),
            Err(err) => tracing::warn!(
                target: "horizon_graft::lifecycle",
                id = self.row.id(),
                error = %err,
                "row readiness check failed"
            ),
        }
    }

    fn check(&self) -> Result<bool> {
        match &self.selector {
            Some(selector) => Ok(self
                .document
                .query_selector(self.row.element(), selector)?
                .is_some()),
            None => Ok(true),
        }
    }

    /// Re-check on every change below the row until it is ready.
    fn observe_content(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let bridge = MutationBridge::new(&self.document, move |_| {
            let Some(watch) = weak.upgrade() else {
                return;
            };
            if watch.row.stopper().is_stopped() {
                return;
            }
            match watch.check() {
                Ok(true) => watch.finish(),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(target: "horizon_graft::lifecycle", id = watch.row.id(), error = %err, "row readiness check failed");
                    watch.close();
                }
            }
        });
        if let Err(err) = bridge.observe(self.row.element(), &WatchOptions::children().with_subtree()) {
            tracing::warn!(target: "horizon_graft::lifecycle", id = self.row.id(), error = %err, "cannot watch row content");
            return;
        }

        // Keeps the watch alive until the row goes away.
        let watch = self.clone();
        self.row.stopper().on_stop(move || watch.close());
        *self.watcher.lock() = Some(bridge);
    }

    fn finish(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close();
        tracing::trace!(target: "horizon_graft::lifecycle", id = self.row.id(), "row ready");
        (self.on_ready)(&self.row);
    }

    fn close(&self) {
        if let Some(bridge) = self.watcher.lock().take() {
            bridge.unsubscribe();
        }
    }
}
