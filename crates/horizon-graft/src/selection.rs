//! Selected-row tracking.
//!
//! The host page marks selected rows with a class. The tracker watches class
//! changes delivered by the selection [`MutationBridge`](crate::MutationBridge),
//! keeps the set of selected [`RowHandle`]s, and raises one coalesced
//! notification per processed batch on the following microtask.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use horizon_graft_core::{EventLoop, Signal, Stopper, TaskId};
use horizon_graft_dom::NodeId;
use parking_lot::Mutex;

use crate::bridge::MutationEvent;
use crate::row::RowHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NotifyState {
    Idle,
    Scheduled(TaskId),
}

/// Maintains the selected set of one driver.
#[derive(Clone)]
pub(crate) struct SelectionTracker {
    inner: Arc<SelectionState>,
}

struct SelectionState {
    selected_class: String,
    event_loop: EventLoop,
    selected: Mutex<HashSet<RowHandle>>,
    notify: Mutex<NotifyState>,
    stopped: Stopper,
    changed: Signal<()>,
}

impl SelectionTracker {
    /// Create a tracker whose pending notification is cancelled when
    /// `stopper` fires.
    pub(crate) fn new(event_loop: EventLoop, selected_class: &str, stopper: &Stopper) -> Self {
        let inner = Arc::new(SelectionState {
            selected_class: selected_class.to_string(),
            event_loop,
            selected: Mutex::new(HashSet::new()),
            notify: Mutex::new(NotifyState::Idle),
            stopped: stopper.clone(),
            changed: Signal::new(),
        });
        let weak: Weak<SelectionState> = Arc::downgrade(&inner);
        stopper.on_stop(move || {
            if let Some(state) = weak.upgrade() {
                state.cancel_notification();
            }
        });
        Self { inner }
    }

    /// Emitted after the selected set changed.
    pub(crate) fn changed(&self) -> &Signal<()> {
        &self.inner.changed
    }

    pub(crate) fn contains(&self, row: &RowHandle) -> bool {
        self.inner.selected.lock().contains(row)
    }

    /// Selected rows in construction order.
    pub(crate) fn rows(&self) -> Vec<RowHandle> {
        let mut rows: Vec<RowHandle> = self.inner.selected.lock().iter().cloned().collect();
        rows.sort_by_key(RowHandle::serial);
        rows
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.selected.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn is_notification_pending(&self) -> bool {
        matches!(*self.inner.notify.lock(), NotifyState::Scheduled(_))
    }

    /// Record a freshly built row. A row that is already selected joins the
    /// set right away.
    pub(crate) fn register(&self, row: &RowHandle, selected: bool) {
        if selected && self.inner.selected.lock().insert(row.clone()) {
            tracing::debug!(target: "horizon_graft::selection", id = row.id(), "row selected at construction");
            self.schedule_notification();
        }
    }

    /// Drop a row that is going away. Returns `true` if it was selected.
    pub(crate) fn forget(&self, row: &RowHandle) -> bool {
        let removed = self.inner.selected.lock().remove(row);
        if removed {
            self.schedule_notification();
        }
        removed
    }

    /// Apply one delivered batch of mutation events.
    ///
    /// `lookup` resolves a node to its live row; events for nodes without
    /// one are ignored. Returns `true` if the selected set changed.
    #[tracing::instrument(skip_all, target = "horizon_graft::selection", level = "trace")]
    pub(crate) fn process_batch<L>(&self, events: &[MutationEvent], lookup: L) -> bool
    where
        L: Fn(NodeId) -> Option<RowHandle>,
    {
        let mut changed = false;
        for event in events {
            let MutationEvent::AttributeChanged {
                node,
                name,
                old_value,
                new_value,
            } = event
            else {
                continue;
            };
            if name != "class" {
                continue;
            }
            let was_selected = self.has_marker(old_value.as_deref());
            let is_selected = self.has_marker(new_value.as_deref());
            if was_selected == is_selected {
                continue;
            }
            let Some(row) = lookup(*node) else {
                continue;
            };

            let mut selected = self.inner.selected.lock();
            changed |= if is_selected {
                selected.insert(row)
            } else {
                selected.remove(&row)
            };
        }

        if changed {
            self.schedule_notification();
        }
        changed
    }

    /// Empty the set during teardown.
    ///
    /// Any debounced notification is dropped; if the set was non-empty,
    /// `changed` is emitted once, synchronously.
    pub(crate) fn clear_and_notify(&self) -> bool {
        self.inner.cancel_notification();
        let had_rows = {
            let mut selected = self.inner.selected.lock();
            let had_rows = !selected.is_empty();
            selected.clear();
            had_rows
        };
        if had_rows {
            tracing::debug!(target: "horizon_graft::selection", "selection cleared on teardown");
            self.inner.changed.emit(());
        }
        had_rows
    }

    fn has_marker(&self, class_value: Option<&str>) -> bool {
        class_value.is_some_and(|value| {
            value
                .split_ascii_whitespace()
                .any(|token| token == self.inner.selected_class)
        })
    }

    fn schedule_notification(&self) {
        if self.inner.stopped.is_stopped() {
            return;
        }
        let mut notify = self.inner.notify.lock();
        if *notify != NotifyState::Idle {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let task = self.inner.event_loop.queue_microtask(move || {
            if let Some(state) = weak.upgrade() {
                state.flush();
            }
        });
        *notify = NotifyState::Scheduled(task);
    }
}

impl SelectionState {
    fn flush(&self) {
        *self.notify.lock() = NotifyState::Idle;
        tracing::trace!(target: "horizon_graft::selection", "selection changed");
        self.changed.emit(());
    }

    fn cancel_notification(&self) {
        let previous = std::mem::replace(&mut *self.notify.lock(), NotifyState::Idle);
        if let NotifyState::Scheduled(task) = previous {
            self.event_loop.cancel_microtask(task);
        }
    }
}
