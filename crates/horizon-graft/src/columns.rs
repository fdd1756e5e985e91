//! Column width coordination.
//!
//! Row collaborators ask for columns to be widened through
//! [`RowHandle::expand_column`](crate::RowHandle::expand_column). Requests
//! are coalesced per column selector (the widest one wins) and applied in a
//! single pass on the next animation frame. Columns are never narrowed.
//!
//! When the host page adds another table section next to existing ones, its
//! columns take the widths of the first section so all sections line up.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use horizon_graft_core::{FrameId, PerfSpan, Stopper};
use horizon_graft_dom::{Document, NodeId, parse_int_prefix};
use parking_lot::Mutex;

use crate::config::RowListConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushState {
    Idle,
    Scheduled(FrameId),
}

/// Batches column width requests for one row list element.
#[derive(Clone)]
pub(crate) struct ColumnCoordinator {
    inner: Arc<ColumnState>,
}

struct ColumnState {
    document: Document,
    element: NodeId,
    config: Arc<RowListConfig>,
    pending: Mutex<BTreeMap<String, u32>>,
    flush: Mutex<FlushState>,
    stopper: Stopper,
}

impl ColumnCoordinator {
    pub(crate) fn new(
        document: &Document,
        element: NodeId,
        config: Arc<RowListConfig>,
        stopper: &Stopper,
    ) -> Self {
        let inner = Arc::new(ColumnState {
            document: document.clone(),
            element,
            config,
            pending: Mutex::new(BTreeMap::new()),
            flush: Mutex::new(FlushState::Idle),
            stopper: stopper.clone(),
        });
        let weak: Weak<ColumnState> = Arc::downgrade(&inner);
        stopper.on_stop(move || {
            if let Some(state) = weak.upgrade() {
                state.cancel();
            }
        });
        Self { inner }
    }

    /// Ask for columns matching `selector` to be at least `width` pixels
    /// wide. Ignored once the coordinator's stopper has fired.
    pub(crate) fn request_expand(&self, selector: &str, width: u32) {
        if self.inner.stopper.is_stopped() {
            return;
        }
        {
            let mut pending = self.inner.pending.lock();
            match pending.get_mut(selector) {
                Some(existing) if *existing >= width => return,
                Some(existing) => *existing = width,
                None => {
                    pending.insert(selector.to_string(), width);
                }
            }
        }
        tracing::trace!(target: "horizon_graft::columns", selector, width, "column expansion requested");
        self.schedule_flush();
    }

    /// The width waiting to be applied for `selector`.
    #[cfg(test)]
    pub(crate) fn pending_width(&self, selector: &str) -> Option<u32> {
        self.inner.pending.lock().get(selector).copied()
    }

    #[cfg(test)]
    pub(crate) fn is_flush_scheduled(&self) -> bool {
        matches!(*self.inner.flush.lock(), FlushState::Scheduled(_))
    }

    /// Apply and clear every pending request. Returns the number of columns
    /// that were widened.
    #[cfg(test)]
    pub(crate) fn flush(&self) -> usize {
        self.inner.flush()
    }

    /// Copy column widths from the first table section under the same
    /// parent into `section`, column by column.
    ///
    /// # Panics
    ///
    /// Panics if the two sections have different column counts; the row
    /// list no longer matches its own table layout.
    pub(crate) fn harmonize_section(&self, section: NodeId) -> Result<bool> {
        let document = &self.inner.document;
        let Some(parent) = document.parent(section)? else {
            return Ok(false);
        };
        let Some(first) = document.first_element_child(parent)? else {
            return Ok(false);
        };
        if first == section {
            return Ok(false);
        }

        let selector = self.inner.config.column_selector("col");
        let template = document.query_selector_all(first, &selector)?;
        let columns = document.query_selector_all(section, &selector)?;
        assert_eq!(
            template.len(),
            columns.len(),
            "table sections under {parent:?} have different column counts"
        );

        for (source, target) in template.iter().zip(&columns) {
            match document.style_property(*source, "width")? {
                Some(width) => document.set_style_property(*target, "width", &width)?,
                None => document.remove_style_property(*target, "width")?,
            }
        }
        tracing::debug!(
            target: "horizon_graft::columns",
            ?section,
            columns = columns.len(),
            "harmonized table section column widths"
        );
        Ok(true)
    }

    fn schedule_flush(&self) {
        let mut flush = self.inner.flush.lock();
        if *flush != FlushState::Idle {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let frame = self
            .inner
            .document
            .event_loop()
            .request_animation_frame(move || {
                if let Some(state) = weak.upgrade() {
                    state.flush();
                }
            });
        *flush = FlushState::Scheduled(frame);
    }
}

impl ColumnState {
    fn flush(&self) -> usize {
        *self.flush.lock() = FlushState::Idle;
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return 0;
        }
        let _perf = PerfSpan::new("column_flush");

        let mut widened = 0;
        for (selector, width) in pending {
            match self.apply(&selector, width) {
                Ok(count) => widened += count,
                Err(err) => tracing::warn!(
                    target: "horizon_graft::columns",
                    selector,
                    error = %err,
                    "failed to apply column width"
                ),
            }
        }
        tracing::trace!(target: "horizon_graft::columns", widened, "column flush complete");
        widened
    }

    fn apply(&self, selector: &str, width: u32) -> Result<usize> {
        let full = self.config.column_selector(selector);
        let mut widened = 0;
        for column in self.document.query_selector_all(self.element, &full)? {
            // Unreadable widths count as zero.
            let current = self
                .document
                .style_property(column, "width")?
                .and_then(|value| parse_int_prefix(&value))
                .unwrap_or(0);
            if current < i64::from(width) {
                self.document
                    .set_style_property(column, "width", &format!("{width}px"))?;
                widened += 1;
            }
        }
        Ok(widened)
    }

    fn cancel(&self) {
        let previous = std::mem::replace(&mut *self.flush.lock(), FlushState::Idle);
        if let FlushState::Scheduled(frame) = previous {
            self.document.event_loop().cancel_animation_frame(frame);
        }
        self.pending.lock().clear();
    }
}
