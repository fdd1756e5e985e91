//! Row handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use horizon_graft_core::Stopper;
use horizon_graft_dom::NodeId;
use parking_lot::Mutex;

use crate::row_list::DriverInner;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a [`RowHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowState {
    /// Constructed, waiting for the row's content to finish rendering.
    Pending,
    /// Delivered to subscribers.
    Ready,
    /// Torn down. The node was removed or the driver was destroyed.
    Destroyed,
}

/// One recognised row of a row list.
///
/// Handles are cheap to clone and compare by identity. A handle holds only a
/// weak reference to the driver that created it; once the driver is gone,
/// [`expand_column`](Self::expand_column) does nothing and
/// [`is_selected`](Self::is_selected) returns `false`.
#[derive(Clone)]
pub struct RowHandle {
    inner: Arc<RowInner>,
}

struct RowInner {
    serial: u64,
    id: String,
    node: NodeId,
    already_had_modifications: bool,
    state: Mutex<RowState>,
    stopper: Stopper,
    driver: Weak<DriverInner>,
}

impl RowHandle {
    pub(crate) fn new(
        id: String,
        node: NodeId,
        already_had_modifications: bool,
        stopper: Stopper,
        driver: Weak<DriverInner>,
    ) -> Self {
        Self {
            inner: Arc::new(RowInner {
                serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
                id,
                node,
                already_had_modifications,
                state: Mutex::new(RowState::Pending),
                stopper,
                driver,
            }),
        }
    }

    /// The row's identity attribute value.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The row element.
    pub fn element(&self) -> NodeId {
        self.inner.node
    }

    /// Whether the element had already been processed when this handle was
    /// built (for example because the host page re-inserted it).
    pub fn already_had_modifications(&self) -> bool {
        self.inner.already_had_modifications
    }

    pub fn state(&self) -> RowState {
        *self.inner.state.lock()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == RowState::Ready
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == RowState::Destroyed
    }

    /// Fires when the row goes away. Row collaborators gate their own
    /// subscriptions on it.
    pub fn stopper(&self) -> &Stopper {
        &self.inner.stopper
    }

    /// Whether the row is in its driver's selected set.
    pub fn is_selected(&self) -> bool {
        self.inner
            .driver
            .upgrade()
            .is_some_and(|driver| driver.selection().contains(self))
    }

    /// Ask the driver to widen columns matching `selector` to at least
    /// `width` pixels.
    pub fn expand_column(&self, selector: &str, width: u32) {
        if let Some(driver) = self.inner.driver.upgrade() {
            driver.columns().request_expand(selector, width);
        }
    }

    /// Tear the row down. Safe to call more than once.
    pub fn destroy(&self) {
        self.inner.stopper.stop();
    }

    pub(crate) fn serial(&self) -> u64 {
        self.inner.serial
    }

    /// Move from pending to ready. Returns `false` in any other state.
    pub(crate) fn mark_ready(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state == RowState::Pending {
            *state = RowState::Ready;
            true
        } else {
            false
        }
    }

    /// Move to destroyed, returning the previous state.
    pub(crate) fn mark_destroyed(&self) -> RowState {
        std::mem::replace(&mut *self.inner.state.lock(), RowState::Destroyed)
    }
}

impl PartialEq for RowHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for RowHandle {}

impl Hash for RowHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.serial.hash(state);
    }
}

impl fmt::Debug for RowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowHandle")
            .field("id", &self.inner.id)
            .field("node", &self.inner.node)
            .field("state", &self.state())
            .field("already_had_modifications", &self.inner.already_had_modifications)
            .finish()
    }
}

static_assertions::assert_impl_all!(RowHandle: Send, Sync);
