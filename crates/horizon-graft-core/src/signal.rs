//! Signal/slot system for Horizon Graft.
//!
//! Signals are how the reconciliation engine talks to its collaborators: a
//! row list emits `row_ready` when a row finishes setting up, and
//! `selection_changed` when the selected set moves. Connected slots (callbacks)
//! are invoked synchronously, in connection order, on the thread that emits.
//!
//! # Key Types
//!
//! - [`Signal<Args>`]: a notification with typed arguments
//! - [`ConnectionId`]: names one connected slot
//! - [`ConnectionGuard`]: disconnects its slot on drop
//!
//! # Reentrancy
//!
//! `emit` snapshots the connected slots before invoking any of them, so a
//! slot may connect to, disconnect from, or re-emit the signal it is
//! handling. Slots connected during an emit are not called by that emit.
//!
//! # Example
//!
//! ```
//! use horizon_graft_core::Signal;
//!
//! let selection_changed = Signal::<()>::new();
//! let conn_id = selection_changed.connect(|_| println!("selection moved"));
//! selection_changed.emit(());
//! selection_changed.disconnect(conn_id);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// Names one slot connected to a [`Signal`]; pass it to
    /// [`Signal::disconnect`].
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

struct Connection<Args> {
    /// Monotonic connection sequence; slot keys get reused, this does not.
    seq: u64,
    slot: Slot<Args>,
}

/// A notification that any number of slots can listen to.
///
/// Slots receive `&Args`; use `()` when there is nothing to pass.
pub struct Signal<Args> {
    slots: Mutex<SlotMap<ConnectionId, Connection<Args>>>,
    muted: AtomicBool,
    next_seq: AtomicU64,
}

impl<Args: 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> Signal<Args> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(SlotMap::with_key()),
            muted: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Call `slot` on every later emit until it is disconnected.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(Connection {
            seq,
            slot: Arc::new(slot),
        })
    }

    /// Returns `false` if `id` was not connected.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.slots.lock().remove(id).is_some()
    }

    pub fn disconnect_all(&self) {
        self.slots.lock().clear();
    }

    pub fn connection_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// While blocked, [`emit`](Self::emit) drops its arguments without
    /// calling anything.
    pub fn set_blocked(&self, blocked: bool) {
        self.muted.store(blocked, Ordering::Release);
    }

    pub fn is_blocked(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Call every connected slot with `args`, oldest connection first.
    #[tracing::instrument(skip_all, target = "horizon_graft_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: "horizon_graft_core::signal", "signal blocked, skipping emit");
            return;
        }

        let slots: Vec<Slot<Args>> = {
            let slots = self.slots.lock();
            let mut ordered: Vec<&Connection<Args>> = slots.values().collect();
            ordered.sort_by_key(|conn| conn.seq);
            ordered.into_iter().map(|conn| conn.slot.clone()).collect()
        };
        tracing::trace!(target: "horizon_graft_core::signal", connection_count = slots.len(), "emitting signal");

        for slot in slots {
            slot(&args);
        }
    }

    /// Like [`connect`](Self::connect), but the slot stays connected only as
    /// long as the returned guard lives.
    ///
    /// The guard holds a weak reference, so it never keeps the signal alive
    /// and dropping it after the signal is gone is harmless.
    ///
    /// # Example
    ///
    /// ```
    /// use horizon_graft_core::Signal;
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicU32, Ordering};
    ///
    /// let widths = Arc::new(Signal::<u32>::new());
    /// let widest = Arc::new(AtomicU32::new(0));
    /// {
    ///     let widest = widest.clone();
    ///     let _guard = widths.connect_scoped(move |&w| {
    ///         widest.fetch_max(w, Ordering::Relaxed);
    ///     });
    ///     widths.emit(120);
    /// }
    /// widths.emit(300);
    /// assert_eq!(widest.load(Ordering::Relaxed), 120);
    /// ```
    pub fn connect_scoped<F>(self: &Arc<Self>, slot: F) -> ConnectionGuard<Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = self.connect(slot);
        ConnectionGuard {
            signal: Arc::downgrade(self),
            id,
        }
    }
}

/// Disconnects its slot when dropped. Returned by
/// [`Signal::connect_scoped`].
pub struct ConnectionGuard<Args: 'static> {
    signal: Weak<Signal<Args>>,
    id: ConnectionId,
}

impl<Args: 'static> ConnectionGuard<Args> {
    /// The connection this guard owns.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<Args: 'static> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.disconnect(self.id);
        }
    }
}

static_assertions::assert_impl_all!(Signal<()>: Send, Sync);
