//! Single-fire cancellation signals.
//!
//! A [`Stopper`] is raised at most once. Everything gated on it (mutation
//! subscriptions, child streams, debounce timers, frame flushes) registers an
//! `on_stop` callback and tears itself down when the stopper fires.
//!
//! Stoppers form a tree: [`Stopper::child`] returns a stopper that fires when
//! its parent fires, and [`Stopper::child_until`] additionally fires when some
//! other stopper fires. This gives nested subscriptions a lifetime bounded by
//! both their owner and the event that ends them.
//!
//! ```
//! use horizon_graft_core::Stopper;
//!
//! let driver = Stopper::new();
//! let table_removed = Stopper::new();
//! let rows = driver.child_until(&table_removed);
//!
//! table_removed.stop();
//! assert!(rows.is_stopped());
//! assert!(!driver.is_stopped());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Identifies a callback registered with [`Stopper::on_stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StopCallbackId(u64);

type StopCallback = Box<dyn FnOnce() + Send + 'static>;

/// A single-fire, clonable cancellation signal.
///
/// Clones share state: stopping any clone stops them all.
#[derive(Clone)]
pub struct Stopper {
    inner: Arc<StopperState>,
}

struct StopperState {
    stopped: AtomicBool,
    next_callback: AtomicU64,
    callbacks: Mutex<Vec<(StopCallbackId, StopCallback)>>,
    /// Registrations this stopper holds on stoppers it is chained to, so they
    /// can be released when this one fires first.
    links: Mutex<Vec<(Weak<StopperState>, StopCallbackId)>>,
}

impl Stopper {
    /// Create a new, unstopped stopper.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StopperState {
                stopped: AtomicBool::new(false),
                next_callback: AtomicU64::new(1),
                callbacks: Mutex::new(Vec::new()),
                links: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Check if this stopper has fired.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Fire the stopper.
    ///
    /// Runs every registered callback once, in registration order. Calling
    /// `stop` again is a no-op.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let links = std::mem::take(&mut *self.inner.links.lock());
        for (upstream, id) in links {
            if let Some(upstream) = upstream.upgrade() {
                upstream.remove(id);
            }
        }

        let callbacks = std::mem::take(&mut *self.inner.callbacks.lock());
        tracing::trace!(target: "horizon_graft_core::stopper", callback_count = callbacks.len(), "stopper fired");
        for (_, callback) in callbacks {
            callback();
        }
    }

    /// Register a callback to run when the stopper fires.
    ///
    /// If the stopper has already fired, the callback runs immediately and
    /// `None` is returned.
    pub fn on_stop<F>(&self, callback: F) -> Option<StopCallbackId>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut callbacks = self.inner.callbacks.lock();
            if !self.is_stopped() {
                let id = StopCallbackId(self.inner.next_callback.fetch_add(1, Ordering::Relaxed));
                callbacks.push((id, Box::new(callback)));
                return Some(id);
            }
        }
        callback();
        None
    }

    /// Unregister a callback. Returns `true` if it was still pending.
    pub fn remove_callback(&self, id: StopCallbackId) -> bool {
        self.inner.remove(id)
    }

    /// Create a stopper that fires when this one fires.
    ///
    /// The parent keeps the child alive until one of them fires, so work
    /// gated on the child keeps running after every other handle to it is
    /// dropped. Stopping the child does not affect the parent; the child's
    /// registration on the parent is released when the child fires first.
    pub fn child(&self) -> Stopper {
        let child = Stopper::new();
        child.chain_to(self);
        child
    }

    /// Create a child stopper that also fires when `until` fires.
    pub fn child_until(&self, until: &Stopper) -> Stopper {
        let child = self.child();
        child.chain_to(until);
        child
    }

    /// Number of callbacks still waiting for this stopper.
    pub fn pending_callbacks(&self) -> usize {
        self.inner.callbacks.lock().len()
    }

    fn chain_to(&self, upstream: &Stopper) {
        if self.is_stopped() {
            return;
        }
        // Upstream owns the child; the child only holds weak links back.
        let child = self.clone();
        let registration = upstream.on_stop(move || child.stop());
        if let Some(id) = registration {
            self.inner
                .links
                .lock()
                .push((Arc::downgrade(&upstream.inner), id));
        }
    }
}

impl StopperState {
    fn remove(&self, id: StopCallbackId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(callback_id, _)| *callback_id != id);
        callbacks.len() != before
    }
}

impl Default for Stopper {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Stopper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stopper")
            .field("stopped", &self.is_stopped())
            .field("pending_callbacks", &self.pending_callbacks())
            .finish()
    }
}

static_assertions::assert_impl_all!(Stopper: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_stop_runs_callbacks_once_in_order() {
        let stopper = Stopper::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            stopper.on_stop(move || order.lock().push(n));
        }

        stopper.stop();
        stopper.stop();

        assert!(stopper.is_stopped());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_on_stop_after_stop_runs_immediately() {
        let stopper = Stopper::new();
        stopper.stop();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let id = stopper.on_stop(move || ran_clone.store(true, Ordering::SeqCst));

        assert!(id.is_none());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_remove_callback() {
        let stopper = Stopper::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = count.clone();
        let id = stopper
            .on_stop(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(stopper.remove_callback(id));
        assert!(!stopper.remove_callback(id));
        stopper.stop();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_child_stops_with_parent() {
        let parent = Stopper::new();
        let child = parent.child();
        let grandchild = child.child();

        parent.stop();

        assert!(child.is_stopped());
        assert!(grandchild.is_stopped());
    }

    #[test]
    fn test_child_stop_releases_parent_registration() {
        let parent = Stopper::new();
        let child = parent.child();
        assert_eq!(parent.pending_callbacks(), 1);

        child.stop();

        assert!(!parent.is_stopped());
        assert_eq!(parent.pending_callbacks(), 0);
    }

    #[test]
    fn test_child_until_stops_on_either() {
        let parent = Stopper::new();
        let until = Stopper::new();
        let scoped = parent.child_until(&until);

        until.stop();
        assert!(scoped.is_stopped());
        assert!(!parent.is_stopped());
        assert_eq!(parent.pending_callbacks(), 0);

        let until = Stopper::new();
        let scoped = parent.child_until(&until);
        parent.stop();
        assert!(scoped.is_stopped());
        assert!(!until.is_stopped());
        assert_eq!(until.pending_callbacks(), 0);
    }

    #[test]
    fn test_unreferenced_child_still_fires() {
        let parent = Stopper::new();
        let until = Stopper::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let fired = fired.clone();
            parent.child_until(&until).on_stop(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        let fired_clone = fired.clone();
        parent.child().child().on_stop(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        until.stop();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(parent.pending_callbacks(), 1);
        parent.stop();
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_child_of_stopped_parent_is_stopped() {
        let parent = Stopper::new();
        parent.stop();
        assert!(parent.child().is_stopped());
    }

    #[test]
    fn test_callback_may_register_on_same_stopper() {
        let stopper = Stopper::new();
        let ran = Arc::new(AtomicBool::new(false));

        let stopper_clone = stopper.clone();
        let ran_clone = ran.clone();
        stopper.on_stop(move || {
            stopper_clone.on_stop(move || ran_clone.store(true, Ordering::SeqCst));
        });
        stopper.stop();

        assert!(ran.load(Ordering::SeqCst));
    }
}
