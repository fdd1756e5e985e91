//! Mutation observers for the host document.
//!
//! A [`MutationObserver`] registers interest in structural or attribute
//! changes under one or more target elements. Every change the
//! [`Document`] makes is turned into a [`MutationRecord`], queued on each
//! interested observer, and delivered to the observer's callback in one
//! batch on a microtask. Records within a batch are in the order the
//! mutations happened.
//!
//! # Example
//!
//! ```
//! use horizon_graft_core::EventLoop;
//! use horizon_graft_dom::{Document, MutationObserver, MutationObserverInit};
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! let event_loop = EventLoop::new();
//! let doc = Document::new(event_loop.clone());
//! let list = doc.create_element("div");
//! doc.append_child(doc.body(), list).unwrap();
//!
//! let seen = Arc::new(Mutex::new(0));
//! let seen_clone = seen.clone();
//! let observer = MutationObserver::new(&doc, move |records| {
//!     *seen_clone.lock() += records.len();
//! });
//! observer
//!     .observe(list, MutationObserverInit::new().with_child_list())
//!     .unwrap();
//!
//! doc.append_child(list, doc.create_element("span")).unwrap();
//! doc.append_child(list, doc.create_element("span")).unwrap();
//! event_loop.run_microtasks();
//! assert_eq!(*seen.lock(), 2);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::document::Document;
use crate::error::{DomError, Result};
use crate::node::{NodeId, Tree};

new_key_type! {
    /// Registry key of a live observer.
    pub(crate) struct ObserverKey;
}

/// What kind of change a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Children were added to or removed from the target.
    ChildList,
    /// An attribute of the target changed.
    Attributes,
}

/// One observed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// The element whose children or attributes changed.
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    /// Name of the changed attribute (attribute records only).
    pub attribute_name: Option<String>,
    /// Value before the change; present only if the observer asked for it.
    pub old_value: Option<String>,
    /// Value right after the change, captured when the change happened.
    pub new_value: Option<String>,
}

/// Options for [`MutationObserver::observe`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationObserverInit {
    /// Report child insertions and removals.
    pub child_list: bool,
    /// Report attribute changes.
    pub attributes: bool,
    /// Only report these attributes. Implies `attributes`.
    pub attribute_filter: Option<Vec<String>>,
    /// Include the previous value in attribute records. Implies `attributes`.
    pub attribute_old_value: bool,
    /// Also report changes anywhere below the target.
    pub subtree: bool,
}

impl MutationObserverInit {
    /// Create options that observe nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report child insertions and removals.
    pub fn with_child_list(mut self) -> Self {
        self.child_list = true;
        self
    }

    /// Report attribute changes.
    pub fn with_attributes(mut self) -> Self {
        self.attributes = true;
        self
    }

    /// Restrict attribute reporting to the given names.
    pub fn with_attribute_filter<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = true;
        self.attribute_filter = Some(
            names
                .into_iter()
                .map(|name| name.into().to_ascii_lowercase())
                .collect(),
        );
        self
    }

    /// Include previous attribute values.
    pub fn with_attribute_old_value(mut self) -> Self {
        self.attributes = true;
        self.attribute_old_value = true;
        self
    }

    /// Observe the whole subtree under the target.
    pub fn with_subtree(mut self) -> Self {
        self.subtree = true;
        self
    }

    fn accepts(&self, record: &MutationRecord) -> bool {
        match record.kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::Attributes => {
                self.attributes
                    && match (&self.attribute_filter, &record.attribute_name) {
                        (Some(filter), Some(name)) => filter.iter().any(|f| f == name),
                        _ => true,
                    }
            }
        }
    }
}

/// A mutation produced by the document, waiting to be routed to observers.
pub(crate) struct PendingMutation {
    record: MutationRecord,
    /// The record target followed by its ancestors at mutation time.
    ancestors: Vec<NodeId>,
}

impl PendingMutation {
    pub fn child_list(
        tree: &Tree,
        target: NodeId,
        added_nodes: Vec<NodeId>,
        removed_nodes: Vec<NodeId>,
    ) -> Self {
        Self {
            record: MutationRecord {
                kind: MutationKind::ChildList,
                target,
                added_nodes,
                removed_nodes,
                attribute_name: None,
                old_value: None,
                new_value: None,
            },
            ancestors: tree.inclusive_ancestors(target),
        }
    }

    pub fn attribute(
        tree: &Tree,
        target: NodeId,
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        Self {
            record: MutationRecord {
                kind: MutationKind::Attributes,
                target,
                added_nodes: Vec::new(),
                removed_nodes: Vec::new(),
                attribute_name: Some(name),
                old_value,
                new_value,
            },
            ancestors: tree.inclusive_ancestors(target),
        }
    }
}

struct Registration {
    observer: Weak<ObserverState>,
    targets: Vec<(NodeId, MutationObserverInit)>,
}

/// Per-document list of observers and what they watch.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    entries: SlotMap<ObserverKey, Registration>,
}

impl ObserverRegistry {
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Route mutations to every interested observer.
///
/// The registry lock is released before any observer is touched, so an
/// observer dropped during routing can unregister itself.
pub(crate) fn dispatch(registry: &Mutex<ObserverRegistry>, mutations: Vec<PendingMutation>) {
    if mutations.is_empty() {
        return;
    }

    type Candidate = (Arc<ObserverState>, Vec<(NodeId, MutationObserverInit)>);
    let candidates: Vec<Candidate> = {
        let registry = registry.lock();
        registry
            .entries
            .values()
            .filter(|registration| !registration.targets.is_empty())
            .filter_map(|registration| {
                Some((registration.observer.upgrade()?, registration.targets.clone()))
            })
            .collect()
    };

    for mutation in &mutations {
        for (observer, targets) in &candidates {
            let mut interested = false;
            let mut wants_old_value = false;
            for (target, options) in targets {
                let in_scope = *target == mutation.record.target
                    || (options.subtree && mutation.ancestors.contains(target));
                if in_scope && options.accepts(&mutation.record) {
                    interested = true;
                    wants_old_value |= options.attribute_old_value;
                }
            }
            if interested {
                let mut record = mutation.record.clone();
                if !wants_old_value {
                    record.old_value = None;
                }
                observer.enqueue(record);
            }
        }
    }
}

type MutationCallback = Arc<dyn Fn(Vec<MutationRecord>) + Send + Sync>;

struct ObserverState {
    key: ObserverKey,
    document: Document,
    callback: MutationCallback,
    pending: Mutex<Vec<MutationRecord>>,
    scheduled: AtomicBool,
}

impl ObserverState {
    fn enqueue(self: &Arc<Self>, record: MutationRecord) {
        self.pending.lock().push(record);
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let weak = Arc::downgrade(self);
        self.document.event_loop().queue_microtask(move || {
            if let Some(state) = weak.upgrade() {
                state.deliver();
            }
        });
    }

    fn deliver(&self) {
        self.scheduled.store(false, Ordering::Release);
        let records = std::mem::take(&mut *self.pending.lock());
        if records.is_empty() {
            return;
        }
        tracing::trace!(
            target: "horizon_graft_dom::observer",
            record_count = records.len(),
            "delivering mutation records"
        );
        (self.callback)(records);
    }
}

impl Drop for ObserverState {
    fn drop(&mut self) {
        self.document.observers().lock().entries.remove(self.key);
    }
}

/// Observes changes to elements of a [`Document`].
///
/// Clones share registrations. The observer unregisters itself when the last
/// clone is dropped.
#[derive(Clone)]
pub struct MutationObserver {
    state: Arc<ObserverState>,
}

impl MutationObserver {
    /// Create an observer that passes each batch of records to `callback`.
    pub fn new<F>(document: &Document, callback: F) -> Self
    where
        F: Fn(Vec<MutationRecord>) + Send + Sync + 'static,
    {
        let state = Arc::new_cyclic(|weak| {
            let key = document.observers().lock().entries.insert(Registration {
                observer: weak.clone(),
                targets: Vec::new(),
            });
            ObserverState {
                key,
                document: document.clone(),
                callback: Arc::new(callback),
                pending: Mutex::new(Vec::new()),
                scheduled: AtomicBool::new(false),
            }
        });
        Self { state }
    }

    /// Start observing `target`. Observing the same target again replaces
    /// its options.
    pub fn observe(&self, target: NodeId, options: MutationObserverInit) -> Result<()> {
        if !self.state.document.exists(target) {
            return Err(DomError::NodeNotFound(target));
        }
        let mut registry = self.state.document.observers().lock();
        if let Some(registration) = registry.entries.get_mut(self.state.key) {
            match registration.targets.iter_mut().find(|(t, _)| *t == target) {
                Some(existing) => existing.1 = options,
                None => registration.targets.push((target, options)),
            }
        }
        Ok(())
    }

    /// Stop observing a single target. Records already queued for it are
    /// still delivered.
    pub fn unobserve(&self, target: NodeId) -> bool {
        let mut registry = self.state.document.observers().lock();
        match registry.entries.get_mut(self.state.key) {
            Some(registration) => {
                let before = registration.targets.len();
                registration.targets.retain(|(t, _)| *t != target);
                registration.targets.len() != before
            }
            None => false,
        }
    }

    /// Stop observing everything and discard undelivered records.
    ///
    /// No records are delivered after this returns unless `observe` is
    /// called again.
    pub fn disconnect(&self) {
        if let Some(registration) = self
            .state
            .document
            .observers()
            .lock()
            .entries
            .get_mut(self.state.key)
        {
            registration.targets.clear();
        }
        self.state.pending.lock().clear();
    }

    /// Take the records queued but not yet delivered.
    pub fn take_records(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut *self.state.pending.lock())
    }

    /// Whether the observer has at least one target.
    pub fn is_observing(&self) -> bool {
        self.state
            .document
            .observers()
            .lock()
            .entries
            .get(self.state.key)
            .is_some_and(|registration| !registration.targets.is_empty())
    }
}

impl std::fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationObserver")
            .field("observing", &self.is_observing())
            .field("pending", &self.state.pending.lock().len())
            .finish()
    }
}

static_assertions::assert_impl_all!(MutationObserver: Send, Sync);
