//! Typed mutation events on top of the document's mutation observer.
//!
//! A [`MutationBridge`] turns raw [`MutationRecord`] batches into
//! [`MutationEvent`]s, preserving delivery order, and can be closed
//! deterministically: once [`MutationBridge::unsubscribe`] returns, the
//! callback is never invoked again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use horizon_graft_core::Stopper;
use horizon_graft_dom::{
    Document, MutationKind, MutationObserver, MutationObserverInit, MutationRecord, NodeId,
};

use crate::error::Result;

/// A single change reported by a [`MutationBridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    /// `node` was inserted into `parent`.
    ChildAdded { parent: NodeId, node: NodeId },
    /// `node` was removed from `parent`.
    ChildRemoved { parent: NodeId, node: NodeId },
    /// A watched attribute changed on `node`.
    AttributeChanged {
        node: NodeId,
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
}

impl MutationEvent {
    /// The node the event is about.
    pub fn node(&self) -> NodeId {
        match self {
            Self::ChildAdded { node, .. }
            | Self::ChildRemoved { node, .. }
            | Self::AttributeChanged { node, .. } => *node,
        }
    }
}

/// What a [`MutationBridge`] should report for one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Report child insertions and removals.
    pub children: bool,
    /// Report changes to these attributes, with their previous value.
    pub attributes: Vec<String>,
    /// Extend both channels to the whole subtree.
    pub subtree: bool,
}

impl WatchOptions {
    /// Watch direct children only.
    pub fn children() -> Self {
        Self {
            children: true,
            ..Self::default()
        }
    }

    /// Watch the given attributes.
    pub fn attributes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Extend the watch to the subtree.
    pub fn with_subtree(mut self) -> Self {
        self.subtree = true;
        self
    }

    fn to_init(&self) -> MutationObserverInit {
        let mut init = MutationObserverInit::new();
        if self.children {
            init = init.with_child_list();
        }
        if !self.attributes.is_empty() {
            init = init
                .with_attribute_filter(self.attributes.iter().cloned())
                .with_attribute_old_value();
        }
        if self.subtree {
            init = init.with_subtree();
        }
        init
    }
}

/// Converts mutation record batches into [`MutationEvent`]s.
///
/// Clones share the same subscription.
#[derive(Clone)]
pub struct MutationBridge {
    observer: MutationObserver,
    active: Arc<AtomicBool>,
}

impl MutationBridge {
    /// Create a bridge that hands each delivered batch to `on_events`.
    ///
    /// Events within a batch keep the order the document produced them in;
    /// for one record, removals are reported before additions.
    pub fn new<F>(document: &Document, on_events: F) -> Self
    where
        F: Fn(Vec<MutationEvent>) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let gate = active.clone();
        let observer = MutationObserver::new(document, move |records| {
            if !gate.load(Ordering::Acquire) {
                return;
            }
            let events = translate(records);
            if !events.is_empty() {
                on_events(events);
            }
        });
        Self { observer, active }
    }

    /// Start (or re-configure) watching `node`.
    pub fn observe(&self, node: NodeId, options: &WatchOptions) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        self.observer.observe(node, options.to_init())?;
        Ok(())
    }

    /// Stop watching a single node.
    pub fn unobserve(&self, node: NodeId) -> bool {
        self.observer.unobserve(node)
    }

    /// Close the subscription. No callback runs after this returns.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.observer.disconnect();
            tracing::trace!(target: "horizon_graft_dom::observer", "mutation bridge closed");
        }
    }

    /// Whether the subscription is still open.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Close the subscription when `stopper` fires.
    pub fn gate(&self, stopper: &Stopper) {
        let bridge = self.clone();
        stopper.on_stop(move || bridge.unsubscribe());
    }
}

impl std::fmt::Debug for MutationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationBridge")
            .field("active", &self.is_active())
            .field("observer", &self.observer)
            .finish()
    }
}

fn translate(records: Vec<MutationRecord>) -> Vec<MutationEvent> {
    let mut events = Vec::with_capacity(records.len());
    for record in records {
        match record.kind {
            MutationKind::ChildList => {
                let parent = record.target;
                events.extend(
                    record
                        .removed_nodes
                        .into_iter()
                        .map(|node| MutationEvent::ChildRemoved { parent, node }),
                );
                events.extend(
                    record
                        .added_nodes
                        .into_iter()
                        .map(|node| MutationEvent::ChildAdded { parent, node }),
                );
            }
            MutationKind::Attributes => {
                if let Some(name) = record.attribute_name {
                    events.push(MutationEvent::AttributeChanged {
                        node: record.target,
                        name,
                        old_value: record.old_value,
                        new_value: record.new_value,
                    });
                }
            }
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_graft_core::EventLoop;
    use parking_lot::Mutex;

    fn setup() -> (EventLoop, Document, NodeId) {
        let event_loop = EventLoop::new();
        let doc = Document::new(event_loop.clone());
        let list = doc.create_element("tbody");
        doc.append_child(doc.body(), list).unwrap();
        (event_loop, doc, list)
    }

    fn recording_bridge(doc: &Document) -> (MutationBridge, Arc<Mutex<Vec<MutationEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let bridge = MutationBridge::new(doc, move |batch| events_clone.lock().extend(batch));
        (bridge, events)
    }

    #[test]
    fn test_child_events_in_document_order() {
        let (event_loop, doc, list) = setup();
        let (bridge, events) = recording_bridge(&doc);
        bridge.observe(list, &WatchOptions::children()).unwrap();

        let a = doc.create_element("tr");
        let b = doc.create_element("tr");
        doc.append_child(list, a).unwrap();
        doc.append_child(list, b).unwrap();
        doc.remove(a).unwrap();
        event_loop.run_microtasks();

        assert_eq!(
            *events.lock(),
            vec![
                MutationEvent::ChildAdded { parent: list, node: a },
                MutationEvent::ChildAdded { parent: list, node: b },
                MutationEvent::ChildRemoved { parent: list, node: a },
            ]
        );
    }

    #[test]
    fn test_attribute_event_carries_previous_value() {
        let (event_loop, doc, list) = setup();
        let row = doc.create_element_with("tr", &[("class", "zA")]);
        doc.append_child(list, row).unwrap();
        let (bridge, events) = recording_bridge(&doc);
        bridge
            .observe(row, &WatchOptions::attributes(["class"]))
            .unwrap();

        doc.add_class(row, "x7").unwrap();
        doc.set_attribute(row, "title", "ignored").unwrap();
        event_loop.run_microtasks();

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            MutationEvent::AttributeChanged {
                node: row,
                name: "class".into(),
                old_value: Some("zA".into()),
                new_value: Some("zA x7".into()),
            }
        );
    }

    #[test]
    fn test_no_callback_after_unsubscribe() {
        let (event_loop, doc, list) = setup();
        let (bridge, events) = recording_bridge(&doc);
        bridge.observe(list, &WatchOptions::children()).unwrap();

        doc.append_child(list, doc.create_element("tr")).unwrap();
        bridge.unsubscribe();
        doc.append_child(list, doc.create_element("tr")).unwrap();
        event_loop.run_microtasks();

        assert!(events.lock().is_empty());
        assert!(!bridge.is_active());
        // Observing after unsubscribe stays closed.
        bridge.observe(list, &WatchOptions::children()).unwrap();
        doc.append_child(list, doc.create_element("tr")).unwrap();
        event_loop.run_microtasks();
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_gate_closes_on_stop() {
        let (event_loop, doc, list) = setup();
        let (bridge, events) = recording_bridge(&doc);
        bridge.observe(list, &WatchOptions::children()).unwrap();
        let stopper = Stopper::new();
        bridge.gate(&stopper);

        doc.append_child(list, doc.create_element("tr")).unwrap();
        event_loop.run_microtasks();
        assert_eq!(events.lock().len(), 1);

        stopper.stop();
        doc.append_child(list, doc.create_element("tr")).unwrap();
        event_loop.run_microtasks();
        assert_eq!(events.lock().len(), 1);
    }
}
