//! Streams of "child became present" events.
//!
//! [`watch_children`] reports every child of a container, first the ones
//! present when the watch starts and then each one added later. Every event
//! carries a removal [`Stopper`] that fires once, when that child leaves the
//! container. Cancelling the stream through its stopper releases the
//! underlying subscription; removal stoppers of children still present are
//! dropped without firing.
//!
//! Nested containers are watched by calling [`watch_children`] again from
//! inside the outer callback with `outer_stopper.child_until(&event.removal)`,
//! which bounds the inner stream by both the outer stream and the removal
//! of the nested container.

use std::collections::HashMap;
use std::sync::Arc;

use horizon_graft_core::Stopper;
use horizon_graft_dom::{Document, NodeId};
use parking_lot::Mutex;

use crate::bridge::{MutationBridge, MutationEvent, WatchOptions};
use crate::error::Result;

/// One child of a watched container.
#[derive(Debug, Clone)]
pub struct ChildEvent {
    /// The child element.
    pub node: NodeId,
    /// Fires when `node` is removed from the container.
    pub removal: Stopper,
}

type ChildCallback = Arc<dyn Fn(ChildEvent) + Send + Sync>;

struct StreamState {
    container: NodeId,
    present: Mutex<HashMap<NodeId, Stopper>>,
    on_child: ChildCallback,
}

impl StreamState {
    fn emit_added(&self, node: NodeId) {
        let removal = {
            let mut present = self.present.lock();
            if present.contains_key(&node) {
                return;
            }
            let removal = Stopper::new();
            present.insert(node, removal.clone());
            removal
        };
        (self.on_child)(ChildEvent { node, removal });
    }

    fn emit_removed(&self, node: NodeId) {
        let removal = self.present.lock().remove(&node);
        if let Some(removal) = removal {
            removal.stop();
        }
    }

    fn handle(&self, events: Vec<MutationEvent>) {
        for event in events {
            match event {
                MutationEvent::ChildAdded { parent, node } if parent == self.container => {
                    self.emit_added(node);
                }
                MutationEvent::ChildRemoved { parent, node } if parent == self.container => {
                    self.emit_removed(node);
                }
                _ => {}
            }
        }
    }
}

/// Watch the children of `container` until `stopper` fires.
///
/// Children already present are reported synchronously, in document order,
/// before this returns. If `stopper` has already fired nothing is reported.
#[tracing::instrument(skip_all, target = "horizon_graft::lifecycle", level = "trace", fields(container = ?container))]
pub fn watch_children<F>(
    document: &Document,
    container: NodeId,
    stopper: &Stopper,
    on_child: F,
) -> Result<()>
where
    F: Fn(ChildEvent) + Send + Sync + 'static,
{
    if stopper.is_stopped() {
        return Ok(());
    }
    let existing = document.children(container)?;

    let state = Arc::new(StreamState {
        container,
        present: Mutex::new(HashMap::new()),
        on_child: Arc::new(on_child),
    });

    let weak = Arc::downgrade(&state);
    let bridge = MutationBridge::new(document, move |events| {
        if let Some(state) = weak.upgrade() {
            state.handle(events);
        }
    });
    bridge.observe(container, &WatchOptions::children())?;

    // The stop callback owns the stream state; dropping it on stop releases
    // the removal stoppers of children that were never removed.
    let held = Mutex::new(Some(state.clone()));
    let closing = bridge.clone();
    stopper.on_stop(move || {
        closing.unsubscribe();
        if let Some(state) = held.lock().take() {
            state.present.lock().clear();
        }
    });

    for node in existing {
        if stopper.is_stopped() {
            break;
        }
        state.emit_added(node);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_graft_core::EventLoop;

    struct Fixture {
        event_loop: EventLoop,
        doc: Document,
        list: NodeId,
        seen: Arc<Mutex<Vec<ChildEvent>>>,
    }

    fn fixture(initial: usize) -> (Fixture, Vec<NodeId>) {
        let event_loop = EventLoop::new();
        let doc = Document::new(event_loop.clone());
        let list = doc.create_element("tbody");
        doc.append_child(doc.body(), list).unwrap();
        let nodes: Vec<NodeId> = (0..initial)
            .map(|_| {
                let row = doc.create_element("tr");
                doc.append_child(list, row).unwrap();
                row
            })
            .collect();
        let fixture = Fixture {
            event_loop,
            doc,
            list,
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        (fixture, nodes)
    }

    fn watch(f: &Fixture, stopper: &Stopper) {
        let seen = f.seen.clone();
        watch_children(&f.doc, f.list, stopper, move |event| seen.lock().push(event)).unwrap();
    }

    #[test]
    fn test_existing_children_first_then_additions() {
        let (f, existing) = fixture(2);
        let stopper = Stopper::new();
        watch(&f, &stopper);

        let nodes: Vec<NodeId> = f.seen.lock().iter().map(|e| e.node).collect();
        assert_eq!(nodes, existing);

        let c = f.doc.create_element("tr");
        let d = f.doc.create_element("tr");
        f.doc.append_child(f.list, c).unwrap();
        f.doc.insert_before(f.list, d, Some(existing[0])).unwrap();
        f.event_loop.run_microtasks();

        let nodes: Vec<NodeId> = f.seen.lock().iter().map(|e| e.node).collect();
        assert_eq!(nodes, vec![existing[0], existing[1], c, d]);
    }

    #[test]
    fn test_removal_fires_once() {
        let (f, existing) = fixture(2);
        let stopper = Stopper::new();
        watch(&f, &stopper);

        f.doc.remove(existing[0]).unwrap();
        f.event_loop.run_microtasks();

        let seen = f.seen.lock();
        assert!(seen[0].removal.is_stopped());
        assert!(!seen[1].removal.is_stopped());
    }

    #[test]
    fn test_readded_child_gets_fresh_removal() {
        let (f, existing) = fixture(1);
        let stopper = Stopper::new();
        watch(&f, &stopper);

        f.doc.remove(existing[0]).unwrap();
        f.doc.append_child(f.list, existing[0]).unwrap();
        f.event_loop.run_microtasks();

        let seen = f.seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].removal.is_stopped());
        assert!(!seen[1].removal.is_stopped());
    }

    #[test]
    fn test_cancel_stops_delivery_without_firing_removals() {
        let (f, existing) = fixture(1);
        let stopper = Stopper::new();
        watch(&f, &stopper);

        stopper.stop();
        f.doc.remove(existing[0]).unwrap();
        f.doc.append_child(f.list, f.doc.create_element("tr")).unwrap();
        f.event_loop.run_microtasks();

        let seen = f.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].removal.is_stopped());
    }

    #[test]
    fn test_already_stopped_reports_nothing() {
        let (f, _) = fixture(3);
        let stopper = Stopper::new();
        stopper.stop();
        watch(&f, &stopper);
        assert!(f.seen.lock().is_empty());
    }

    #[test]
    fn test_stream_outlives_dropped_scope_handle() {
        let (f, _) = fixture(0);
        let parent = Stopper::new();
        watch(&f, &parent.child());

        f.doc.append_child(f.list, f.doc.create_element("tr")).unwrap();
        f.event_loop.run_until_idle().unwrap();
        assert_eq!(f.seen.lock().len(), 1);

        parent.stop();
        f.doc.append_child(f.list, f.doc.create_element("tr")).unwrap();
        f.event_loop.run_until_idle().unwrap();
        assert_eq!(f.seen.lock().len(), 1);
    }

    #[test]
    fn test_nested_stream_bounded_by_parent_removal() {
        let event_loop = EventLoop::new();
        let doc = Document::new(event_loop.clone());
        let outer = doc.create_element("div");
        doc.append_child(doc.body(), outer).unwrap();
        let section = doc.create_element("div");
        let body = doc.create_element("tbody");
        doc.append_child(section, body).unwrap();
        doc.append_child(outer, section).unwrap();

        let rows = Arc::new(Mutex::new(Vec::<NodeId>::new()));
        let driver = Stopper::new();
        let inner_doc = doc.clone();
        let rows_clone = rows.clone();
        let driver_clone = driver.clone();
        watch_children(&doc, outer, &driver, move |event| {
            let rows = rows_clone.clone();
            let scope = driver_clone.child_until(&event.removal);
            watch_children(&inner_doc, body, &scope, move |row| rows.lock().push(row.node))
                .unwrap();
        })
        .unwrap();

        doc.append_child(body, doc.create_element("tr")).unwrap();
        event_loop.run_microtasks();
        assert_eq!(rows.lock().len(), 1);

        doc.remove(section).unwrap();
        event_loop.run_microtasks();
        doc.append_child(body, doc.create_element("tr")).unwrap();
        event_loop.run_microtasks();
        assert_eq!(rows.lock().len(), 1);
        assert!(!driver.is_stopped());
    }
}
