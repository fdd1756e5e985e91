//! Integration tests for document mutation observation.

use std::sync::Arc;

use horizon_graft_core::EventLoop;
use horizon_graft_dom::{
    Document, MutationKind, MutationObserver, MutationObserverInit, MutationRecord, NodeId,
    TreeDebug,
};
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

struct Page {
    event_loop: EventLoop,
    doc: Document,
    tbody: NodeId,
}

/// `body > div.Cp > table.cf > tbody`
fn page() -> Page {
    let event_loop = EventLoop::new();
    let doc = Document::new(event_loop.clone());
    let section = doc.create_element_with("div", &[("class", "Cp")]);
    let table = doc.create_element_with("table", &[("class", "cf")]);
    let tbody = doc.create_element("tbody");
    doc.append_child(doc.body(), section).unwrap();
    doc.append_child(section, table).unwrap();
    doc.append_child(table, tbody).unwrap();
    Page {
        event_loop,
        doc,
        tbody,
    }
}

fn record_into(doc: &Document) -> (MutationObserver, Arc<Mutex<Vec<MutationRecord>>>) {
    let records = Arc::new(Mutex::new(Vec::new()));
    let records_clone = records.clone();
    let observer = MutationObserver::new(doc, move |batch| records_clone.lock().extend(batch));
    (observer, records)
}

#[test]
fn test_moving_a_row_reports_removal_then_addition() {
    init_tracing();
    let page = page();
    let other = page.doc.create_element("tbody");
    page.doc.append_child(page.doc.body(), other).unwrap();
    let row = page.doc.create_element_with("tr", &[("id", "r1")]);
    page.doc.append_child(page.tbody, row).unwrap();

    let (observer, records) = record_into(&page.doc);
    let options = MutationObserverInit::new().with_child_list();
    observer.observe(page.tbody, options.clone()).unwrap();
    observer.observe(other, options).unwrap();

    page.doc.append_child(other, row).unwrap();
    page.event_loop.run_microtasks();

    let records = records.lock();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].target, page.tbody);
    assert_eq!(records[0].removed_nodes, vec![row]);
    assert_eq!(records[1].target, other);
    assert_eq!(records[1].added_nodes, vec![row]);
}

#[test]
fn test_class_flip_within_one_turn_arrives_as_one_batch() {
    init_tracing();
    let page = page();
    let row = page.doc.create_element_with("tr", &[("id", "r1"), ("class", "zA")]);
    page.doc.append_child(page.tbody, row).unwrap();

    let batches = Arc::new(Mutex::new(Vec::<Vec<MutationRecord>>::new()));
    let batches_clone = batches.clone();
    let observer = MutationObserver::new(&page.doc, move |batch| batches_clone.lock().push(batch));
    observer
        .observe(
            page.tbody,
            MutationObserverInit::new()
                .with_subtree()
                .with_attribute_filter(["class"])
                .with_attribute_old_value(),
        )
        .unwrap();

    page.doc.add_class(row, "x7").unwrap();
    page.doc.remove_class(row, "x7").unwrap();
    page.event_loop.run_microtasks();

    let batches = batches.lock();
    assert_eq!(batches.len(), 1);
    let flips: Vec<(Option<&str>, Option<&str>)> = batches[0]
        .iter()
        .map(|r| (r.old_value.as_deref(), r.new_value.as_deref()))
        .collect();
    assert_eq!(
        flips,
        vec![(Some("zA"), Some("zA x7")), (Some("zA x7"), Some("zA"))]
    );
    assert!(batches[0].iter().all(|r| r.kind == MutationKind::Attributes));
}

#[test]
fn test_observer_created_in_callback_sees_later_mutations() {
    init_tracing();
    let page = page();
    let seen = Arc::new(Mutex::new(Vec::<NodeId>::new()));
    let nested = Arc::new(Mutex::new(None::<MutationObserver>));

    let doc = page.doc.clone();
    let seen_clone = seen.clone();
    let nested_clone = nested.clone();
    let outer = MutationObserver::new(&page.doc, move |batch| {
        for record in batch {
            for row in record.added_nodes {
                let seen = seen_clone.clone();
                let inner = MutationObserver::new(&doc, move |batch| {
                    seen.lock().extend(batch.iter().flat_map(|r| r.added_nodes.clone()));
                });
                inner
                    .observe(row, MutationObserverInit::new().with_child_list())
                    .unwrap();
                *nested_clone.lock() = Some(inner);
            }
        }
    });
    outer
        .observe(page.tbody, MutationObserverInit::new().with_child_list())
        .unwrap();

    let row = page.doc.create_element("tr");
    page.doc.append_child(page.tbody, row).unwrap();
    page.event_loop.run_microtasks();

    let cell = page.doc.create_element("td");
    page.doc.append_child(row, cell).unwrap();
    page.event_loop.run_microtasks();

    assert_eq!(*seen.lock(), vec![cell]);
}

#[test]
fn test_selectors_resolve_against_live_structure() {
    init_tracing();
    let page = page();
    let root = page.doc.root();
    for id in ["a", "b", "c"] {
        let row = page.doc.create_element_with("tr", &[("id", id), ("class", "zA")]);
        page.doc.append_child(page.tbody, row).unwrap();
    }

    let rows = page
        .doc
        .query_selector_all(root, "div.Cp table.cf > tbody > tr.zA")
        .unwrap();
    assert_eq!(rows.len(), 3, "{}", TreeDebug::new().format_subtree(&page.doc, root).unwrap());

    let middle = page
        .doc
        .query_selector(root, "tr:nth-child(2)")
        .unwrap()
        .unwrap();
    assert_eq!(page.doc.attribute(middle, "id").unwrap().as_deref(), Some("b"));

    page.doc.destroy(middle).unwrap();
    let ids: Vec<String> = page
        .doc
        .query_selector_all(page.tbody, "tr")
        .unwrap()
        .into_iter()
        .filter_map(|row| page.doc.attribute(row, "id").unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "c"]);
}
