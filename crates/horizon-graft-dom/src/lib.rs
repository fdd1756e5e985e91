//! Headless host document for Horizon Graft.
//!
//! The reconciliation engine is injected into a page it does not own. This
//! crate models the parts of that page the engine touches:
//!
//! - **Document**: An arena element tree with attributes, classes and inline
//!   style
//! - **Selectors**: CSS selector parsing (via `cssparser`) and matching
//! - **Mutation Observers**: Batched change records delivered on microtasks
//! - **Debug**: Tree dumps for diagnostics
//!
//! # Example
//!
//! ```
//! use horizon_graft_core::EventLoop;
//! use horizon_graft_dom::{Document, MutationObserver, MutationObserverInit};
//!
//! let event_loop = EventLoop::new();
//! let doc = Document::new(event_loop.clone());
//! let tbody = doc.create_element("tbody");
//! doc.append_child(doc.body(), tbody).unwrap();
//!
//! let observer = MutationObserver::new(&doc, |records| {
//!     for record in records {
//!         println!("{:?} added {:?}", record.target, record.added_nodes);
//!     }
//! });
//! observer
//!     .observe(tbody, MutationObserverInit::new().with_child_list())
//!     .unwrap();
//!
//! let row = doc.create_element_with("tr", &[("id", "thread-1")]);
//! doc.append_child(tbody, row).unwrap();
//! event_loop.run_microtasks();
//! ```

pub mod debug;
mod document;
mod error;
mod node;
pub mod observer;
pub mod selector;
mod style;

pub use debug::{TreeDebug, TreeFormatOptions, TreeStyle};
pub use document::Document;
pub use error::{DomError, Result};
pub use node::NodeId;
pub use observer::{MutationKind, MutationObserver, MutationObserverInit, MutationRecord};
pub use style::parse_int_prefix;
