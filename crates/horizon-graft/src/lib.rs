//! Horizon Graft - reactive list reconciliation for UI injected into a host
//! page.
//!
//! The host page owns a list of rows and rewrites it on its own schedule.
//! This crate keeps a typed, live model of that list:
//!
//! - **Mutation bridge**: typed child and attribute events from the
//!   document's mutation observer ([`MutationBridge`])
//! - **Child streams**: "child became present" events, each with its own
//!   removal signal, nestable per container ([`watch_children`])
//! - **Row lifecycle**: filtering, construction, readiness and teardown of
//!   [`RowHandle`]s
//! - **Selection**: the set of rows the host page marks as selected, with a
//!   coalesced change notification
//! - **Column widths**: batched, never-shrinking width requests and width
//!   harmonization across table sections
//! - **Driver**: [`RowListDriver`] ties it together under one stopper
//!
//! The host document and the cooperative event loop live in the
//! `horizon-graft-dom` and `horizon-graft-core` crates; the most used types
//! from both are part of the [`prelude`].
//!
//! # Example
//!
//! ```
//! use horizon_graft::prelude::*;
//!
//! let event_loop = EventLoop::new();
//! let doc = Document::new(event_loop.clone());
//!
//! // div(list) > div.Cp > div(section) > table > tbody > tr#thread-1 > td
//! let list = doc.create_element("div");
//! let block = doc.create_element_with("div", &[("class", "Cp")]);
//! let section = doc.create_element("div");
//! let table = doc.create_element_with("table", &[("class", "cf")]);
//! let tbody = doc.create_element("tbody");
//! let row = doc.create_element_with("tr", &[("id", "thread-1")]);
//! doc.append_child(doc.body(), list).unwrap();
//! doc.append_child(list, block).unwrap();
//! doc.append_child(block, section).unwrap();
//! doc.append_child(section, table).unwrap();
//! doc.append_child(table, tbody).unwrap();
//! doc.append_child(row, doc.create_element("td")).unwrap();
//! doc.append_child(tbody, row).unwrap();
//!
//! let driver = RowListDriver::new(&doc, list, RowListConfig::default()).unwrap();
//! event_loop.run_until_idle().unwrap();
//!
//! let rows = driver.rows();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows[0].id(), "thread-1");
//! ```

mod bridge;
mod child_stream;
mod columns;
mod config;
mod error;
mod lifecycle;
pub mod prelude;
mod row;
mod row_list;
mod selection;
mod toolbar;

pub use bridge::{MutationBridge, MutationEvent, WatchOptions};
pub use child_stream::{ChildEvent, watch_children};
pub use config::{RowListConfig, ToolbarConfig};
pub use error::{ConfigError, ConfigResult, GraftError, Result};
pub use row::{RowHandle, RowState};
pub use row_list::RowListDriver;
pub use toolbar::ToolbarBinding;

