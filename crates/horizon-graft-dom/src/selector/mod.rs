//! CSS selector parsing and matching.

mod matcher;
mod parser;
mod types;

pub(crate) use matcher::matches_list;
pub use parser::parse_selector_list;
pub use types::*;
