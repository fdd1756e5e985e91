//! Debug visualization for element trees.
//!
//! ```
//! use horizon_graft_core::EventLoop;
//! use horizon_graft_dom::{Document, TreeDebug, TreeFormatOptions};
//!
//! let doc = Document::new(EventLoop::new());
//! let table = doc.create_element_with("table", &[("class", "cf")]);
//! doc.append_child(doc.body(), table).unwrap();
//!
//! let out = TreeDebug::with_options(TreeFormatOptions::minimal())
//!     .format_subtree(&doc, doc.root())
//!     .unwrap();
//! assert!(out.contains("table"));
//! ```

use std::fmt::Write as FmtWrite;

use crate::document::Document;
use crate::error::Result;
use crate::node::NodeId;

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show node IDs.
    pub show_ids: bool,
    /// Whether to show attributes.
    pub show_attributes: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_attributes: true,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Tag names only.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_attributes: false,
            ..Default::default()
        }
    }
}

/// Renders element subtrees for diagnostics and test failure messages.
#[derive(Debug, Clone, Default)]
pub struct TreeDebug {
    options: TreeFormatOptions,
}

impl TreeDebug {
    /// Create a debug visualizer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a debug visualizer with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format the subtree rooted at `root`.
    pub fn format_subtree(&self, doc: &Document, root: NodeId) -> Result<String> {
        let mut output = String::new();
        self.format_into(doc, root, 0, true, &mut output)?;
        Ok(output)
    }

    fn format_into(
        &self,
        doc: &Document,
        id: NodeId,
        depth: usize,
        is_last: bool,
        output: &mut String,
    ) -> Result<()> {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }

        output.push_str(&self.build_prefix(depth, is_last));
        output.push_str(&doc.tag_name(id)?);

        if self.options.show_ids {
            let _ = write!(output, " [{:?}]", id);
        }
        if self.options.show_attributes {
            for (name, value) in doc.attributes(id)? {
                let _ = write!(output, " {}=\"{}\"", name, value);
            }
        }
        output.push('\n');

        let children = doc.children(id)?;
        let child_count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            self.format_into(doc, child, depth + 1, i + 1 == child_count, output)?;
        }
        Ok(())
    }

    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, tee, corner) = match self.options.style {
            TreeStyle::Ascii => ("|", "+-- ", "`-- "),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500} ", "\u{2514}\u{2500}\u{2500} "),
            TreeStyle::Compact => ("", "- ", "- "),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            prefix.push_str(&" ".repeat(self.options.indent_size));
        }
        prefix.push_str(if is_last { corner } else { tee });
        prefix
    }
}
