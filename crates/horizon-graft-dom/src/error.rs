//! Error types for the host document.

use crate::NodeId;

/// Result type alias for document operations.
pub type Result<T> = std::result::Result<T, DomError>;

/// Errors that can occur while reading or mutating a [`Document`](crate::Document).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// The node does not exist (never created, or destroyed).
    #[error("Node {0:?} not found")]
    NodeNotFound(NodeId),

    /// The insertion would make a node its own ancestor.
    #[error("Cannot insert {child:?} under {parent:?}: the result would be cyclic")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    /// The node is not a child of the given parent.
    #[error("Node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },

    /// Selector parsing error.
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    /// A required element was not found.
    #[error("No element matches '{selector}'")]
    NoMatch { selector: String },
}

impl DomError {
    /// Create a selector error.
    pub fn invalid_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Create a missing-match error.
    pub fn no_match(selector: impl Into<String>) -> Self {
        Self::NoMatch {
            selector: selector.into(),
        }
    }
}
