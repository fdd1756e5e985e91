//! Prelude module for Horizon Graft.
//!
//! ```
//! use horizon_graft::prelude::*;
//! ```

// ============================================================================
// Row List
// ============================================================================

pub use crate::{RowHandle, RowListConfig, RowListDriver, RowState, ToolbarBinding};

// ============================================================================
// Streams
// ============================================================================

pub use crate::{ChildEvent, MutationBridge, MutationEvent, WatchOptions, watch_children};

// ============================================================================
// Host Platform
// ============================================================================

pub use horizon_graft_core::{EventLoop, Signal, Stopper};
pub use horizon_graft_dom::{Document, NodeId};
