//! Logging facilities for Horizon Graft.
//!
//! Horizon Graft uses the `tracing` crate for instrumentation. Nothing is
//! printed unless the embedding application installs a subscriber:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_graft=debug,horizon_graft_dom=info")
//!     .init();
//! ```
//!
//! Every subsystem logs under one of the [`targets`], so per-subsystem
//! filtering works with ordinary `tracing` directives.

/// Span names used throughout Horizon Graft for tracing.
pub mod span_names {
    /// Event loop turn.
    pub const EVENT_LOOP: &str = "horizon_graft::event_loop";
    /// Mutation record delivery.
    pub const MUTATION: &str = "horizon_graft::mutation";
    /// Row construction and readiness.
    pub const ROW: &str = "horizon_graft::row";
    /// Column width flush.
    pub const COLUMNS: &str = "horizon_graft::columns";
}

/// Target names for log filtering.
pub mod targets {
    /// Core framework target.
    pub const CORE: &str = "horizon_graft_core";
    /// Event loop target.
    pub const EVENT_LOOP: &str = "horizon_graft_core::event_loop";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_graft_core::signal";
    /// Stopper target.
    pub const STOPPER: &str = "horizon_graft_core::stopper";
    /// Document tree target.
    pub const DOM: &str = "horizon_graft_dom::document";
    /// Mutation observer target.
    pub const OBSERVER: &str = "horizon_graft_dom::observer";
    /// Row list driver target.
    pub const ROW_LIST: &str = "horizon_graft::row_list";
    /// Row lifecycle target.
    pub const LIFECYCLE: &str = "horizon_graft::lifecycle";
    /// Selection tracker target.
    pub const SELECTION: &str = "horizon_graft::selection";
    /// Column-width coordinator target.
    pub const COLUMNS: &str = "horizon_graft::columns";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Useful for timing a batch of work under a subscriber that records span
/// durations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::debug_span!(target: "horizon_graft::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

/// Macros for common tracing patterns.
///
/// These are wrappers around the `tracing` crate macros with a consistent
/// target.
#[macro_export]
macro_rules! graft_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "horizon_graft", $($arg)*)
    };
}

#[macro_export]
macro_rules! graft_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "horizon_graft", $($arg)*)
    };
}

#[macro_export]
macro_rules! graft_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "horizon_graft", $($arg)*)
    };
}

#[macro_export]
macro_rules! graft_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "horizon_graft", $($arg)*)
    };
}

#[macro_export]
macro_rules! graft_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "horizon_graft", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_span() {
        let _span = PerfSpan::new("test_operation");
        crate::graft_trace!(step = 1, "inside perf span");
    }

    #[test]
    fn test_targets_are_namespaced() {
        for target in [targets::EVENT_LOOP, targets::SIGNAL, targets::STOPPER] {
            assert!(target.starts_with(targets::CORE));
        }
    }
}
