//! Core systems for Horizon Graft.
//!
//! This crate provides the foundation the reconciliation engine runs on:
//!
//! - **Event Loop**: A cooperative loop with microtask, timer and
//!   animation-frame queues on a virtual clock
//! - **Signal/Slot System**: Type-safe notifications to collaborators
//! - **Stopper**: Single-fire cancellation that nests into lifetimes
//! - **Logging**: Tracing targets and convenience macros
//!
//! # Example
//!
//! ```
//! use horizon_graft_core::{EventLoop, Signal, Stopper};
//! use std::sync::Arc;
//!
//! let event_loop = EventLoop::new();
//! let stopper = Stopper::new();
//! let ready = Arc::new(Signal::<u32>::new());
//!
//! let ready_clone = ready.clone();
//! let gate = stopper.clone();
//! event_loop.queue_microtask(move || {
//!     if !gate.is_stopped() {
//!         ready_clone.emit(7);
//!     }
//! });
//!
//! ready.connect(|n| println!("row {n} ready"));
//! event_loop.run_microtasks();
//! ```

mod error;
mod event_loop;
pub mod logging;
pub mod signal;
pub mod stopper;

pub use error::{Result, SchedulerError};
pub use event_loop::{EventLoop, EventLoopConfig, FrameId, TaskId, TimerId};
pub use logging::PerfSpan;
pub use signal::{ConnectionGuard, ConnectionId, Signal};
pub use stopper::{StopCallbackId, Stopper};
