//! Cooperative, single-threaded event loop on a virtual clock.
//!
//! The host page drives all work in the reconciliation engine: mutation
//! batches arrive as microtasks, debounced notifications run as microtasks,
//! short delays are timers, and column-width flushes wait for the next
//! animation frame. [`EventLoop`] models those three queues explicitly so the
//! whole pipeline runs deterministically, with time advanced by the embedder.
//!
//! # Queues
//!
//! - **Microtasks**: FIFO, drained completely after every other task.
//! - **Timers**: one-shot, ordered by fire time then registration order.
//! - **Animation frames**: callbacks registered before a frame starts run in
//!   that frame; callbacks registered during a frame wait for the next one.
//!
//! No scheduler lock is held while a callback runs, so callbacks may freely
//! schedule or cancel more work.
//!
//! # Example
//!
//! ```
//! use horizon_graft_core::EventLoop;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let event_loop = EventLoop::new();
//! let fired = Arc::new(AtomicUsize::new(0));
//!
//! let fired_clone = fired.clone();
//! event_loop.set_timeout(Duration::from_millis(2), move || {
//!     fired_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! event_loop.advance_by(Duration::from_millis(1));
//! assert_eq!(fired.load(Ordering::SeqCst), 0);
//! event_loop.advance_by(Duration::from_millis(1));
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::error::{Result, SchedulerError};

new_key_type! {
    /// A unique identifier for a timer.
    pub struct TimerId;
}

new_key_type! {
    /// A unique identifier for an animation-frame callback.
    pub struct FrameId;
}

/// A unique identifier for a queued microtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the raw u64 value of this task ID.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Global counter for generating unique task IDs.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, AtomicOrdering::Relaxed))
}

/// A boxed task closure.
type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

/// Configuration for an [`EventLoop`].
#[derive(Debug, Clone)]
pub struct EventLoopConfig {
    /// Spacing between animation frames on the virtual clock.
    pub frame_interval: Duration,
    /// Maximum microtasks run by a single drain before giving up.
    pub microtask_limit: usize,
    /// Maximum turns `run_until_idle` takes before reporting an error.
    pub max_turns: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
            microtask_limit: 100_000,
            max_turns: 10_000,
        }
    }
}

/// Internal microtask data.
struct TaskData {
    id: TaskId,
    task: BoxedTask,
}

/// Internal timer data.
struct TimerData {
    fire_at: Duration,
    task: Option<BoxedTask>,
}

/// An entry in the timer queue (min-heap by fire time, then sequence).
#[derive(Debug, Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_at: Duration,
    seq: u64,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct LoopState {
    now: Duration,
    microtasks: VecDeque<TaskData>,
    timers: SlotMap<TimerId, TimerData>,
    timer_queue: BinaryHeap<TimerQueueEntry>,
    timer_seq: u64,
    frames: SlotMap<FrameId, (u64, BoxedTask)>,
    frame_seq: u64,
}

impl LoopState {
    /// Drop cancelled entries from the front of the timer queue and return
    /// the next live one.
    fn peek_timer(&mut self) -> Option<TimerQueueEntry> {
        while let Some(entry) = self.timer_queue.peek() {
            if self.timers.contains_key(entry.id) {
                return Some(*entry);
            }
            self.timer_queue.pop();
        }
        None
    }

    fn next_frame_at(&self, interval: Duration) -> Duration {
        let interval = interval.as_nanos().max(1);
        let ticks = self.now.as_nanos() / interval + 1;
        Duration::from_nanos((ticks * interval) as u64)
    }
}

/// A cooperative event loop with microtask, timer and animation-frame queues.
///
/// `EventLoop` is a cheap handle; clones drive the same queues.
#[derive(Clone)]
pub struct EventLoop {
    state: Arc<Mutex<LoopState>>,
    config: Arc<EventLoopConfig>,
}

impl EventLoop {
    /// Create an event loop with default configuration.
    pub fn new() -> Self {
        Self::with_config(EventLoopConfig::default())
    }

    /// Create an event loop with custom configuration.
    pub fn with_config(config: EventLoopConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopState {
                now: Duration::ZERO,
                microtasks: VecDeque::new(),
                timers: SlotMap::with_key(),
                timer_queue: BinaryHeap::new(),
                timer_seq: 0,
                frames: SlotMap::with_key(),
                frame_seq: 0,
            })),
            config: Arc::new(config),
        }
    }

    /// The loop configuration.
    pub fn config(&self) -> &EventLoopConfig {
        &self.config
    }

    /// Current time on the virtual clock.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    // =========================================================================
    // Microtasks
    // =========================================================================

    /// Queue a microtask.
    pub fn queue_microtask<F>(&self, task: F) -> TaskId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = next_task_id();
        self.state.lock().microtasks.push_back(TaskData {
            id,
            task: Box::new(task),
        });
        id
    }

    /// Cancel a pending microtask.
    ///
    /// Returns `true` if the task was found and cancelled.
    pub fn cancel_microtask(&self, id: TaskId) -> bool {
        let mut state = self.state.lock();
        if let Some(pos) = state.microtasks.iter().position(|t| t.id == id) {
            state.microtasks.remove(pos);
            true
        } else {
            false
        }
    }

    /// Run microtasks until the queue is empty, including microtasks queued
    /// by the ones being run.
    ///
    /// Returns the number of microtasks run.
    pub fn run_microtasks(&self) -> usize {
        let mut count = 0;
        loop {
            if count >= self.config.microtask_limit {
                tracing::warn!(
                    target: "horizon_graft_core::event_loop",
                    limit = self.config.microtask_limit,
                    "microtask limit reached, deferring remaining microtasks"
                );
                break;
            }
            let next = self.state.lock().microtasks.pop_front();
            let Some(task_data) = next else {
                break;
            };
            (task_data.task)();
            count += 1;
        }
        count
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Start a one-shot timer that runs `task` after `delay`.
    pub fn set_timeout<F>(&self, delay: Duration, task: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        let fire_at = state.now + delay;
        let id = state.timers.insert(TimerData {
            fire_at,
            task: Some(Box::new(task)),
        });
        state.timer_seq += 1;
        let seq = state.timer_seq;
        state.timer_queue.push(TimerQueueEntry { id, fire_at, seq });
        tracing::trace!(target: "horizon_graft_core::event_loop", ?id, ?delay, "timer scheduled");
        id
    }

    /// Cancel a pending timer.
    pub fn clear_timeout(&self, id: TimerId) -> Result<()> {
        if self.state.lock().timers.remove(id).is_some() {
            Ok(())
        } else {
            Err(SchedulerError::InvalidTimerId)
        }
    }

    /// Check if a timer is still pending.
    pub fn is_timer_active(&self, id: TimerId) -> bool {
        self.state.lock().timers.contains_key(id)
    }

    /// Duration until the next timer fires, if any.
    pub fn time_until_next_timer(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        let now = state.now;
        state
            .peek_timer()
            .map(|entry| entry.fire_at.saturating_sub(now))
    }

    /// Fire the earliest timer due at or before `deadline`, moving the clock
    /// to its fire time. Returns `false` if no timer is due.
    fn fire_next_timer(&self, deadline: Duration) -> bool {
        let task = {
            let mut state = self.state.lock();
            let Some(entry) = state.peek_timer() else {
                return false;
            };
            if entry.fire_at > deadline {
                return false;
            }
            state.timer_queue.pop();
            let data = state.timers.remove(entry.id);
            if entry.fire_at > state.now {
                state.now = entry.fire_at;
            }
            tracing::trace!(target: "horizon_graft_core::event_loop", id = ?entry.id, "timer fired");
            data.and_then(|mut data| {
                debug_assert_eq!(data.fire_at, entry.fire_at);
                data.task.take()
            })
        };
        if let Some(task) = task {
            task();
        }
        self.run_microtasks();
        true
    }

    // =========================================================================
    // Animation frames
    // =========================================================================

    /// Request a callback on the next animation frame.
    pub fn request_animation_frame<F>(&self, callback: F) -> FrameId
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        state.frame_seq += 1;
        let seq = state.frame_seq;
        state.frames.insert((seq, Box::new(callback)))
    }

    /// Cancel a pending animation-frame callback.
    pub fn cancel_animation_frame(&self, id: FrameId) -> bool {
        self.state.lock().frames.remove(id).is_some()
    }

    /// Run one animation frame.
    ///
    /// Every callback registered before the frame starts runs, in request
    /// order, with microtasks drained after each. Returns the number of
    /// callbacks run.
    #[tracing::instrument(skip(self), target = "horizon_graft_core::event_loop", level = "trace")]
    pub fn render_frame(&self) -> usize {
        let mut ids: Vec<(u64, FrameId)> = {
            let state = self.state.lock();
            state.frames.iter().map(|(id, (seq, _))| (*seq, id)).collect()
        };
        ids.sort_unstable_by_key(|(seq, _)| *seq);

        let mut count = 0;
        for (_, id) in ids {
            // A callback may have cancelled one that was scheduled alongside it.
            let callback = self.state.lock().frames.remove(id);
            if let Some((_, callback)) = callback {
                callback();
                self.run_microtasks();
                count += 1;
            }
        }
        count
    }

    /// Number of animation-frame callbacks waiting for the next frame.
    pub fn pending_frames(&self) -> usize {
        self.state.lock().frames.len()
    }

    // =========================================================================
    // Driving the loop
    // =========================================================================

    /// Advance the virtual clock by `duration`, firing due timers and
    /// rendering animation frames at frame boundaries along the way.
    pub fn advance_by(&self, duration: Duration) {
        self.run_microtasks();
        let deadline = self.now() + duration;
        loop {
            let (next_timer, next_frame) = {
                let mut state = self.state.lock();
                let next_timer = state.peek_timer().map(|entry| entry.fire_at);
                let next_frame = (!state.frames.is_empty())
                    .then(|| state.next_frame_at(self.config.frame_interval));
                (next_timer, next_frame)
            };

            match (next_timer, next_frame) {
                (Some(timer_at), Some(frame_at)) if frame_at < timer_at && frame_at <= deadline => {
                    self.state.lock().now = frame_at;
                    self.render_frame();
                }
                (Some(timer_at), _) if timer_at <= deadline => {
                    self.fire_next_timer(deadline);
                }
                (None, Some(frame_at)) if frame_at <= deadline => {
                    self.state.lock().now = frame_at;
                    self.render_frame();
                }
                _ => break,
            }
        }
        self.state.lock().now = deadline;
        self.run_microtasks();
    }

    /// Run until no microtasks, frames or timers remain, jumping the clock
    /// forward as needed.
    ///
    /// Returns the number of turns taken.
    pub fn run_until_idle(&self) -> Result<usize> {
        let mut turns = 0;
        loop {
            self.run_microtasks();
            if turns >= self.config.max_turns {
                return Err(SchedulerError::TurnLimitExceeded {
                    limit: self.config.max_turns,
                });
            }

            if self.pending_frames() > 0 {
                {
                    let mut state = self.state.lock();
                    state.now = state.next_frame_at(self.config.frame_interval);
                }
                self.render_frame();
            } else if !self.fire_next_timer(Duration::MAX) {
                break;
            }
            turns += 1;
        }
        Ok(turns)
    }

    /// Check whether any work is pending.
    pub fn is_idle(&self) -> bool {
        let mut state = self.state.lock();
        state.microtasks.is_empty() && state.frames.is_empty() && state.peek_timer().is_none()
    }

    /// Number of pending microtasks.
    pub fn pending_microtasks(&self) -> usize {
        self.state.lock().microtasks.len()
    }

    /// Number of pending timers.
    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventLoop")
            .field("now", &state.now)
            .field("microtasks", &state.microtasks.len())
            .field("timers", &state.timers.len())
            .field("frames", &state.frames.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(EventLoop: Send, Sync);
