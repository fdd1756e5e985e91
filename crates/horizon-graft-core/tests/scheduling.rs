//! Integration tests combining the event loop, stoppers and signals.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use horizon_graft_core::{EventLoop, Signal, Stopper};
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// A debounced notifier: many requests in one turn produce one emit.
struct Debounced {
    event_loop: EventLoop,
    scheduled: Mutex<bool>,
    fired: Signal<()>,
    stopper: Stopper,
}

impl Debounced {
    fn request(self: &Arc<Self>) {
        let mut scheduled = self.scheduled.lock();
        if *scheduled {
            return;
        }
        *scheduled = true;
        let this = Arc::downgrade(self);
        let task = self.event_loop.queue_microtask(move || {
            if let Some(this) = this.upgrade() {
                *this.scheduled.lock() = false;
                this.fired.emit(());
            }
        });
        let event_loop = self.event_loop.clone();
        self.stopper.on_stop(move || {
            event_loop.cancel_microtask(task);
        });
    }
}

fn debounced(event_loop: &EventLoop, stopper: &Stopper) -> (Arc<Debounced>, Arc<AtomicUsize>) {
    let debounced = Arc::new(Debounced {
        event_loop: event_loop.clone(),
        scheduled: Mutex::new(false),
        fired: Signal::new(),
        stopper: stopper.clone(),
    });
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();
    debounced.fired.connect(move |_| {
        count_clone.fetch_add(1, Ordering::SeqCst);
    });
    (debounced, count)
}

#[test]
fn test_debounce_collapses_requests_in_one_turn() {
    init_tracing();
    let event_loop = EventLoop::new();
    let stopper = Stopper::new();
    let (debounced, count) = debounced(&event_loop, &stopper);

    debounced.request();
    debounced.request();
    debounced.request();
    assert_eq!(count.load(Ordering::SeqCst), 0);

    event_loop.run_microtasks();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    debounced.request();
    event_loop.run_microtasks();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_stopping_cancels_pending_debounce() {
    init_tracing();
    let event_loop = EventLoop::new();
    let stopper = Stopper::new();
    let (debounced, count) = debounced(&event_loop, &stopper);

    debounced.request();
    stopper.stop();
    event_loop.run_until_idle().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_timer_gated_by_child_stopper() {
    init_tracing();
    let event_loop = EventLoop::new();
    let owner = Stopper::new();
    let removed = Stopper::new();
    let scoped = owner.child_until(&removed);
    let fired = Arc::new(AtomicUsize::new(0));

    let fired_clone = fired.clone();
    let timer = event_loop.set_timeout(Duration::from_millis(2), move || {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    });
    let el = event_loop.clone();
    scoped.on_stop(move || {
        let _ = el.clear_timeout(timer);
    });

    removed.stop();
    event_loop.advance_by(Duration::from_millis(5));

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(!owner.is_stopped());
}

#[test]
fn test_frame_flush_coalesces_requests() {
    init_tracing();
    let event_loop = EventLoop::new();
    let pending = Arc::new(Mutex::new(Vec::<u32>::new()));
    let flushed = Arc::new(Mutex::new(Vec::<Vec<u32>>::new()));
    let scheduled = Arc::new(Mutex::new(false));

    let request = |value: u32| {
        pending.lock().push(value);
        let mut scheduled_guard = scheduled.lock();
        if !*scheduled_guard {
            *scheduled_guard = true;
            let (pending, flushed, scheduled) = (pending.clone(), flushed.clone(), scheduled.clone());
            event_loop.request_animation_frame(move || {
                *scheduled.lock() = false;
                let batch = std::mem::take(&mut *pending.lock());
                flushed.lock().push(batch);
            });
        }
    };

    request(1);
    request(2);
    event_loop.advance_by(Duration::from_millis(16));
    request(3);
    event_loop.run_until_idle().unwrap();

    assert_eq!(*flushed.lock(), vec![vec![1, 2], vec![3]]);
}
