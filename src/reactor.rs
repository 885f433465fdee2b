//! # Reactor Module
//!
//! Single task-queue event loop that every request lifecycle runs on.
//!
//! ## Overview
//!
//! All suspension in this crate is expressed as scheduling a callback for a
//! future loop turn, never as blocking a thread. A [`Scheduler`] handle can be
//! cloned freely and used from any coroutine; the tasks themselves execute on
//! the single [`EventLoop`] coroutine, which is what serializes access to
//! shared state such as broadcast listener sets.
//!
//! ## Ordering guarantees
//!
//! - Tasks scheduled with [`Scheduler::call_soon`] run in FIFO order relative
//!   to other zero-delay tasks already queued.
//! - Tasks scheduled with [`Scheduler::call_later`] run no earlier than the
//!   requested delay; beyond that there is no ordering guarantee relative to
//!   other delayed tasks.
//!
//! ## Cancellation
//!
//! Every scheduled task returns a [`TaskHandle`]. Cancelling it marks the
//! task so the loop drops the closure without running it; anything the
//! closure captured (an open file, a listener registration) is released by
//! the drop. This is what lets a disconnect cancel a pending stream chunk
//! instead of relying on a checked flag alone.

use may::coroutine::JoinHandle;
use may::sync::mpsc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

struct Task {
    cancelled: Arc<AtomicBool>,
    run: Box<dyn FnOnce() + Send + 'static>,
}

enum Control {
    Run(Task),
    Shutdown,
}

/// Cancel handle for a scheduled task.
///
/// Cheap to clone; cancelling an already-executed task has no effect.
#[derive(Clone)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Mark the task so the loop skips it. The task's closure is dropped
    /// without running.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the underlying task may still run. Once the loop has executed
    /// or dropped the task, the handle's flag is the only reference left.
    pub(crate) fn is_live(handle: &TaskHandle) -> bool {
        !handle.is_cancelled() && Arc::strong_count(&handle.cancelled) > 1
    }
}

/// Cloneable handle used to enqueue tasks onto the event loop.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::Sender<Control>,
}

impl Scheduler {
    /// Schedule `f` for the next free loop turn (zero delay, FIFO).
    pub fn call_soon<F>(&self, f: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = Task {
            cancelled: Arc::clone(&cancelled),
            run: Box::new(f),
        };
        // A send failure means the loop has shut down; the task is dropped,
        // which is the same observable outcome as cancellation.
        let _ = self.tx.send(Control::Run(task));
        TaskHandle { cancelled }
    }

    /// Schedule `f` to run no earlier than `delay` from now.
    ///
    /// A helper coroutine sleeps for the delay and then enqueues the task,
    /// so the loop itself never blocks on time.
    pub fn call_later<F>(&self, delay: Duration, f: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        if delay.is_zero() {
            return self.call_soon(f);
        }
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = Task {
            cancelled: Arc::clone(&cancelled),
            run: Box::new(f),
        };
        let tx = self.tx.clone();
        let flag = Arc::clone(&cancelled);
        may::go!(move || {
            may::coroutine::sleep(delay);
            if !flag.load(Ordering::SeqCst) {
                let _ = tx.send(Control::Run(task));
            }
        });
        TaskHandle { cancelled }
    }

    /// Stop the loop once every task queued before this call has run.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Control::Shutdown);
    }
}

/// The loop half: drains scheduled tasks in FIFO order on one coroutine.
pub struct EventLoop {
    rx: mpsc::Receiver<Control>,
}

impl EventLoop {
    /// Create a loop and its scheduler handle.
    #[must_use]
    pub fn new() -> (EventLoop, Scheduler) {
        let (tx, rx) = mpsc::channel();
        (EventLoop { rx }, Scheduler { tx })
    }

    /// Run the loop on the current coroutine until shutdown (or until every
    /// scheduler handle has been dropped).
    pub fn run(self) {
        debug!("event loop started");
        while let Ok(ctrl) = self.rx.recv() {
            match ctrl {
                Control::Run(task) => {
                    if task.cancelled.load(Ordering::SeqCst) {
                        trace!("skipping cancelled task");
                        continue;
                    }
                    (task.run)();
                }
                Control::Shutdown => break,
            }
        }
        debug!("event loop stopped");
    }

    /// Run the loop on a background coroutine.
    pub fn spawn(self) -> JoinHandle<()> {
        may::go!(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_call_soon_fifo_order() {
        let (event_loop, scheduler) = EventLoop::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = Arc::clone(&seen);
            scheduler.call_soon(move || seen.lock().unwrap().push(i));
        }
        scheduler.shutdown();
        event_loop.run();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cancelled_task_never_runs() {
        let (event_loop, scheduler) = EventLoop::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let handle = scheduler.call_soon(move || flag.store(true, Ordering::SeqCst));
        handle.cancel();
        scheduler.shutdown();
        event_loop.run();
        assert!(!ran.load(Ordering::SeqCst));
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_call_later_runs_after_delay() {
        let (event_loop, scheduler) = EventLoop::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let sched = scheduler.clone();
        scheduler.call_later(Duration::from_millis(20), move || {
            flag.store(true, Ordering::SeqCst);
            sched.shutdown();
        });
        event_loop.run();
        assert!(ran.load(Ordering::SeqCst));
    }
}
