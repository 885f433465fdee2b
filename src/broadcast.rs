//! # Broadcast Module
//!
//! Fan-out of a single data source to a dynamic set of connected listeners.
//!
//! ## Overview
//!
//! One external producer pushes opaque chunks and, eventually, an
//! end-of-stream signal. Every listener registered at push time receives the
//! chunk; listeners that join later only see what is pushed after they join.
//! Each listener drains a private ordered queue at its own rate, so a slow
//! client never delays a fast one.
//!
//! ## Architecture
//!
//! - [`BroadcastChannel`] — shared handle owned by whichever component wires
//!   the streaming route; passed by reference to each controller that needs
//!   it. There is no ambient global registry.
//! - The listener set is the single source of truth: the producer consults
//!   it at every push, so a listener removed in the same loop turn never
//!   receives another chunk.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let channel = BroadcastChannel::new();
//!
//! // Producer coroutine
//! may::go!({
//!     let channel = channel.clone();
//!     move || {
//!         for chunk in source {
//!             channel.push(chunk);
//!             may::coroutine::sleep(std::time::Duration::from_secs(1));
//!         }
//!         channel.close();
//!     }
//! });
//!
//! // Inside a stream controller's init
//! let id = channel.subscribe(cx);
//! // ... and in on_disconnect: channel.unsubscribe(id);
//! ```
//!
//! ## Drain schedule
//!
//! A non-empty queue is drained one chunk per loop turn (reschedule with
//! zero delay — maximum throughput while still yielding). An empty queue on
//! a live channel is re-polled after a fixed short interval
//! (`STRAND_POLL_INTERVAL_MS`) rather than busy-looping. An empty queue on a
//! closed channel finishes the listener's request and deregisters it.

use crate::controller::RequestCx;
use crate::runtime_config::RuntimeConfig;
use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Opaque registration record for one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Shared {
    listeners: HashMap<u64, VecDeque<Arc<[u8]>>>,
    next_id: u64,
    closed: bool,
}

/// Fan-out primitive: one producer, any number of independent consumers.
///
/// Cheap to clone; all clones refer to the same listener set.
#[derive(Clone)]
pub struct BroadcastChannel {
    shared: Arc<Mutex<Shared>>,
    poll_interval: Duration,
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastChannel {
    /// Create a channel with the configured idle poll interval.
    #[must_use]
    pub fn new() -> Self {
        Self::with_poll_interval(RuntimeConfig::from_env().poll_interval)
    }

    /// Create a channel with an explicit idle poll interval.
    #[must_use]
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        BroadcastChannel {
            shared: Arc::new(Mutex::new(Shared {
                listeners: HashMap::new(),
                next_id: 0,
                closed: false,
            })),
            poll_interval,
        }
    }

    /// Push one chunk to every currently registered listener's queue.
    ///
    /// Listeners that register afterwards do not receive it retroactively.
    pub fn push(&self, chunk: impl Into<Arc<[u8]>>) {
        let chunk: Arc<[u8]> = chunk.into();
        let mut shared = self.shared.lock().unwrap();
        if shared.closed {
            warn!("push on closed broadcast channel ignored");
            return;
        }
        for queue in shared.listeners.values_mut() {
            queue.push_back(Arc::clone(&chunk));
        }
        debug!(
            listeners = shared.listeners.len(),
            bytes = chunk.len(),
            "broadcast chunk pushed"
        );
    }

    /// Signal end-of-stream. Listeners finish once their own queue drains.
    pub fn close(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.closed = true;
        debug!(listeners = shared.listeners.len(), "broadcast channel closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock().unwrap().closed
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.lock().unwrap().listeners.len()
    }

    /// Register the request as a listener and schedule its drain loop.
    ///
    /// The caller's controller should call [`BroadcastChannel::unsubscribe`]
    /// from its `on_disconnect` hook so the producer stops enqueuing into a
    /// queue nobody will drain.
    pub fn subscribe(&self, cx: &RequestCx) -> ListenerId {
        let id = {
            let mut shared = self.shared.lock().unwrap();
            let id = shared.next_id;
            shared.next_id += 1;
            shared.listeners.insert(id, VecDeque::new());
            ListenerId(id)
        };
        debug!(
            request_id = %cx.request_id(),
            listener = id.0,
            "broadcast listener registered"
        );
        let channel = self.clone();
        cx.defer(move |cx| channel.drain_step(cx, id));
        id
    }

    /// Remove a listener immediately, regardless of its drain state.
    pub fn unsubscribe(&self, id: ListenerId) {
        let removed = self.shared.lock().unwrap().listeners.remove(&id.0);
        if removed.is_some() {
            debug!(listener = id.0, "broadcast listener deregistered");
        }
    }

    fn drain_step(&self, cx: &RequestCx, id: ListenerId) -> Result<()> {
        enum Drain {
            Chunk(Arc<[u8]>),
            Idle,
            Complete,
            Detached,
        }

        let action = {
            let mut shared = self.shared.lock().unwrap();
            let closed = shared.closed;
            match shared.listeners.get_mut(&id.0) {
                None => Drain::Detached,
                Some(queue) => match queue.pop_front() {
                    Some(chunk) => Drain::Chunk(chunk),
                    None if closed => {
                        shared.listeners.remove(&id.0);
                        Drain::Complete
                    }
                    None => Drain::Idle,
                },
            }
        };

        let channel = self.clone();
        match action {
            Drain::Chunk(chunk) => {
                cx.write(&chunk);
                cx.defer(move |cx| channel.drain_step(cx, id));
            }
            Drain::Idle => {
                cx.call_later(self.poll_interval, move |cx| channel.drain_step(cx, id));
            }
            Drain::Complete => {
                debug!(
                    request_id = %cx.request_id(),
                    listener = id.0,
                    "broadcast stream complete"
                );
                cx.finish();
            }
            // Deregistered (disconnect); nothing left to do.
            Drain::Detached => {}
        }
        Ok(())
    }
}
