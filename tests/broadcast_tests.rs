//! Tests for broadcast fan-out.
//!
//! # Test Coverage
//!
//! - Every attached listener receives every chunk pushed while attached
//! - A late joiner only sees chunks pushed after it subscribed
//! - Close drains remaining chunks, then finishes each listener
//! - A disconnected listener is detached immediately and misses later chunks
//! - Pushes after close are dropped

mod common;

use common::{start_engine, wait_until, MockTransport, TestTracing};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use webstrand::broadcast::BroadcastChannel;
use webstrand::controllers::{LiveStream, NotFound};
use webstrand::dispatcher::{RequestDispatcher, RouteTable};
use webstrand::reactor::Scheduler;
use webstrand::templates::TemplateCache;

const WAIT: Duration = Duration::from_secs(2);
const POLL: Duration = Duration::from_millis(10);

fn stream_dispatcher(channel: BroadcastChannel, scheduler: Scheduler) -> RequestDispatcher {
    let mut table = RouteTable::new();
    table.route(http::Method::GET, "/stream", "live_stream", move |_| {
        Box::new(LiveStream::new(channel.clone()))
    });
    RequestDispatcher::new(
        Arc::new(table),
        |_| Box::new(NotFound),
        Arc::new(TemplateCache::from_sources(HashMap::new())),
        scheduler,
    )
}

#[test]
fn test_fan_out_and_close() {
    let _tracing = TestTracing::init();
    let scheduler = start_engine();
    let channel = BroadcastChannel::with_poll_interval(POLL);
    let dispatcher = stream_dispatcher(channel.clone(), scheduler);

    let a = MockTransport::get("/stream");
    let b = MockTransport::get("/stream");
    dispatcher.dispatch(a.clone());
    dispatcher.dispatch(b.clone());
    assert!(wait_until(WAIT, || channel.listener_count() == 2));

    channel.push(b"one ".to_vec());
    channel.push(b"two".to_vec());
    channel.close();

    assert!(a.wait_finished(WAIT));
    assert!(b.wait_finished(WAIT));
    assert_eq!(a.body(), b"one two");
    assert_eq!(b.body(), b"one two");
    assert_eq!(channel.listener_count(), 0);
}

#[test]
fn test_late_joiner_sees_only_new_chunks() {
    let _tracing = TestTracing::init();
    let scheduler = start_engine();
    let channel = BroadcastChannel::with_poll_interval(POLL);
    let dispatcher = stream_dispatcher(channel.clone(), scheduler);

    let early = MockTransport::get("/stream");
    dispatcher.dispatch(early.clone());
    assert!(wait_until(WAIT, || channel.listener_count() == 1));
    channel.push(b"before".to_vec());
    assert!(wait_until(WAIT, || early.write_count() == 1));

    let late = MockTransport::get("/stream");
    dispatcher.dispatch(late.clone());
    assert!(wait_until(WAIT, || channel.listener_count() == 2));
    channel.push(b"after".to_vec());
    channel.close();

    assert!(early.wait_finished(WAIT));
    assert!(late.wait_finished(WAIT));
    assert_eq!(early.body(), b"beforeafter");
    assert_eq!(late.body(), b"after");
}

#[test]
fn test_disconnected_listener_detaches_immediately() {
    let _tracing = TestTracing::init();
    let scheduler = start_engine();
    let channel = BroadcastChannel::with_poll_interval(POLL);
    let dispatcher = stream_dispatcher(channel.clone(), scheduler);

    let keeper = MockTransport::get("/stream");
    let dropper = MockTransport::get("/stream");
    dispatcher.dispatch(keeper.clone());
    dispatcher.dispatch(dropper.clone());
    assert!(wait_until(WAIT, || channel.listener_count() == 2));

    channel.push(b"b1".to_vec());
    assert!(wait_until(WAIT, || {
        keeper.write_count() == 1 && dropper.write_count() == 1
    }));

    dropper.fire_disconnect();
    assert!(wait_until(WAIT, || channel.listener_count() == 1));

    channel.push(b"b2".to_vec());
    channel.close();

    assert!(keeper.wait_finished(WAIT));
    assert_eq!(keeper.body(), b"b1b2");
    assert_eq!(dropper.body(), b"b1");
    assert!(!dropper.is_finished());
}

#[test]
fn test_push_after_close_is_dropped() {
    let _tracing = TestTracing::init();
    let channel = BroadcastChannel::with_poll_interval(POLL);
    channel.close();
    channel.push(b"lost".to_vec());
    assert!(channel.is_closed());
    assert_eq!(channel.listener_count(), 0);
}
