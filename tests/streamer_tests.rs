//! Tests for chunked static file streaming.
//!
//! # Test Coverage
//!
//! - Chunk geometry: `ceil(len / chunk_size)` writes, final chunk short
//! - Exact-multiple file lengths produce no empty trailing write
//! - Missing file → 404 and an immediate finish with no body
//! - Disconnect between chunks cancels the remaining stream steps

mod common;

use common::{start_engine, MockTransport, TestTracing};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use webstrand::controller::RequestCx;
use webstrand::controllers::NotFound;
use webstrand::dispatcher::{RequestDispatcher, RouteTable};
use webstrand::reactor::{EventLoop, Scheduler};
use webstrand::streamer::serve_file_chunked;
use webstrand::templates::TemplateCache;
use webstrand::Controller;

const WAIT: Duration = Duration::from_secs(2);
const CHUNK: usize = 16384;

fn write_media(len: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    file.write_all(&payload).unwrap();
    file.flush().unwrap();
    file
}

struct Media {
    path: std::path::PathBuf,
    chunk_size: usize,
}

impl Controller for Media {
    fn init(&mut self, cx: &RequestCx) -> anyhow::Result<()> {
        serve_file_chunked(cx, self.path.clone(), self.chunk_size);
        Ok(())
    }
}

fn media_dispatcher(
    path: std::path::PathBuf,
    chunk_size: usize,
    scheduler: Scheduler,
) -> RequestDispatcher {
    let mut table = RouteTable::new();
    table.route(http::Method::GET, "/media", "media", move |_| {
        Box::new(Media {
            path: path.clone(),
            chunk_size,
        })
    });
    RequestDispatcher::new(
        Arc::new(table),
        |_| Box::new(NotFound),
        Arc::new(TemplateCache::from_sources(HashMap::new())),
        scheduler,
    )
}

#[test]
fn test_chunk_geometry_with_short_tail() {
    let _tracing = TestTracing::init();
    let scheduler = start_engine();
    let media = write_media(50_000);
    let dispatcher = media_dispatcher(media.path().to_path_buf(), CHUNK, scheduler);

    let mock = MockTransport::get("/media");
    dispatcher.dispatch(mock.clone());

    assert!(mock.wait_finished(WAIT));
    assert_eq!(mock.write_sizes(), vec![CHUNK, CHUNK, CHUNK, 50_000 - 3 * CHUNK]);
    assert_eq!(mock.body(), std::fs::read(media.path()).unwrap());
}

#[test]
fn test_exact_multiple_has_no_empty_tail() {
    let _tracing = TestTracing::init();
    let scheduler = start_engine();
    let media = write_media(2 * CHUNK);
    let dispatcher = media_dispatcher(media.path().to_path_buf(), CHUNK, scheduler);

    let mock = MockTransport::get("/media");
    dispatcher.dispatch(mock.clone());

    assert!(mock.wait_finished(WAIT));
    assert_eq!(mock.write_sizes(), vec![CHUNK, CHUNK]);
}

#[test]
fn test_missing_file_is_404() {
    let _tracing = TestTracing::init();
    let scheduler = start_engine();
    let dispatcher = media_dispatcher("/no/such/file.mp3".into(), CHUNK, scheduler);

    let mock = MockTransport::get("/media");
    dispatcher.dispatch(mock.clone());

    assert!(mock.wait_finished(WAIT));
    assert_eq!(mock.status(), 404);
    assert_eq!(mock.write_count(), 0);
}

#[test]
fn test_disconnect_between_chunks_stops_stream() {
    let _tracing = TestTracing::init();
    may::config().set_stack_size(0x8000);

    // Drive the loop on this thread so the task order is deterministic:
    // init queues chunk 1, the probe queues the disconnect behind it,
    // chunk 1 queues chunk 2, the disconnect cancels it.
    let (event_loop, scheduler) = EventLoop::new();
    let media = write_media(3 * CHUNK);
    let dispatcher = media_dispatcher(media.path().to_path_buf(), CHUNK, scheduler.clone());

    let mock = MockTransport::get("/media");
    dispatcher.dispatch(mock.clone());
    {
        let mock = mock.clone();
        let outer = scheduler.clone();
        let inner = scheduler.clone();
        outer.clone().call_soon(move || {
            let mock = mock.clone();
            let inner = inner.clone();
            outer.call_soon(move || {
                mock.fire_disconnect();
                inner.shutdown();
            });
        });
    }
    event_loop.run();

    assert_eq!(mock.write_count(), 1);
    assert!(!mock.is_finished());
}
